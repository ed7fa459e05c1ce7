use crate::error::{TaqlError, TaqlResult};
use crate::expr::ExprNode;
use crate::func::GroupFunc;
use crate::func_set::GroupFuncSet;
use crate::group_key::GroupKeySet;
use crate::result::GroupResult;
use crate::row_id::RowId;
use astrotab_columnar::Table;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupByOptions {
    /// Order groups by key instead of by first appearance.
    pub sort_groups: bool,
    /// Keep the row ids of every group in the result.
    pub keep_row_ids: bool,
}

/// A GROUP BY pass: key expressions, aggregate expressions and options.
#[derive(Clone, Debug)]
pub struct GroupByQuery {
    keys: Vec<Arc<dyn ExprNode>>,
    aggregates: Vec<Arc<dyn ExprNode>>,
    options: GroupByOptions,
}

impl GroupByQuery {
    pub fn new(keys: Vec<Arc<dyn ExprNode>>, aggregates: Vec<Arc<dyn ExprNode>>) -> Self {
        Self {
            keys,
            aggregates,
            options: GroupByOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GroupByOptions) -> Self {
        self.options = options;
        self
    }

    pub fn keys(&self) -> &[Arc<dyn ExprNode>] {
        &self.keys
    }

    pub fn aggregates(&self) -> &[Arc<dyn ExprNode>] {
        &self.aggregates
    }

    pub fn options(&self) -> GroupByOptions {
        self.options
    }

    /// Group `rows` and accumulate the aggregates per group.
    ///
    /// Groups are numbered in order of discovery unless `sort_groups` is set. Row ids are
    /// collected per group when asked for or when a lazy aggregate needs them.
    pub fn execute(&self, rows: impl IntoIterator<Item = RowId>) -> TaqlResult<GroupResult> {
        if let Some(expr) = self.aggregates.iter().find(|e| !e.is_aggregate()) {
            return Err(TaqlError::InvalidExpr(format!(
                "{} is not an aggregate function",
                expr.name()
            )));
        }
        let mut key = GroupKeySet::build(&self.keys)?;
        let need_ids =
            self.options.keep_row_ids || GroupFuncSet::new(&self.aggregates)?.has_lazy();

        log::debug!(
            "GROUP BY on {} keys with {} aggregates",
            self.keys.len(),
            self.aggregates.len()
        );

        let mut index: BTreeMap<GroupKeySet, usize> = BTreeMap::new();
        let mut keys = Vec::new();
        let mut sets: Vec<GroupFuncSet> = Vec::new();
        let mut id_seqnr = None;
        let mut nrow = 0usize;
        for id in rows {
            nrow += 1;
            key.fill(&self.keys, id)?;
            let group = match index.get(&key) {
                Some(&group) => group,
                None => {
                    let mut set = GroupFuncSet::new(&self.aggregates)?;
                    if need_ids {
                        id_seqnr = Some(set.add(GroupFunc::expr_id()));
                    }
                    let group = sets.len();
                    index.insert(key.clone(), group);
                    keys.push(key.clone());
                    sets.push(set);
                    group
                }
            };
            sets[group].apply(id)?;
        }

        for set in &mut sets {
            set.finish()?;
        }
        let ids = match id_seqnr {
            Some(seqnr) => sets
                .iter()
                .map(|set| match set.func(seqnr) {
                    Some(func) => func.ids().map(<[RowId]>::to_vec),
                    None => Ok(Vec::new()),
                })
                .collect::<TaqlResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let key_types = self.keys.iter().map(|k| k.data_type()).collect();
        let aggr_types = self
            .aggregates
            .iter()
            .map(|a| (a.data_type(), a.value_kind()))
            .collect();
        let mut result = GroupResult::new(sets, ids).with_layout(keys, key_types, aggr_types);
        if self.options.sort_groups {
            result.sort_by_key();
        }

        log::debug!(
            "GROUP BY grouped {nrow} rows into {} groups",
            result.group_count()
        );
        Ok(result)
    }

    /// Group every row of `table`. The expressions must read from `table` (or a table its rows
    /// map onto one to one).
    pub fn execute_table(&self, table: &dyn Table) -> TaqlResult<GroupResult> {
        self.execute((0..table.nrow()).map(RowId::new))
    }
}
