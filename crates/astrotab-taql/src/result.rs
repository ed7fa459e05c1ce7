use crate::error::{TaqlError, TaqlResult};
use crate::expr::ValueKind;
use crate::func_set::GroupFuncSet;
use crate::group_key::GroupKeySet;
use crate::row_id::RowId;
use astrotab_columnar::{ColumnDesc, DataType, MemoryTable, TableBuilder, TableOptions, Value};

/// The groups produced by a GROUP BY pass.
///
/// Group `g` has the function set `func_sets[g]` and, when row ids were kept, the id list
/// `ids[g]`; both are in the same group order.
#[derive(Debug)]
pub struct GroupResult {
    keys: Vec<GroupKeySet>,
    key_types: Vec<DataType>,
    aggr_types: Vec<(DataType, ValueKind)>,
    func_sets: Vec<GroupFuncSet>,
    ids: Vec<Vec<RowId>>,
}

impl GroupResult {
    /// `ids` must be empty or hold one list per function set.
    pub fn new(func_sets: Vec<GroupFuncSet>, ids: Vec<Vec<RowId>>) -> Self {
        assert!(
            ids.is_empty() || ids.len() == func_sets.len(),
            "{} id lists for {} groups",
            ids.len(),
            func_sets.len()
        );
        let aggr_types = func_sets
            .first()
            .map(|set| {
                set.funcs()
                    .iter()
                    .map(|f| (f.data_type(), f.value_kind()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            keys: Vec::new(),
            key_types: Vec::new(),
            aggr_types,
            func_sets,
            ids,
        }
    }

    pub(crate) fn with_layout(
        mut self,
        keys: Vec<GroupKeySet>,
        key_types: Vec<DataType>,
        aggr_types: Vec<(DataType, ValueKind)>,
    ) -> Self {
        assert_eq!(keys.len(), self.func_sets.len(), "one key per group");
        self.keys = keys;
        self.key_types = key_types;
        self.aggr_types = aggr_types;
        self
    }

    pub(crate) fn sort_by_key(&mut self) {
        if self.keys.len() != self.func_sets.len() {
            return;
        }
        let mut order: Vec<usize> = (0..self.keys.len()).collect();
        order.sort_by(|&a, &b| self.keys[a].cmp(&self.keys[b]));

        let mut keys: Vec<Option<GroupKeySet>> = self.keys.drain(..).map(Some).collect();
        let mut sets: Vec<Option<GroupFuncSet>> = self.func_sets.drain(..).map(Some).collect();
        let mut ids: Vec<Option<Vec<RowId>>> = self.ids.drain(..).map(Some).collect();
        for g in order {
            self.keys.extend(keys[g].take());
            self.func_sets.extend(sets[g].take());
            if let Some(slot) = ids.get_mut(g) {
                self.ids.extend(slot.take());
            }
        }
    }

    pub fn group_count(&self) -> usize {
        self.func_sets.len()
    }

    pub fn key(&self, group: usize) -> Option<&GroupKeySet> {
        self.keys.get(group)
    }

    /// The key of `group` as cell values (dates restored).
    pub fn key_values(&self, group: usize) -> Option<Vec<Value>> {
        self.key(group).map(|key| key.to_values(&self.key_types))
    }

    pub fn func_set(&self, group: usize) -> Option<&GroupFuncSet> {
        self.func_sets.get(group)
    }

    pub fn func_sets(&self) -> &[GroupFuncSet] {
        &self.func_sets
    }

    /// Row ids of `group`; `None` when ids were not kept.
    pub fn ids(&self, group: usize) -> Option<&[RowId]> {
        self.ids.get(group).map(Vec::as_slice)
    }

    /// The value of aggregate `func` for `group`.
    pub fn value(&self, group: usize, func: usize) -> TaqlResult<Value> {
        let set = self.func_set(group).ok_or_else(|| {
            TaqlError::InvalidExpr(format!(
                "group {group} out of range ({} groups)",
                self.group_count()
            ))
        })?;
        set.func(func)
            .ok_or_else(|| {
                TaqlError::InvalidExpr(format!(
                    "aggregate {func} out of range ({} aggregates)",
                    set.len()
                ))
            })?
            .get_value()
    }

    /// A table with one row per group: the key columns followed by the aggregate columns.
    pub fn materialize(&self, name: &str, column_names: &[&str]) -> TaqlResult<MemoryTable> {
        let width = self.key_types.len() + self.aggr_types.len();
        if column_names.len() != width {
            return Err(TaqlError::InvalidExpr(format!(
                "{} column names given for {width} result columns",
                column_names.len()
            )));
        }
        let (key_names, aggr_names) = column_names.split_at(self.key_types.len());
        let schema = key_names
            .iter()
            .zip(&self.key_types)
            .map(|(name, dt)| ColumnDesc::scalar(*name, *dt))
            .chain(
                aggr_names
                    .iter()
                    .zip(&self.aggr_types)
                    .map(|(name, (dt, kind))| match kind {
                        ValueKind::Scalar => ColumnDesc::scalar(*name, *dt),
                        ValueKind::Array => ColumnDesc::array(*name, *dt),
                    }),
            )
            .collect();

        let mut builder = TableBuilder::new(name, schema, TableOptions::default());
        for (group, set) in self.func_sets.iter().enumerate() {
            let mut row = self.key_values(group).unwrap_or_default();
            for func in set.funcs().iter().take(self.aggr_types.len()) {
                row.push(func.get_value()?);
            }
            builder.append_row(row)?;
        }
        Ok(builder.finish()?)
    }
}
