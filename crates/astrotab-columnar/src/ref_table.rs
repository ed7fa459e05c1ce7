//! Tables whose rows are references into the rows of a parent table.

use crate::column::{check_row, RowNumbers, TableColumn};
use crate::error::{TableError, TableResult};
use crate::ref_column::{RefColumn, RowMapping};
use crate::sort::{sort_positions, SortOrder, SortValue};
use crate::table::Table;
use std::sync::Arc;

/// A view: a selection (and ordering) of the rows of another table.
///
/// The view shares one [`RowMapping`] with all of its [`RefColumn`]s, so changing the selection
/// through [`RefTable::set_rows`] or [`RefTable::push_row`] is seen by every column at once. A
/// view of a view translates through both mappings.
#[derive(Debug)]
pub struct RefTable {
    parent: Arc<dyn Table>,
    mapping: Arc<RowMapping>,
    columns: Vec<Arc<dyn TableColumn>>,
}

impl RefTable {
    /// View of `rows` of `parent`, writable when the parent is.
    pub fn new(parent: Arc<dyn Table>, rows: Vec<usize>) -> TableResult<Self> {
        let writable = parent.is_writable();
        Self::with_writable(parent, rows, writable)
    }

    pub fn read_only(parent: Arc<dyn Table>, rows: Vec<usize>) -> TableResult<Self> {
        Self::with_writable(parent, rows, false)
    }

    fn with_writable(
        parent: Arc<dyn Table>,
        rows: Vec<usize>,
        writable: bool,
    ) -> TableResult<Self> {
        let nrow = parent.nrow();
        for &row in &rows {
            check_row(row, nrow)?;
        }
        let mapping = Arc::new(RowMapping::new(rows, writable));
        let columns = parent
            .column_names()
            .iter()
            .map(|name| {
                let column = parent.column(name)?;
                Ok(Arc::new(RefColumn::new(mapping.clone(), column)) as Arc<dyn TableColumn>)
            })
            .collect::<TableResult<Vec<_>>>()?;
        Ok(Self {
            parent,
            mapping,
            columns,
        })
    }

    pub fn all(parent: Arc<dyn Table>) -> TableResult<Self> {
        let rows = (0..parent.nrow()).collect();
        Self::new(parent, rows)
    }

    /// View of the rows of `parent` for which `predicate` holds, in table order.
    pub fn select(
        parent: Arc<dyn Table>,
        mut predicate: impl FnMut(usize) -> TableResult<bool>,
    ) -> TableResult<Self> {
        let mut rows = Vec::new();
        for row in 0..parent.nrow() {
            if predicate(row)? {
                rows.push(row);
            }
        }
        Self::new(parent, rows)
    }

    /// View of all rows of `parent` sorted on the given columns. The sort is stable.
    pub fn sorted_by(parent: Arc<dyn Table>, keys: &[(&str, SortOrder)]) -> TableResult<Self> {
        let all = RowNumbers::all(parent.nrow());
        let sort_keys = keys
            .iter()
            .map(|(name, order)| {
                let key = parent.column(name)?.make_sort_key(&all, *order)?;
                if (0..key.len()).any(|i| key.value(i) == Some(&SortValue::Undefined)) {
                    log::warn!(
                        "sorting {} on column {name} which has undefined cells",
                        parent.name()
                    );
                }
                Ok(key)
            })
            .collect::<TableResult<Vec<_>>>()?;
        let rows = if sort_keys.is_empty() {
            all.to_vec()
        } else {
            sort_positions(&sort_keys)
        };
        Self::new(parent, rows)
    }

    pub fn parent(&self) -> &Arc<dyn Table> {
        &self.parent
    }

    pub fn mapping(&self) -> &Arc<RowMapping> {
        &self.mapping
    }

    /// The parent row numbers making up this view.
    pub fn rows(&self) -> Vec<usize> {
        self.mapping.rows()
    }

    pub fn set_rows(&self, rows: Vec<usize>) -> TableResult<()> {
        let nrow = self.parent.nrow();
        for &row in &rows {
            check_row(row, nrow)?;
        }
        self.mapping.set_rows(rows);
        Ok(())
    }

    pub fn push_row(&self, row: usize) -> TableResult<()> {
        check_row(row, self.parent.nrow())?;
        self.mapping.push_row(row);
        Ok(())
    }
}

impl Table for RefTable {
    fn name(&self) -> &str {
        self.parent.name()
    }

    fn nrow(&self) -> usize {
        self.mapping.nrow()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.desc().name.clone()).collect()
    }

    fn column(&self, name: &str) -> TableResult<Arc<dyn TableColumn>> {
        self.columns
            .iter()
            .find(|c| c.desc().name == name)
            .cloned()
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    fn is_writable(&self) -> bool {
        self.mapping.is_writable() && self.parent.is_writable()
    }

    fn root_row(&self, row: usize) -> TableResult<usize> {
        self.parent.root_row(self.mapping.translate(row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnDesc;
    use crate::table::{TableBuilder, TableOptions};
    use crate::types::{DataType, Value};

    fn table() -> Arc<dyn Table> {
        let mut builder = TableBuilder::new(
            "vis",
            vec![ColumnDesc::scalar("ANT", DataType::Int)],
            TableOptions::default(),
        );
        for ant in [3, 1, 2, 1] {
            builder.append_row(vec![Value::Int(ant)]).unwrap();
        }
        Arc::new(builder.finish().unwrap())
    }

    #[test]
    fn sorted_view_is_stable() {
        let view = RefTable::sorted_by(table(), &[("ANT", SortOrder::Ascending)]).unwrap();
        assert_eq!(view.rows(), vec![1, 3, 2, 0]);
        assert_eq!(view.root_row(2).unwrap(), 2);
    }

    #[test]
    fn nested_views_compose() {
        let base = table();
        let outer: Arc<dyn Table> = Arc::new(RefTable::new(base, vec![3, 2, 0]).unwrap());
        let inner = RefTable::new(outer, vec![2, 0]).unwrap();
        assert_eq!(inner.root_row(0).unwrap(), 0);
        assert_eq!(inner.root_row(1).unwrap(), 3);
        assert_eq!(inner.column("ANT").unwrap().get(0).unwrap(), Value::Int(3));
    }

    #[test]
    fn rows_outside_parent_are_rejected() {
        let err = RefTable::new(table(), vec![0, 4]).unwrap_err();
        assert_eq!(err, TableError::RowOutOfRange { row: 4, nrow: 4 });
    }
}
