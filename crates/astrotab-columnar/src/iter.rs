use crate::column::RowNumbers;
use crate::error::TableResult;
use crate::ref_table::RefTable;
use crate::sort::{IterBuf, SortKey, SortOrder, SortValue};
use crate::table::Table;
use std::sync::Arc;

/// Iterates a table in runs of rows with equal values in the iteration columns.
///
/// The table is sorted on the iteration columns first; each item is a view of the table holding
/// one run.
#[derive(Debug)]
pub struct TableIterator {
    table: Arc<dyn Table>,
    rows: Vec<usize>,
    keys: Vec<SortKey>,
    bufs: Vec<IterBuf>,
    pos: usize,
    loaded: bool,
}

impl TableIterator {
    pub fn new(table: Arc<dyn Table>, columns: &[(&str, SortOrder)]) -> TableResult<Self> {
        let bufs = columns
            .iter()
            .map(|(name, _)| table.column(name)?.alloc_iter_buf())
            .collect::<TableResult<Vec<_>>>()?;
        let rows = RefTable::sorted_by(table.clone(), columns)?.rows();
        let sorted = RowNumbers::List(rows.clone());
        let keys = columns
            .iter()
            .map(|(name, order)| table.column(name)?.make_sort_key(&sorted, *order))
            .collect::<TableResult<Vec<_>>>()?;
        Ok(Self {
            table,
            rows,
            keys,
            bufs,
            pos: 0,
            loaded: false,
        })
    }

    /// Load sorted position `pos` into the buffers; true when any column changed value.
    fn load(&mut self, pos: usize) -> bool {
        let mut changed = false;
        for (buf, key) in self.bufs.iter_mut().zip(&self.keys) {
            let value = key.value(pos).cloned().unwrap_or(SortValue::Undefined);
            changed |= buf.advance(value);
        }
        changed
    }
}

impl Iterator for TableIterator {
    type Item = TableResult<RefTable>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.rows.len() {
            return None;
        }
        let start = self.pos;
        if !self.loaded {
            self.load(start);
        }
        let mut end = start + 1;
        self.loaded = false;
        while end < self.rows.len() {
            if self.load(end) {
                self.loaded = true;
                break;
            }
            end += 1;
        }
        self.pos = end;
        Some(RefTable::new(
            self.table.clone(),
            self.rows[start..end].to_vec(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnDesc;
    use crate::table::{TableBuilder, TableOptions};
    use crate::types::{DataType, Value};

    #[test]
    fn yields_runs_of_equal_values() {
        let mut builder = TableBuilder::new(
            "vis",
            vec![
                ColumnDesc::scalar("ANT", DataType::String),
                ColumnDesc::scalar("SCAN", DataType::Int),
            ],
            TableOptions::default(),
        );
        for (ant, scan) in [("B", 1), ("A", 1), ("B", 1), ("A", 2)] {
            builder
                .append_row(vec![Value::from(ant), Value::Int(scan)])
                .unwrap();
        }
        let table: Arc<dyn Table> = Arc::new(builder.finish().unwrap());

        let runs: Vec<Vec<usize>> = TableIterator::new(
            table,
            &[("ANT", SortOrder::Ascending), ("SCAN", SortOrder::Ascending)],
        )
        .unwrap()
        .map(|view| view.unwrap().rows())
        .collect();
        assert_eq!(runs, vec![vec![1], vec![3], vec![0, 2]]);
    }
}
