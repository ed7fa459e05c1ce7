//! Columns of a view.
//!
//! A [`RefColumn`] owns no cell data. It holds the view's [`RowMapping`] and the column of the
//! table the view was made from, and forwards every operation to that column after translating
//! row numbers through the mapping. Translation happens on every call, so changes to the view's
//! row selection are visible immediately.

use crate::array::{ArrayValue, Shape, Slicer};
use crate::column::{check_row, ColumnDesc, Keywords, RowNumbers, TableColumn};
use crate::error::{TableError, TableResult};
use crate::sort::{IterBuf, SortKey, SortOrder};
use crate::types::Value;
use std::ops::Range;
use std::sync::{Arc, RwLock};

/// Row numbers of a view in the table it references, plus the view's write permission.
#[derive(Debug)]
pub struct RowMapping {
    rows: RwLock<Vec<usize>>,
    writable: bool,
}

impl RowMapping {
    pub fn new(rows: Vec<usize>, writable: bool) -> Self {
        Self {
            rows: RwLock::new(rows),
            writable,
        }
    }

    pub fn nrow(&self) -> usize {
        self.rows.read().expect("row mapping poisoned").len()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Row number in the referenced table of view row `row`.
    pub fn translate(&self, row: usize) -> TableResult<usize> {
        let rows = self.rows.read().expect("row mapping poisoned");
        check_row(row, rows.len())?;
        Ok(rows[row])
    }

    /// Translate each row individually; the result is generally not contiguous.
    pub fn translate_rows(&self, rows: &RowNumbers) -> TableResult<RowNumbers> {
        let mapping = self.rows.read().expect("row mapping poisoned");
        let nrow = mapping.len();
        rows.iter()
            .map(|row| {
                check_row(row, nrow)?;
                Ok(mapping[row])
            })
            .collect::<TableResult<Vec<_>>>()
            .map(RowNumbers::List)
    }

    pub fn rows(&self) -> Vec<usize> {
        self.rows.read().expect("row mapping poisoned").clone()
    }

    pub fn set_rows(&self, rows: Vec<usize>) {
        *self.rows.write().expect("row mapping poisoned") = rows;
    }

    pub fn push_row(&self, row: usize) {
        self.rows.write().expect("row mapping poisoned").push(row);
    }
}

#[derive(Debug)]
pub struct RefColumn {
    mapping: Arc<RowMapping>,
    column: Arc<dyn TableColumn>,
}

impl RefColumn {
    pub fn new(mapping: Arc<RowMapping>, column: Arc<dyn TableColumn>) -> Self {
        Self { mapping, column }
    }

    /// The referenced column.
    pub fn referenced(&self) -> &Arc<dyn TableColumn> {
        &self.column
    }

    fn check_writable(&self) -> TableResult<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(TableError::NotWritable {
                column: self.column.desc().name.clone(),
            })
        }
    }
}

impl TableColumn for RefColumn {
    fn desc(&self) -> &ColumnDesc {
        self.column.desc()
    }

    fn nrow(&self) -> usize {
        self.mapping.nrow()
    }

    fn is_writable(&self) -> bool {
        self.mapping.is_writable() && self.column.is_writable()
    }

    fn is_stored(&self) -> bool {
        self.column.is_stored()
    }

    fn keywords(&self) -> Keywords {
        self.column.keywords()
    }

    fn set_keyword(&self, name: &str, value: Value) -> TableResult<()> {
        self.check_writable()?;
        self.column.set_keyword(name, value)
    }

    fn is_defined(&self, row: usize) -> TableResult<bool> {
        self.column.is_defined(self.mapping.translate(row)?)
    }

    fn set_shape(&self, row: usize, shape: &Shape) -> TableResult<()> {
        let row = self.mapping.translate(row)?;
        self.check_writable()?;
        self.column.set_shape(row, shape)
    }

    fn shape(&self, row: usize) -> TableResult<Shape> {
        self.column.shape(self.mapping.translate(row)?)
    }

    fn ndim(&self, row: usize) -> TableResult<usize> {
        self.column.ndim(self.mapping.translate(row)?)
    }

    fn get(&self, row: usize) -> TableResult<Value> {
        self.column.get(self.mapping.translate(row)?)
    }

    fn put(&self, row: usize, value: Value) -> TableResult<()> {
        let row = self.mapping.translate(row)?;
        self.check_writable()?;
        self.column.put(row, value)
    }

    fn ndim_column(&self) -> Option<usize> {
        self.column.ndim_column()
    }

    fn shape_column(&self) -> Option<Shape> {
        self.column.shape_column()
    }

    fn can_change_shape(&self) -> bool {
        self.column.can_change_shape()
    }

    fn initialize(&self, rows: Range<usize>) -> TableResult<()> {
        self.check_writable()?;
        for row in rows {
            let target = self.mapping.translate(row)?;
            self.column.initialize(target..target + 1)?;
        }
        Ok(())
    }

    fn get_array(&self, row: usize) -> TableResult<ArrayValue> {
        self.column.get_array(self.mapping.translate(row)?)
    }

    fn get_slice(&self, row: usize, slicer: &Slicer) -> TableResult<ArrayValue> {
        self.column.get_slice(self.mapping.translate(row)?, slicer)
    }

    fn get_scalar_column(&self) -> TableResult<ArrayValue> {
        self.get_scalar_column_cells(&RowNumbers::all(self.nrow()))
    }

    fn get_array_column(&self) -> TableResult<ArrayValue> {
        self.get_array_column_cells(&RowNumbers::all(self.nrow()))
    }

    fn get_column_slice(&self, slicer: &Slicer) -> TableResult<ArrayValue> {
        self.get_column_slice_cells(&RowNumbers::all(self.nrow()), slicer)
    }

    fn get_scalar_column_cells(&self, rows: &RowNumbers) -> TableResult<ArrayValue> {
        let rows = self.mapping.translate_rows(rows)?;
        self.column.get_scalar_column_cells(&rows)
    }

    fn get_array_column_cells(&self, rows: &RowNumbers) -> TableResult<ArrayValue> {
        let rows = self.mapping.translate_rows(rows)?;
        self.column.get_array_column_cells(&rows)
    }

    fn get_column_slice_cells(
        &self,
        rows: &RowNumbers,
        slicer: &Slicer,
    ) -> TableResult<ArrayValue> {
        let rows = self.mapping.translate_rows(rows)?;
        self.column.get_column_slice_cells(&rows, slicer)
    }

    fn put_array(&self, row: usize, array: &ArrayValue) -> TableResult<()> {
        let row = self.mapping.translate(row)?;
        self.check_writable()?;
        self.column.put_array(row, array)
    }

    fn put_slice(&self, row: usize, slicer: &Slicer, array: &ArrayValue) -> TableResult<()> {
        let row = self.mapping.translate(row)?;
        self.check_writable()?;
        self.column.put_slice(row, slicer, array)
    }

    fn put_scalar_column(&self, values: &ArrayValue) -> TableResult<()> {
        self.put_scalar_column_cells(&RowNumbers::all(self.nrow()), values)
    }

    fn put_array_column(&self, values: &ArrayValue) -> TableResult<()> {
        self.put_array_column_cells(&RowNumbers::all(self.nrow()), values)
    }

    fn put_column_slice(&self, slicer: &Slicer, values: &ArrayValue) -> TableResult<()> {
        self.put_column_slice_cells(&RowNumbers::all(self.nrow()), slicer, values)
    }

    fn put_scalar_column_cells(&self, rows: &RowNumbers, values: &ArrayValue) -> TableResult<()> {
        let rows = self.mapping.translate_rows(rows)?;
        self.check_writable()?;
        self.column.put_scalar_column_cells(&rows, values)
    }

    fn put_array_column_cells(&self, rows: &RowNumbers, values: &ArrayValue) -> TableResult<()> {
        let rows = self.mapping.translate_rows(rows)?;
        self.check_writable()?;
        self.column.put_array_column_cells(&rows, values)
    }

    fn put_column_slice_cells(
        &self,
        rows: &RowNumbers,
        slicer: &Slicer,
        values: &ArrayValue,
    ) -> TableResult<()> {
        let rows = self.mapping.translate_rows(rows)?;
        self.check_writable()?;
        self.column.put_column_slice_cells(&rows, slicer, values)
    }

    fn make_sort_key(&self, rows: &RowNumbers, order: SortOrder) -> TableResult<SortKey> {
        let rows = self.mapping.translate_rows(rows)?;
        self.column.make_sort_key(&rows, order)
    }

    fn alloc_iter_buf(&self) -> TableResult<IterBuf> {
        self.column.alloc_iter_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryColumn;
    use crate::types::DataType;

    fn base() -> Arc<dyn TableColumn> {
        Arc::new(
            MemoryColumn::from_values(
                ColumnDesc::scalar("X", DataType::Int),
                (0..6).map(|i| Value::Int(i * 10)).collect(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn reads_follow_mapping_changes() {
        let mapping = Arc::new(RowMapping::new(vec![4, 1], true));
        let col = RefColumn::new(mapping.clone(), base());
        assert_eq!(col.get(0).unwrap(), Value::Int(40));

        mapping.set_rows(vec![2, 3, 5]);
        assert_eq!(col.nrow(), 3);
        assert_eq!(col.get(0).unwrap(), Value::Int(20));
        assert_eq!(
            col.get_scalar_column().unwrap().to_values(),
            vec![Value::Int(20), Value::Int(30), Value::Int(50)]
        );
    }

    #[test]
    fn untranslatable_row_fails_before_forwarding() {
        let col = RefColumn::new(Arc::new(RowMapping::new(vec![0], true)), base());
        assert_eq!(
            col.get(1),
            Err(TableError::RowOutOfRange { row: 1, nrow: 1 })
        );
    }

    #[test]
    fn read_only_view_leaves_storage_alone() {
        let target = base();
        let col = RefColumn::new(Arc::new(RowMapping::new(vec![3], false)), target.clone());
        assert!(!col.is_writable());
        assert!(matches!(
            col.put(0, Value::Int(-1)),
            Err(TableError::NotWritable { .. })
        ));
        assert_eq!(target.get(3).unwrap(), Value::Int(30));
    }
}
