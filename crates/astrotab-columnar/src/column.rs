//! The column contract shared by every storage backend.
//!
//! A [`TableColumn`] is addressed by row number in its own table. Backends implement the
//! per-cell operations; the column-wide and row-subset operations have default implementations
//! that loop over cells, which backends (and views) override when they can do better.

use crate::array::{ArrayValue, Shape, Slicer};
use crate::error::{TableError, TableResult};
use crate::sort::{IterBuf, SortKey, SortOrder, SortValue};
use crate::types::{DataType, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// Keyword set attached to a column (units, reference frames, free-form metadata).
pub type Keywords = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum CellKind {
    Scalar,
    /// Array cells; `shape` is set when every cell has the same fixed shape.
    Array { shape: Option<Shape> },
}

/// Description of a column: name, element type, cell kind and default.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDesc {
    pub name: String,
    pub data_type: DataType,
    pub kind: CellKind,
    pub default: Option<Value>,
    pub comment: String,
}

impl ColumnDesc {
    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            kind: CellKind::Scalar,
            default: None,
            comment: String::new(),
        }
    }

    pub fn array(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            kind: CellKind::Array { shape: None },
            ..Self::scalar(name, data_type)
        }
    }

    pub fn fixed_array(name: impl Into<String>, data_type: DataType, shape: Shape) -> Self {
        Self {
            kind: CellKind::Array { shape: Some(shape) },
            ..Self::scalar(name, data_type)
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, CellKind::Array { .. })
    }

    pub fn fixed_shape(&self) -> Option<&Shape> {
        match &self.kind {
            CellKind::Array { shape } => shape.as_ref(),
            CellKind::Scalar => None,
        }
    }

    /// Value of a fresh cell, or `None` when the cell starts undefined (variable-shape arrays
    /// without a default).
    pub fn initial_value(&self) -> Option<Value> {
        if let Some(default) = &self.default {
            if let Ok(v) = self.conform(default.clone()) {
                return Some(v);
            }
        }
        match &self.kind {
            CellKind::Scalar => Some(Value::zero(self.data_type)),
            CellKind::Array { shape: Some(shape) } => {
                Some(Value::Array(ArrayValue::filled(self.data_type, shape.clone())))
            }
            CellKind::Array { shape: None } => None,
        }
    }

    /// Check that `value` fits a cell of this column, converting its element type if needed.
    pub fn conform(&self, value: Value) -> TableResult<Value> {
        match (&self.kind, value.is_array()) {
            (CellKind::Scalar, true) => return Err(TableError::NotArrayColumn(self.name.clone())),
            (CellKind::Array { .. }, false) => {
                return Err(TableError::NotScalarColumn(self.name.clone()))
            }
            _ => {}
        }
        let actual = value.data_type();
        let value = value
            .coerce(self.data_type)
            .ok_or_else(|| TableError::TypeMismatch {
                context: format!("column {}", self.name),
                expected: self.data_type,
                actual,
            })?;
        if let (Some(shape), Value::Array(array)) = (self.fixed_shape(), &value) {
            if array.shape() != shape {
                return Err(TableError::ShapeFixed {
                    column: self.name.clone(),
                    shape: shape.clone(),
                });
            }
        }
        Ok(value)
    }
}

/// An explicit set of row numbers: a list, or a strided range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowNumbers {
    List(Vec<usize>),
    Range {
        start: usize,
        end: usize,
        step: usize,
    },
}

impl RowNumbers {
    /// Rows `0..nrow`.
    pub fn all(nrow: usize) -> Self {
        RowNumbers::Range {
            start: 0,
            end: nrow,
            step: 1,
        }
    }

    pub fn range(range: Range<usize>, step: usize) -> Self {
        RowNumbers::Range {
            start: range.start,
            end: range.end,
            step: step.max(1),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowNumbers::List(rows) => rows.len(),
            RowNumbers::Range { start, end, step } => {
                if end <= start {
                    0
                } else {
                    (end - start).div_ceil(*step)
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> RowNumbersIter<'_> {
        match self {
            RowNumbers::List(rows) => RowNumbersIter::List(rows.iter()),
            RowNumbers::Range { start, end, step } => {
                RowNumbersIter::Range((*start..*end).step_by(*step))
            }
        }
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

impl From<Vec<usize>> for RowNumbers {
    fn from(rows: Vec<usize>) -> Self {
        RowNumbers::List(rows)
    }
}

pub enum RowNumbersIter<'a> {
    List(std::slice::Iter<'a, usize>),
    Range(std::iter::StepBy<Range<usize>>),
}

impl Iterator for RowNumbersIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            RowNumbersIter::List(it) => it.next().copied(),
            RowNumbersIter::Range(it) => it.next(),
        }
    }
}

pub(crate) fn check_row(row: usize, nrow: usize) -> TableResult<()> {
    if row >= nrow {
        return Err(TableError::RowOutOfRange { row, nrow });
    }
    Ok(())
}

/// Storage-independent access to the cells of one column.
///
/// All methods take `&self`; backends that store data use interior mutability so that a column
/// can be shared between its table and the views referencing it.
pub trait TableColumn: fmt::Debug + Send + Sync {
    fn desc(&self) -> &ColumnDesc;

    fn nrow(&self) -> usize;

    fn is_writable(&self) -> bool;

    /// Whether cell data is stored (as opposed to referenced or computed).
    fn is_stored(&self) -> bool {
        true
    }

    fn keywords(&self) -> Keywords;

    fn set_keyword(&self, name: &str, value: Value) -> TableResult<()>;

    fn is_defined(&self, row: usize) -> TableResult<bool>;

    fn set_shape(&self, row: usize, shape: &Shape) -> TableResult<()>;

    fn shape(&self, row: usize) -> TableResult<Shape>;

    fn get(&self, row: usize) -> TableResult<Value>;

    fn put(&self, row: usize, value: Value) -> TableResult<()>;

    fn ndim(&self, row: usize) -> TableResult<usize> {
        Ok(self.shape(row)?.ndim())
    }

    /// Dimensionality shared by all cells, if the column has a fixed cell shape.
    fn ndim_column(&self) -> Option<usize> {
        self.desc().fixed_shape().map(Shape::ndim)
    }

    fn shape_column(&self) -> Option<Shape> {
        self.desc().fixed_shape().cloned()
    }

    fn can_change_shape(&self) -> bool {
        self.desc().is_array() && self.desc().fixed_shape().is_none()
    }

    /// Reset cells `rows` to the column's initial value (if it has one).
    fn initialize(&self, rows: Range<usize>) -> TableResult<()> {
        let Some(value) = self.desc().initial_value() else {
            return Ok(());
        };
        for row in rows {
            self.put(row, value.clone())?;
        }
        Ok(())
    }

    fn get_array(&self, row: usize) -> TableResult<ArrayValue> {
        match self.get(row)? {
            Value::Array(array) => Ok(array),
            _ => Err(TableError::NotArrayColumn(self.desc().name.clone())),
        }
    }

    fn get_slice(&self, row: usize, slicer: &Slicer) -> TableResult<ArrayValue> {
        self.get_array(row)?.slice(slicer)
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
        let desc = self.desc();
        if desc.is_array() {
            return Err(TableError::NotScalarColumn(desc.name.clone()));
        }
        let values = rows
            .iter()
            .map(|row| self.get(row))
            .collect::<TableResult<Vec<_>>>()?;
        ArrayValue::from_values(desc.data_type, Shape::vector(values.len()), values)
    }

    fn get_array_column_cells(&self, rows: &RowNumbers) -> TableResult<ArrayValue> {
        let desc = self.desc();
        if !desc.is_array() {
            return Err(TableError::NotArrayColumn(desc.name.clone()));
        }
        let cells = rows
            .iter()
            .map(|row| self.get_array(row))
            .collect::<TableResult<Vec<_>>>()?;
        ArrayValue::stack(desc.data_type, &cells)
    }

    fn get_column_slice_cells(
        &self,
        rows: &RowNumbers,
        slicer: &Slicer,
    ) -> TableResult<ArrayValue> {
        let desc = self.desc();
        if !desc.is_array() {
            return Err(TableError::NotArrayColumn(desc.name.clone()));
        }
        let cells = rows
            .iter()
            .map(|row| self.get_slice(row, slicer))
            .collect::<TableResult<Vec<_>>>()?;
        ArrayValue::stack(desc.data_type, &cells)
    }

    fn put_array(&self, row: usize, array: &ArrayValue) -> TableResult<()> {
        self.put(row, Value::Array(array.clone()))
    }

    fn put_slice(&self, row: usize, slicer: &Slicer, array: &ArrayValue) -> TableResult<()> {
        if !self.is_writable() {
            return Err(TableError::NotWritable {
                column: self.desc().name.clone(),
            });
        }
        let mut cell = self.get_array(row)?;
        cell.assign_slice(slicer, array)?;
        self.put_array(row, &cell)
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
        let desc = self.desc();
        if desc.is_array() {
            return Err(TableError::NotScalarColumn(desc.name.clone()));
        }
        if values.len() != rows.len() {
            return Err(TableError::ShapeMismatch {
                expected: Shape::vector(rows.len()),
                actual: values.shape().clone(),
            });
        }
        for (row, value) in rows.iter().zip(values.to_values()) {
            self.put(row, value)?;
        }
        Ok(())
    }

    fn put_array_column_cells(&self, rows: &RowNumbers, values: &ArrayValue) -> TableResult<()> {
        let cells = unstack_for(rows, values)?;
        for (row, cell) in rows.iter().zip(&cells) {
            self.put_array(row, cell)?;
        }
        Ok(())
    }

    fn put_column_slice_cells(
        &self,
        rows: &RowNumbers,
        slicer: &Slicer,
        values: &ArrayValue,
    ) -> TableResult<()> {
        let cells = unstack_for(rows, values)?;
        for (row, cell) in rows.iter().zip(&cells) {
            self.put_slice(row, slicer, cell)?;
        }
        Ok(())
    }

    /// Sort values of this column for `rows`, in the order given.
    fn make_sort_key(&self, rows: &RowNumbers, order: SortOrder) -> TableResult<SortKey> {
        let values = rows
            .iter()
            .map(|row| {
                if self.is_defined(row)? {
                    SortValue::from_value(&self.get(row)?)
                } else {
                    Ok(SortValue::Undefined)
                }
            })
            .collect::<TableResult<Vec<_>>>()?;
        Ok(SortKey::new(values, order))
    }

    /// Buffers for iterating this column in runs of equal values.
    fn alloc_iter_buf(&self) -> TableResult<IterBuf> {
        let desc = self.desc();
        if desc.is_array() || !desc.data_type.is_orderable() {
            return Err(TableError::UnsupportedType {
                data_type: desc.data_type,
                context: format!("iteration over column {}", desc.name),
            });
        }
        Ok(IterBuf::new())
    }
}

fn unstack_for(rows: &RowNumbers, values: &ArrayValue) -> TableResult<Vec<ArrayValue>> {
    let cells = values.unstack();
    if cells.len() != rows.len() {
        return Err(TableError::ShapeMismatch {
            expected: values.shape().without_last().appended(rows.len()),
            actual: values.shape().clone(),
        });
    }
    Ok(cells)
}
