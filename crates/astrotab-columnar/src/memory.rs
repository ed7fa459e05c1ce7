use crate::array::{ArrayValue, Shape};
use crate::column::{check_row, ColumnDesc, Keywords, TableColumn};
use crate::error::{TableError, TableResult};
use crate::types::Value;
use std::sync::RwLock;

/// Column whose cells live contiguously in memory.
///
/// Scalar cells always hold a value. Array cells of a variable-shape column are undefined
/// until written or given a shape.
#[derive(Debug)]
pub struct MemoryColumn {
    desc: ColumnDesc,
    cells: RwLock<Vec<Option<Value>>>,
    keywords: RwLock<Keywords>,
    writable: bool,
}

impl MemoryColumn {
    /// A column of `nrow` cells holding the description's initial value.
    pub fn new(desc: ColumnDesc, nrow: usize) -> Self {
        let initial = desc.initial_value();
        Self {
            desc,
            cells: RwLock::new(vec![initial; nrow]),
            keywords: RwLock::new(Keywords::new()),
            writable: true,
        }
    }

    pub fn from_values(desc: ColumnDesc, values: Vec<Value>) -> TableResult<Self> {
        let cells = values
            .into_iter()
            .map(|v| desc.conform(v).map(Some))
            .collect::<TableResult<Vec<_>>>()?;
        Ok(Self {
            desc,
            cells: RwLock::new(cells),
            keywords: RwLock::new(Keywords::new()),
            writable: true,
        })
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    fn not_writable(&self) -> TableError {
        TableError::NotWritable {
            column: self.desc.name.clone(),
        }
    }

    fn undefined(&self, row: usize) -> TableError {
        TableError::Undefined {
            column: self.desc.name.clone(),
            row,
        }
    }
}

impl TableColumn for MemoryColumn {
    fn desc(&self) -> &ColumnDesc {
        &self.desc
    }

    fn nrow(&self) -> usize {
        self.cells.read().expect("column cells poisoned").len()
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn keywords(&self) -> Keywords {
        self.keywords.read().expect("column keywords poisoned").clone()
    }

    fn set_keyword(&self, name: &str, value: Value) -> TableResult<()> {
        if !self.writable {
            return Err(self.not_writable());
        }
        self.keywords
            .write()
            .expect("column keywords poisoned")
            .insert(name.to_string(), value);
        Ok(())
    }

    fn is_defined(&self, row: usize) -> TableResult<bool> {
        let cells = self.cells.read().expect("column cells poisoned");
        check_row(row, cells.len())?;
        Ok(cells[row].is_some())
    }

    fn set_shape(&self, row: usize, shape: &Shape) -> TableResult<()> {
        if !self.desc.is_array() {
            return Err(TableError::NotArrayColumn(self.desc.name.clone()));
        }
        if let Some(fixed) = self.desc.fixed_shape() {
            if fixed != shape {
                return Err(TableError::ShapeFixed {
                    column: self.desc.name.clone(),
                    shape: fixed.clone(),
                });
            }
        }
        if !self.writable {
            return Err(self.not_writable());
        }
        let mut cells = self.cells.write().expect("column cells poisoned");
        check_row(row, cells.len())?;
        let keep = matches!(&cells[row], Some(Value::Array(a)) if a.shape() == shape);
        if !keep {
            cells[row] = Some(Value::Array(ArrayValue::filled(
                self.desc.data_type,
                shape.clone(),
            )));
        }
        Ok(())
    }

    fn shape(&self, row: usize) -> TableResult<Shape> {
        if !self.desc.is_array() {
            return Err(TableError::NotArrayColumn(self.desc.name.clone()));
        }
        let cells = self.cells.read().expect("column cells poisoned");
        check_row(row, cells.len())?;
        match &cells[row] {
            Some(Value::Array(a)) => Ok(a.shape().clone()),
            _ => Err(self.undefined(row)),
        }
    }

    fn get(&self, row: usize) -> TableResult<Value> {
        let cells = self.cells.read().expect("column cells poisoned");
        check_row(row, cells.len())?;
        cells[row].clone().ok_or_else(|| self.undefined(row))
    }

    fn put(&self, row: usize, value: Value) -> TableResult<()> {
        if !self.writable {
            return Err(self.not_writable());
        }
        let value = self.desc.conform(value)?;
        let mut cells = self.cells.write().expect("column cells poisoned");
        check_row(row, cells.len())?;
        cells[row] = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{MArray, Slicer};
    use crate::column::RowNumbers;
    use crate::types::DataType;

    #[test]
    fn variable_shape_cells_start_undefined() {
        let col = MemoryColumn::new(ColumnDesc::array("SPEC", DataType::Double), 2);
        assert!(!col.is_defined(0).unwrap());
        assert!(matches!(col.get(0), Err(TableError::Undefined { .. })));

        col.set_shape(0, &Shape::new(vec![2, 2])).unwrap();
        assert!(col.is_defined(0).unwrap());
        assert_eq!(col.ndim(0).unwrap(), 2);
        assert!(col.can_change_shape());
    }

    #[test]
    fn put_slice_updates_part_of_a_cell() {
        let col = MemoryColumn::new(
            ColumnDesc::fixed_array("DATA", DataType::Int, Shape::vector(4)),
            1,
        );
        let patch = ArrayValue::Int(MArray::from_vec(vec![7, 8]));
        col.put_slice(0, &Slicer::new(vec![1], vec![2]), &patch).unwrap();
        assert_eq!(
            col.get_array(0).unwrap(),
            ArrayValue::Int(MArray::from_vec(vec![0, 7, 8, 0]))
        );
    }

    #[test]
    fn read_only_column_rejects_writes() {
        let col = MemoryColumn::from_values(
            ColumnDesc::scalar("X", DataType::Int),
            vec![Value::Int(1), Value::Int(2)],
        )
        .unwrap()
        .read_only();
        assert!(matches!(
            col.put(0, Value::Int(9)),
            Err(TableError::NotWritable { .. })
        ));
        assert_eq!(col.get(0).unwrap(), Value::Int(1));
    }

    #[test]
    fn scalar_column_cells_follow_requested_rows() {
        let col = MemoryColumn::from_values(
            ColumnDesc::scalar("X", DataType::Double),
            vec![Value::Double(1.0), Value::Double(2.0), Value::Double(3.0)],
        )
        .unwrap();
        let picked = col
            .get_scalar_column_cells(&RowNumbers::List(vec![2, 0]))
            .unwrap();
        assert_eq!(picked.to_values(), vec![Value::Double(3.0), Value::Double(1.0)]);
    }
}
