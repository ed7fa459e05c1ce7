//! Expression nodes consumed by the GROUP BY engine.
//!
//! Parsing is out of scope here: callers build node trees directly. A node has a static result
//! type and kind (scalar or array) and can be evaluated for a [`RowId`]. Aggregate nodes (see
//! [`crate::AggrNode`]) additionally manufacture the [`GroupFunc`] that accumulates them.

use crate::error::{TaqlError, TaqlResult};
use crate::func::GroupFunc;
use crate::row_id::RowId;
use astrotab_columnar::{ArrayValue, DataType, MArray, MjdTime, Table, TableColumn, Value};
use num_complex::Complex64;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Array,
}

fn not_implemented<N: ExprNode + ?Sized>(node: &N, getter: &'static str) -> TaqlError {
    TaqlError::NotImplemented {
        func: node.name(),
        getter,
    }
}

fn wrong_array(name: &str, expected: DataType, actual: DataType) -> TaqlError {
    TaqlError::Type(format!(
        "{name} yields an array of {actual}, expected an array of {expected}"
    ))
}

pub trait ExprNode: fmt::Debug + Send + Sync {
    fn name(&self) -> String;

    fn data_type(&self) -> DataType;

    fn value_kind(&self) -> ValueKind {
        ValueKind::Scalar
    }

    fn get_bool(&self, _id: RowId) -> TaqlResult<bool> {
        Err(not_implemented(self, "get_bool"))
    }

    fn get_int(&self, _id: RowId) -> TaqlResult<i64> {
        Err(not_implemented(self, "get_int"))
    }

    /// Integer nodes also serve doubles.
    fn get_double(&self, id: RowId) -> TaqlResult<f64> {
        match (self.data_type(), self.value_kind()) {
            (DataType::Int, ValueKind::Scalar) => Ok(self.get_int(id)? as f64),
            _ => Err(not_implemented(self, "get_double")),
        }
    }

    fn get_complex(&self, id: RowId) -> TaqlResult<Complex64> {
        match (self.data_type(), self.value_kind()) {
            (DataType::Int | DataType::Double, ValueKind::Scalar) => {
                Ok(Complex64::new(self.get_double(id)?, 0.0))
            }
            _ => Err(not_implemented(self, "get_complex")),
        }
    }

    fn get_string(&self, _id: RowId) -> TaqlResult<Arc<str>> {
        Err(not_implemented(self, "get_string"))
    }

    fn get_date(&self, _id: RowId) -> TaqlResult<MjdTime> {
        Err(not_implemented(self, "get_date"))
    }

    fn get_array(&self, _id: RowId) -> TaqlResult<ArrayValue> {
        Err(not_implemented(self, "get_array"))
    }

    fn get_array_bool(&self, id: RowId) -> TaqlResult<MArray<bool>> {
        match self.get_array(id)? {
            ArrayValue::Bool(a) => Ok(a),
            other => Err(wrong_array(&self.name(), DataType::Bool, other.data_type())),
        }
    }

    fn get_array_int(&self, id: RowId) -> TaqlResult<MArray<i64>> {
        match self.get_array(id)? {
            ArrayValue::Int(a) => Ok(a),
            other => Err(wrong_array(&self.name(), DataType::Int, other.data_type())),
        }
    }

    fn get_array_double(&self, id: RowId) -> TaqlResult<MArray<f64>> {
        match self.get_array(id)? {
            ArrayValue::Double(a) => Ok(a),
            ArrayValue::Int(a) => Ok(a.map(|v| *v as f64)),
            other => Err(wrong_array(&self.name(), DataType::Double, other.data_type())),
        }
    }

    fn get_array_complex(&self, id: RowId) -> TaqlResult<MArray<Complex64>> {
        match self.get_array(id)? {
            ArrayValue::Complex(a) => Ok(a),
            other => Err(wrong_array(&self.name(), DataType::Complex, other.data_type())),
        }
    }

    fn get_array_string(&self, id: RowId) -> TaqlResult<MArray<Arc<str>>> {
        match self.get_array(id)? {
            ArrayValue::String(a) => Ok(a),
            other => Err(wrong_array(&self.name(), DataType::String, other.data_type())),
        }
    }

    fn get_array_date(&self, id: RowId) -> TaqlResult<MArray<MjdTime>> {
        match self.get_array(id)? {
            ArrayValue::Date(a) => Ok(a),
            other => Err(wrong_array(&self.name(), DataType::Date, other.data_type())),
        }
    }

    /// Evaluate for `id` using the getter matching the node's static type.
    fn get_value(&self, id: RowId) -> TaqlResult<Value> {
        if self.value_kind() == ValueKind::Array {
            return self.get_array(id).map(Value::Array);
        }
        Ok(match self.data_type() {
            DataType::Bool => Value::Bool(self.get_bool(id)?),
            DataType::Int => Value::Int(self.get_int(id)?),
            DataType::Double => Value::Double(self.get_double(id)?),
            DataType::Complex => Value::Complex(self.get_complex(id)?),
            DataType::String => Value::String(self.get_string(id)?),
            DataType::Date => Value::Date(self.get_date(id)?),
        })
    }

    fn is_aggregate(&self) -> bool {
        false
    }

    /// A fresh accumulator for one group. Only aggregate nodes can make one.
    fn make_group_func(&self) -> TaqlResult<GroupFunc> {
        Err(TaqlError::InvalidExpr(format!(
            "{} is not an aggregate function",
            self.name()
        )))
    }
}

/// Pull a scalar of the expected type out of a cell value.
fn typed<T>(name: &str, value: Value, pick: impl FnOnce(&Value) -> Option<T>) -> TaqlResult<T> {
    pick(&value).ok_or_else(|| {
        TaqlError::Type(format!(
            "{name} yields a {} value where another type was expected",
            value.data_type()
        ))
    })
}

/// Reads a column of a table or view.
#[derive(Debug, Clone)]
pub struct ColumnNode {
    column: Arc<dyn TableColumn>,
}

impl ColumnNode {
    pub fn new(table: &dyn Table, name: &str) -> TaqlResult<Self> {
        Ok(Self {
            column: table.column(name)?,
        })
    }

    pub fn from_column(column: Arc<dyn TableColumn>) -> Self {
        Self { column }
    }

    fn cell(&self, id: RowId) -> TaqlResult<Value> {
        Ok(self.column.get(id.rownr())?)
    }
}

impl ExprNode for ColumnNode {
    fn name(&self) -> String {
        self.column.desc().name.clone()
    }

    fn data_type(&self) -> DataType {
        self.column.desc().data_type
    }

    fn value_kind(&self) -> ValueKind {
        if self.column.desc().is_array() {
            ValueKind::Array
        } else {
            ValueKind::Scalar
        }
    }

    fn get_bool(&self, id: RowId) -> TaqlResult<bool> {
        typed(&self.name(), self.cell(id)?, Value::as_bool)
    }

    fn get_int(&self, id: RowId) -> TaqlResult<i64> {
        typed(&self.name(), self.cell(id)?, Value::as_int)
    }

    fn get_double(&self, id: RowId) -> TaqlResult<f64> {
        typed(&self.name(), self.cell(id)?, Value::as_double)
    }

    fn get_complex(&self, id: RowId) -> TaqlResult<Complex64> {
        typed(&self.name(), self.cell(id)?, Value::as_complex)
    }

    fn get_string(&self, id: RowId) -> TaqlResult<Arc<str>> {
        typed(&self.name(), self.cell(id)?, |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    fn get_date(&self, id: RowId) -> TaqlResult<MjdTime> {
        typed(&self.name(), self.cell(id)?, Value::as_date)
    }

    fn get_array(&self, id: RowId) -> TaqlResult<ArrayValue> {
        Ok(self.column.get_array(id.rownr())?)
    }
}

/// A literal.
#[derive(Debug, Clone)]
pub struct ConstNode {
    value: Value,
}

impl ConstNode {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl ExprNode for ConstNode {
    fn name(&self) -> String {
        self.value.to_string()
    }

    fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    fn value_kind(&self) -> ValueKind {
        if self.value.is_array() {
            ValueKind::Array
        } else {
            ValueKind::Scalar
        }
    }

    fn get_bool(&self, _id: RowId) -> TaqlResult<bool> {
        typed(&self.name(), self.value.clone(), Value::as_bool)
    }

    fn get_int(&self, _id: RowId) -> TaqlResult<i64> {
        typed(&self.name(), self.value.clone(), Value::as_int)
    }

    fn get_double(&self, _id: RowId) -> TaqlResult<f64> {
        typed(&self.name(), self.value.clone(), Value::as_double)
    }

    fn get_complex(&self, _id: RowId) -> TaqlResult<Complex64> {
        typed(&self.name(), self.value.clone(), Value::as_complex)
    }

    fn get_string(&self, _id: RowId) -> TaqlResult<Arc<str>> {
        match &self.value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(not_implemented(self, "get_string")),
        }
    }

    fn get_date(&self, _id: RowId) -> TaqlResult<MjdTime> {
        typed(&self.name(), self.value.clone(), Value::as_date)
    }

    fn get_array(&self, _id: RowId) -> TaqlResult<ArrayValue> {
        match &self.value {
            Value::Array(a) => Ok(a.clone()),
            _ => Err(not_implemented(self, "get_array")),
        }
    }
}

/// The row number of the row being evaluated (`ROWNUMBER()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RowNumberNode;

impl ExprNode for RowNumberNode {
    fn name(&self) -> String {
        "rownumber".to_string()
    }

    fn data_type(&self) -> DataType {
        DataType::Int
    }

    fn get_int(&self, id: RowId) -> TaqlResult<i64> {
        i64::try_from(id.rownr())
            .map_err(|_| TaqlError::Type(format!("{id} does not fit an integer")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrotab_columnar::{ColumnDesc, MemoryColumn};

    #[test]
    fn int_nodes_serve_doubles() {
        let node = RowNumberNode;
        assert_eq!(node.get_double(RowId::new(7)).unwrap(), 7.0);
        assert_eq!(node.get_value(RowId::new(3)).unwrap(), Value::Int(3));
        assert!(matches!(
            node.get_string(RowId::new(0)),
            Err(TaqlError::NotImplemented { getter: "get_string", .. })
        ));
    }

    #[test]
    fn column_node_reads_cells() {
        let column = MemoryColumn::from_values(
            ColumnDesc::scalar("NAME", DataType::String),
            vec![Value::from("a"), Value::from("b")],
        )
        .unwrap();
        let node = ColumnNode::from_column(Arc::new(column));
        assert_eq!(&*node.get_string(RowId::new(1)).unwrap(), "b");
        assert!(matches!(
            node.get_string(RowId::new(2)),
            Err(TaqlError::Table(_))
        ));
        assert!(!node.is_aggregate());
        assert!(node.make_group_func().is_err());
    }
}
