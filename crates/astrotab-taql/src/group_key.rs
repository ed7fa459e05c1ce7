use crate::error::{TaqlError, TaqlResult};
use crate::expr::{ExprNode, ValueKind};
use crate::row_id::RowId;
use astrotab_columnar::{DataType, MjdTime, Value};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::sync::Arc;

/// One component of a group key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Bool(bool),
    Int(i64),
    Double(OrderedFloat<f64>),
    String(Arc<str>),
}

impl KeyValue {
    fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Bool => KeyValue::Bool(false),
            DataType::Int => KeyValue::Int(0),
            DataType::String => KeyValue::String(Arc::from("")),
            _ => KeyValue::Double(OrderedFloat(0.0)),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            KeyValue::Bool(_) => 0,
            KeyValue::Int(_) => 1,
            KeyValue::Double(_) => 2,
            KeyValue::String(_) => 3,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Bool(b) => Value::Bool(*b),
            KeyValue::Int(n) => Value::Int(*n),
            KeyValue::Double(x) => Value::Double(x.0),
            KeyValue::String(s) => Value::String(s.clone()),
        }
    }
}

/// The values of the GROUP BY expressions for one row.
///
/// Keys order lexicographically; comparing two sets built from different expression lists is a
/// programming error and panics.
#[derive(Clone, Debug)]
pub struct GroupKeySet {
    keys: Vec<KeyValue>,
}

impl GroupKeySet {
    /// A template with one zeroed slot per expression. Arrays and complex values cannot be keys.
    pub fn build(exprs: &[Arc<dyn ExprNode>]) -> TaqlResult<Self> {
        let keys = exprs
            .iter()
            .map(|expr| {
                if expr.value_kind() == ValueKind::Array || expr.data_type() == DataType::Complex {
                    let data_type = match expr.value_kind() {
                        ValueKind::Array => format!("array of {}", expr.data_type()),
                        ValueKind::Scalar => expr.data_type().to_string(),
                    };
                    return Err(TaqlError::UnsupportedKeyType {
                        expr: expr.name(),
                        data_type,
                    });
                }
                Ok(KeyValue::zero(expr.data_type()))
            })
            .collect::<TaqlResult<Vec<_>>>()?;
        Ok(Self { keys })
    }

    /// Overwrite the slots with the expression values for `id`. Dates are keyed by their MJD.
    pub fn fill(&mut self, exprs: &[Arc<dyn ExprNode>], id: RowId) -> TaqlResult<()> {
        for (slot, expr) in self.keys.iter_mut().zip(exprs) {
            *slot = match expr.data_type() {
                DataType::Bool => KeyValue::Bool(expr.get_bool(id)?),
                DataType::Int => KeyValue::Int(expr.get_int(id)?),
                DataType::Double => KeyValue::Double(OrderedFloat(expr.get_double(id)?)),
                DataType::Date => KeyValue::Double(OrderedFloat(expr.get_date(id)?.days())),
                DataType::String => KeyValue::String(expr.get_string(id)?),
                DataType::Complex => {
                    return Err(TaqlError::UnsupportedKeyType {
                        expr: expr.name(),
                        data_type: DataType::Complex.to_string(),
                    })
                }
            };
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.keys
    }

    /// The key as cell values, restoring dates for the slots whose expression is a date.
    pub fn to_values(&self, types: &[DataType]) -> Vec<Value> {
        self.keys
            .iter()
            .zip(types)
            .map(|(key, data_type)| match (key, data_type) {
                (KeyValue::Double(x), DataType::Date) => Value::Date(MjdTime::from_days(x.0)),
                (key, _) => key.to_value(),
            })
            .collect()
    }
}

impl PartialEq for GroupKeySet {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKeySet {}

impl PartialOrd for GroupKeySet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKeySet {
    fn cmp(&self, other: &Self) -> Ordering {
        assert_eq!(
            self.keys.len(),
            other.keys.len(),
            "group key sets of different length"
        );
        for (a, b) in self.keys.iter().zip(&other.keys) {
            assert_eq!(a.rank(), b.rank(), "group key slots of different type");
            let ord = match (a, b) {
                (KeyValue::Bool(a), KeyValue::Bool(b)) => a.cmp(b),
                (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
                (KeyValue::Double(a), KeyValue::Double(b)) => a.cmp(b),
                (KeyValue::String(a), KeyValue::String(b)) => a.as_ref().cmp(b.as_ref()),
                _ => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ConstNode, RowNumberNode};
    use num_complex::Complex64;
    use pretty_assertions::assert_eq;

    #[test]
    fn complex_keys_are_rejected() {
        let exprs: Vec<Arc<dyn ExprNode>> =
            vec![Arc::new(ConstNode::new(Complex64::new(1.0, 2.0)))];
        assert_eq!(
            GroupKeySet::build(&exprs).unwrap_err(),
            TaqlError::UnsupportedKeyType {
                expr: "(1, 2)".to_string(),
                data_type: "dcomplex".to_string(),
            }
        );
    }

    #[test]
    fn keys_order_lexicographically() {
        let exprs: Vec<Arc<dyn ExprNode>> =
            vec![Arc::new(ConstNode::new("a")), Arc::new(RowNumberNode)];
        let mut first = GroupKeySet::build(&exprs).unwrap();
        let mut second = first.clone();
        first.fill(&exprs, RowId::new(3)).unwrap();
        second.fill(&exprs, RowId::new(10)).unwrap();
        assert!(first < second);
        assert_eq!(
            first.values(),
            &[KeyValue::String(Arc::from("a")), KeyValue::Int(3)]
        );
    }

    #[test]
    #[should_panic(expected = "group key sets of different length")]
    fn comparing_unrelated_key_sets_panics() {
        let one: Vec<Arc<dyn ExprNode>> = vec![Arc::new(RowNumberNode)];
        let a = GroupKeySet::build(&one).unwrap();
        let b = GroupKeySet::build(&[]).unwrap();
        let _ = a.cmp(&b);
    }
}
