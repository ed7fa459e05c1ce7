use crate::error::{TableError, TableResult};
use crate::types::Value;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// A cell value normalized for sorting and run detection.
///
/// Undefined cells sort first. Dates sort as their day count.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortValue {
    Undefined,
    Bool(bool),
    Int(i64),
    Double(OrderedFloat<f64>),
    String(Arc<str>),
}

impl SortValue {
    pub fn from_value(value: &Value) -> TableResult<SortValue> {
        Ok(match value {
            Value::Bool(b) => SortValue::Bool(*b),
            Value::Int(v) => SortValue::Int(*v),
            Value::Double(v) => SortValue::Double(OrderedFloat(*v)),
            Value::Date(d) => SortValue::Double(OrderedFloat(d.days())),
            Value::String(s) => SortValue::String(s.clone()),
            Value::Complex(_) | Value::Array(_) => {
                return Err(TableError::UnsupportedType {
                    data_type: value.data_type(),
                    context: if value.is_array() {
                        "sorting (array cells)".to_string()
                    } else {
                        "sorting".to_string()
                    },
                })
            }
        })
    }
}

/// The sort values of one column for a sequence of rows, with a direction.
#[derive(Clone, Debug)]
pub struct SortKey {
    values: Vec<SortValue>,
    order: SortOrder,
}

impl SortKey {
    pub fn new(values: Vec<SortValue>, order: SortOrder) -> Self {
        Self { values, order }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn value(&self, pos: usize) -> Option<&SortValue> {
        self.values.get(pos)
    }

    /// Compare the rows at positions `a` and `b` of this key.
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        let ord = self.values[a].cmp(&self.values[b]);
        match self.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    }
}

/// Stable multi-key sort: positions `0..len` ordered by the keys in turn.
pub fn sort_positions(keys: &[SortKey]) -> Vec<usize> {
    let len = keys.first().map(SortKey::len).unwrap_or(0);
    debug_assert!(keys.iter().all(|k| k.len() == len), "sort keys differ in length");
    let mut positions: Vec<usize> = (0..len).collect();
    positions.sort_by(|&a, &b| {
        keys.iter()
            .map(|k| k.compare(a, b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    positions
}

/// Last and current value of an iteration column, used to detect where runs of equal values
/// end while iterating a sorted table.
#[derive(Clone, Debug, Default)]
pub struct IterBuf {
    last: Option<SortValue>,
    current: Option<SortValue>,
}

impl IterBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the next row's value; true when it starts a new run.
    pub fn advance(&mut self, value: SortValue) -> bool {
        self.last = self.current.take();
        let changed = self.last.as_ref() != Some(&value);
        self.current = Some(value);
        changed
    }

    pub fn last(&self) -> Option<&SortValue> {
        self.last.as_ref()
    }

    pub fn current(&self) -> Option<&SortValue> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_key_sort_is_stable() {
        let k1 = SortKey::new(
            vec![SortValue::Int(2), SortValue::Int(1), SortValue::Int(2), SortValue::Int(1)],
            SortOrder::Ascending,
        );
        let k2 = SortKey::new(
            vec![
                SortValue::Double(OrderedFloat(0.5)),
                SortValue::Double(OrderedFloat(0.5)),
                SortValue::Double(OrderedFloat(1.5)),
                SortValue::Double(OrderedFloat(0.5)),
            ],
            SortOrder::Descending,
        );
        assert_eq!(sort_positions(&[k1, k2]), vec![1, 3, 2, 0]);
    }

    #[test]
    fn iter_buf_reports_run_starts() {
        let mut buf = IterBuf::new();
        let runs: Vec<bool> = [1, 1, 2, 2, 2, 1]
            .into_iter()
            .map(|v| buf.advance(SortValue::Int(v)))
            .collect();
        assert_eq!(runs, vec![true, false, true, false, false, true]);
        assert_eq!(buf.last(), Some(&SortValue::Int(2)));
    }
}
