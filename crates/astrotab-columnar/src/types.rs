use crate::array::ArrayValue;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use num_complex::Complex64;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Element type of a column, an expression or a value cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int,
    Double,
    Complex,
    String,
    Date,
}

impl DataType {
    /// Whether values of this type have a total order (usable as sort or group keys).
    pub fn is_orderable(self) -> bool {
        !matches!(self, DataType::Complex)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int | DataType::Double | DataType::Complex)
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Double => "double",
            DataType::Complex => "dcomplex",
            DataType::String => "string",
            DataType::Date => "date",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A date/time stored as a Modified Julian Date in (fractional) days.
///
/// The double representation is what grouping and sorting compare, so ordering dates is
/// numeric ordering of the day count.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct MjdTime(pub f64);

fn mjd_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1858, 11, 17)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("MJD epoch is a valid calendar date")
}

impl MjdTime {
    pub fn from_days(days: f64) -> Self {
        Self(days)
    }

    pub fn days(self) -> f64 {
        self.0
    }

    pub fn from_datetime(value: NaiveDateTime) -> Self {
        let delta = value - mjd_epoch();
        Self(delta.num_milliseconds() as f64 / MILLIS_PER_DAY)
    }

    /// Convert to a calendar date/time with millisecond precision.
    ///
    /// Returns `None` when the day count is not finite or out of chrono's range.
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        if !self.0.is_finite() {
            return None;
        }
        let millis = (self.0 * MILLIS_PER_DAY).round();
        if millis.abs() > i64::MAX as f64 {
            return None;
        }
        let delta = TimeDelta::try_milliseconds(millis as i64)?;
        mjd_epoch().checked_add_signed(delta)
    }
}

impl fmt::Display for MjdTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y/%m/%d/%H:%M:%S%.3f")),
            None => write!(f, "{}d", self.0),
        }
    }
}

/// A typed value cell: one scalar of a [`DataType`] or an array of one.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    Complex(Complex64),
    String(Arc<str>),
    Date(MjdTime),
    Array(ArrayValue),
}

impl Value {
    /// The element data type (for arrays, the type of their elements).
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Double(_) => DataType::Double,
            Value::Complex(_) => DataType::Complex,
            Value::String(_) => DataType::String,
            Value::Date(_) => DataType::Date,
            Value::Array(a) => a.data_type(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// The zero/empty value stored in fresh cells of a column.
    pub fn zero(data_type: DataType) -> Value {
        match data_type {
            DataType::Bool => Value::Bool(false),
            DataType::Int => Value::Int(0),
            DataType::Double => Value::Double(0.0),
            DataType::Complex => Value::Complex(Complex64::new(0.0, 0.0)),
            DataType::String => Value::String(Arc::from("")),
            DataType::Date => Value::Date(MjdTime::default()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Date(d) => Some(d.days()),
            _ => None,
        }
    }

    pub fn as_complex(&self) -> Option<Complex64> {
        match self {
            Value::Int(v) => Some(Complex64::new(*v as f64, 0.0)),
            Value::Double(v) => Some(Complex64::new(*v, 0.0)),
            Value::Complex(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<MjdTime> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Double(v) => Some(MjdTime(*v)),
            Value::Int(v) => Some(MjdTime(*v as f64)),
            _ => None,
        }
    }

    /// Convert the value to `target`, widening numerics where that is lossless enough for
    /// storage (int -> double -> complex, double <-> date).
    pub fn coerce(self, target: DataType) -> Option<Value> {
        if let Value::Array(array) = self {
            return array.coerce(target).map(Value::Array);
        }
        match target {
            DataType::Bool => self.as_bool().map(Value::Bool),
            DataType::Int => self.as_int().map(Value::Int),
            DataType::Double => match self {
                Value::Date(_) => None,
                other => other.as_double().map(Value::Double),
            },
            DataType::Complex => self.as_complex().map(Value::Complex),
            DataType::String => match self {
                Value::String(s) => Some(Value::String(s)),
                _ => None,
            },
            DataType::Date => self.as_date().map(Value::Date),
        }
    }

    /// Compare two values of the same discriminant.
    ///
    /// Complex numbers and arrays have no order, and neither do values of different types;
    /// those yield `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => Some(a.total_cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.as_ref().cmp(b.as_ref())),
            (Value::Date(a), Value::Date(b)) => Some(a.0.total_cmp(&b.0)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Complex(c) => write!(f, "({}, {})", c.re, c.im),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Array(a) => write!(f, "{}[{}]", a.data_type(), a.shape()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Complex64> for Value {
    fn from(v: Complex64) -> Self {
        Value::Complex(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<Arc<str>> for Value {
    fn from(v: Arc<str>) -> Self {
        Value::String(v)
    }
}

impl From<MjdTime> for Value {
    fn from(v: MjdTime) -> Self {
        Value::Date(v)
    }
}

impl From<ArrayValue> for Value {
    fn from(v: ArrayValue) -> Self {
        Value::Array(v)
    }
}
