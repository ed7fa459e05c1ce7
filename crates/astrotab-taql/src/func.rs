//! Per-group aggregate state machines.
//!
//! A [`GroupFunc`] accumulates one aggregate for one group. Eager functions fold every row into
//! a running value as it arrives. Lazy functions only record row ids while rows stream in and
//! compute their value in [`GroupFunc::finish`]; reading them before that is an error.
//!
//! ```text
//! Fresh --apply--> Accumulating --finish (lazy only)--> Finalized
//! Ready (constructed with its value; apply is a no-op)
//! ```

use crate::error::{TaqlError, TaqlResult};
use crate::expr::{ExprNode, ValueKind};
use crate::row_id::RowId;
use astrotab_columnar::{ArrayMask, ArrayValue, DataType, MArray, MjdTime, Shape, Value};
use num_complex::Complex64;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuncState {
    Fresh,
    Accumulating,
    Finalized,
    Ready,
}

/// How an eager accumulator folds a value into its running state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Combine {
    Count,
    NTrue,
    Any,
    All,
    Sum,
    Product,
    SumSqr,
    Min,
    Max,
    Mean,
}

/// What a lazy aggregate computes from the operand values of its rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum LazyReduce {
    Gather,
    Median,
    Fractile(f64),
    Variance,
    StdDev,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Getter {
    Bool,
    Int,
    Double,
    Complex,
    String,
    Date,
    Array,
    ArrayOf(DataType),
}

impl Getter {
    fn name(self) -> &'static str {
        match self {
            Getter::Bool => "get_bool",
            Getter::Int => "get_int",
            Getter::Double => "get_double",
            Getter::Complex => "get_complex",
            Getter::String => "get_string",
            Getter::Date => "get_date",
            Getter::Array => "get_array",
            Getter::ArrayOf(DataType::Bool) => "get_array_bool",
            Getter::ArrayOf(DataType::Int) => "get_array_int",
            Getter::ArrayOf(DataType::Double) => "get_array_double",
            Getter::ArrayOf(DataType::Complex) => "get_array_complex",
            Getter::ArrayOf(DataType::String) => "get_array_string",
            Getter::ArrayOf(DataType::Date) => "get_array_date",
        }
    }

    fn for_type(data_type: DataType, kind: ValueKind) -> Getter {
        match (kind, data_type) {
            (ValueKind::Array, _) => Getter::Array,
            (ValueKind::Scalar, DataType::Bool) => Getter::Bool,
            (ValueKind::Scalar, DataType::Int) => Getter::Int,
            (ValueKind::Scalar, DataType::Double) => Getter::Double,
            (ValueKind::Scalar, DataType::Complex) => Getter::Complex,
            (ValueKind::Scalar, DataType::String) => Getter::String,
            (ValueKind::Scalar, DataType::Date) => Getter::Date,
        }
    }

    /// `value` in the form this getter returns, if it has one.
    fn conform(self, value: Value) -> Option<Value> {
        match (self, value) {
            (Getter::Bool, v @ Value::Bool(_))
            | (Getter::Int, v @ Value::Int(_))
            | (Getter::Double, v @ Value::Double(_))
            | (Getter::Complex, v @ Value::Complex(_))
            | (Getter::String, v @ Value::String(_))
            | (Getter::Date, v @ Value::Date(_))
            | (Getter::Array, v @ Value::Array(_)) => Some(v),
            (Getter::Double, Value::Int(n)) => Some(Value::Double(n as f64)),
            (Getter::ArrayOf(dt), Value::Array(a)) if a.data_type() == dt => Some(Value::Array(a)),
            _ => None,
        }
    }
}

fn missing_operand(func: &str) -> TaqlError {
    TaqlError::InvalidExpr(format!("aggregate function {func} has no operand"))
}

fn evaluate(operand: &dyn ExprNode, id: RowId, getter: Getter) -> TaqlResult<Value> {
    Ok(match getter {
        Getter::Bool => Value::Bool(operand.get_bool(id)?),
        Getter::Int => Value::Int(operand.get_int(id)?),
        Getter::Double => Value::Double(operand.get_double(id)?),
        Getter::Complex => Value::Complex(operand.get_complex(id)?),
        Getter::String => Value::String(operand.get_string(id)?),
        Getter::Date => Value::Date(operand.get_date(id)?),
        Getter::Array => Value::Array(operand.get_array(id)?),
        Getter::ArrayOf(DataType::Bool) => Value::Array(operand.get_array_bool(id)?.into()),
        Getter::ArrayOf(DataType::Int) => Value::Array(operand.get_array_int(id)?.into()),
        Getter::ArrayOf(DataType::Double) => Value::Array(operand.get_array_double(id)?.into()),
        Getter::ArrayOf(DataType::Complex) => Value::Array(operand.get_array_complex(id)?.into()),
        Getter::ArrayOf(DataType::String) => Value::Array(operand.get_array_string(id)?.into()),
        Getter::ArrayOf(DataType::Date) => Value::Array(operand.get_array_date(id)?.into()),
    })
}

#[derive(Clone, Debug)]
enum Acc {
    Bool(bool),
    Int(i64),
    Double(f64),
    Complex(Complex64),
    String(Option<Arc<str>>),
}

#[derive(Debug)]
struct ScalarAcc {
    combine: Combine,
    acc: Acc,
    count: u64,
}

impl ScalarAcc {
    fn new(data_type: DataType, combine: Combine) -> Self {
        let acc = match data_type {
            DataType::Bool => Acc::Bool(combine == Combine::All),
            DataType::Int => Acc::Int(match combine {
                Combine::Product => 1,
                Combine::Min => i64::MAX,
                Combine::Max => i64::MIN,
                _ => 0,
            }),
            DataType::Double | DataType::Date => Acc::Double(match combine {
                Combine::Product => 1.0,
                Combine::Min => f64::INFINITY,
                Combine::Max => f64::NEG_INFINITY,
                _ => 0.0,
            }),
            DataType::Complex => Acc::Complex(if combine == Combine::Product {
                Complex64::new(1.0, 0.0)
            } else {
                Complex64::new(0.0, 0.0)
            }),
            DataType::String => Acc::String(None),
        };
        Self {
            combine,
            acc,
            count: 0,
        }
    }

    fn fold(&mut self, func: &str, value: &Value) -> TaqlResult<()> {
        let mismatch = || {
            TaqlError::Type(format!(
                "aggregate function {func} cannot combine a {} value",
                value.data_type()
            ))
        };
        self.count += 1;
        match (&mut self.acc, self.combine) {
            (Acc::Int(n), Combine::Count) => *n += 1,
            (Acc::Int(n), Combine::NTrue) => {
                if value.as_bool().ok_or_else(mismatch)? {
                    *n += 1;
                }
            }
            (Acc::Bool(b), Combine::Any) => *b |= value.as_bool().ok_or_else(mismatch)?,
            (Acc::Bool(b), Combine::All) => *b &= value.as_bool().ok_or_else(mismatch)?,
            (Acc::Int(n), combine) => {
                let v = value.as_int().ok_or_else(mismatch)?;
                *n = match combine {
                    Combine::Sum => n.wrapping_add(v),
                    Combine::Product => n.wrapping_mul(v),
                    Combine::SumSqr => n.wrapping_add(v.wrapping_mul(v)),
                    Combine::Min => (*n).min(v),
                    Combine::Max => (*n).max(v),
                    _ => return Err(mismatch()),
                };
            }
            (Acc::Double(x), combine) => {
                let v = value.as_double().ok_or_else(mismatch)?;
                *x = match combine {
                    Combine::Sum | Combine::Mean => *x + v,
                    Combine::Product => *x * v,
                    Combine::SumSqr => *x + v * v,
                    Combine::Min => x.min(v),
                    Combine::Max => x.max(v),
                    _ => return Err(mismatch()),
                };
            }
            (Acc::Complex(x), combine) => {
                let v = value.as_complex().ok_or_else(mismatch)?;
                *x = match combine {
                    Combine::Sum | Combine::Mean => *x + v,
                    Combine::Product => *x * v,
                    Combine::SumSqr => *x + v * v,
                    _ => return Err(mismatch()),
                };
            }
            (Acc::String(s), Combine::Min | Combine::Max) => {
                let Value::String(v) = value else {
                    return Err(mismatch());
                };
                let replace = match s.as_ref() {
                    None => true,
                    Some(cur) if self.combine == Combine::Min => v.as_ref() < cur.as_ref(),
                    Some(cur) => v.as_ref() > cur.as_ref(),
                };
                if replace {
                    *s = Some(v.clone());
                }
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    fn get(&self, getter: Getter) -> Option<Value> {
        let mean = self.combine == Combine::Mean;
        match (&self.acc, getter) {
            (Acc::Bool(b), Getter::Bool) => Some(Value::Bool(*b)),
            (Acc::Int(n), Getter::Int) => Some(Value::Int(*n)),
            (Acc::Int(n), Getter::Double) => Some(Value::Double(*n as f64)),
            (Acc::Double(x), Getter::Double) if mean => Some(Value::Double(*x / self.count as f64)),
            (Acc::Double(x), Getter::Double) => Some(Value::Double(*x)),
            (Acc::Complex(x), Getter::Complex) if mean => {
                Some(Value::Complex(*x / self.count as f64))
            }
            (Acc::Complex(x), Getter::Complex) => Some(Value::Complex(*x)),
            (Acc::String(s), Getter::String) => Some(Value::String(
                s.clone().unwrap_or_else(|| Arc::from("")),
            )),
            _ => None,
        }
    }
}

/// Element-wise accumulator over the array cells of a group.
#[derive(Debug)]
struct ArrayAcc {
    data_type: DataType,
    combine: Combine,
    value: Option<ArrayValue>,
    counts: Vec<u64>,
    masked: bool,
}

fn combine_elements<T: Copy>(
    acc: &mut [T],
    counts: &mut [u64],
    src: &MArray<T>,
    f: impl Fn(T, T) -> T,
) {
    for (i, (a, x)) in acc.iter_mut().zip(src.data()).enumerate() {
        if src.is_masked(i) {
            continue;
        }
        *a = f(*a, *x);
        counts[i] += 1;
    }
}

impl ArrayAcc {
    fn new(data_type: DataType, combine: Combine) -> Self {
        Self {
            data_type,
            combine,
            value: None,
            counts: Vec::new(),
            masked: false,
        }
    }

    fn identity(&self, shape: Shape) -> ArrayValue {
        match (self.data_type, self.combine) {
            (DataType::Int, Combine::Min) => MArray::filled(shape, i64::MAX).into(),
            (DataType::Int, Combine::Max) => MArray::filled(shape, i64::MIN).into(),
            (DataType::Double, Combine::Min) => MArray::filled(shape, f64::INFINITY).into(),
            (DataType::Double, Combine::Max) => MArray::filled(shape, f64::NEG_INFINITY).into(),
            (DataType::Bool, Combine::All) => MArray::filled(shape, true).into(),
            (data_type, _) => ArrayValue::filled(data_type, shape),
        }
    }

    fn fold(&mut self, func: &str, array: ArrayValue) -> TaqlResult<()> {
        let actual = array.data_type();
        let mismatch = || {
            TaqlError::Type(format!(
                "aggregate function {func} cannot combine an array of {actual}"
            ))
        };
        let array = array.coerce(self.data_type).ok_or_else(mismatch)?;
        if self.value.is_none() {
            self.counts = vec![0; array.len()];
            self.value = Some(self.identity(array.shape().clone()));
        }
        let Some(acc) = self.value.as_mut() else {
            return Err(mismatch());
        };
        if acc.shape() != array.shape() {
            return Err(TaqlError::ShapeMismatch {
                func: func.to_string(),
                expected: acc.shape().clone(),
                actual: array.shape().clone(),
            });
        }
        self.masked |= array.mask().is_some_and(ArrayMask::any_flagged);

        let combine = self.combine;
        let counts = &mut self.counts;
        match (acc, &array) {
            (ArrayValue::Int(acc), ArrayValue::Int(x)) => {
                combine_elements(acc.data_mut(), counts, x, |a, b| match combine {
                    Combine::Min => a.min(b),
                    Combine::Max => a.max(b),
                    _ => a.wrapping_add(b),
                })
            }
            (ArrayValue::Double(acc), ArrayValue::Double(x)) => {
                combine_elements(acc.data_mut(), counts, x, |a, b| match combine {
                    Combine::Min => a.min(b),
                    Combine::Max => a.max(b),
                    _ => a + b,
                })
            }
            (ArrayValue::Complex(acc), ArrayValue::Complex(x)) => {
                combine_elements(acc.data_mut(), counts, x, |a, b| a + b)
            }
            (ArrayValue::Bool(acc), ArrayValue::Bool(x)) => {
                combine_elements(acc.data_mut(), counts, x, |a, b| match combine {
                    Combine::All => a && b,
                    _ => a || b,
                })
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    fn get(&self) -> TaqlResult<ArrayValue> {
        let Some(value) = &self.value else {
            return Ok(ArrayValue::filled(self.data_type, Shape::vector(0)));
        };
        let mut value = value.clone();
        if self.combine == Combine::Mean {
            match &mut value {
                ArrayValue::Double(a) => {
                    for (x, n) in a.data_mut().iter_mut().zip(&self.counts) {
                        *x /= *n as f64;
                    }
                }
                ArrayValue::Complex(a) => {
                    for (x, n) in a.data_mut().iter_mut().zip(&self.counts) {
                        *x /= *n as f64;
                    }
                }
                _ => {}
            }
        }
        if self.masked {
            let mask = ArrayMask::from_flags(self.counts.iter().map(|n| *n == 0));
            value = value.with_mask(mask)?;
        }
        Ok(value)
    }
}

#[derive(Debug)]
struct LazyAggr {
    reduce: LazyReduce,
    ids: Vec<RowId>,
    gathered: Option<ArrayValue>,
    reduced: Option<f64>,
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0)
}

impl LazyAggr {
    fn finish(&mut self, func: &str, operand: &dyn ExprNode) -> TaqlResult<()> {
        if self.gathered.is_some() {
            return Ok(());
        }
        let gathered = if operand.value_kind() == ValueKind::Array {
            let cells = self
                .ids
                .iter()
                .map(|id| operand.get_array(*id))
                .collect::<TaqlResult<Vec<_>>>()?;
            if let Some((first, rest)) = cells.split_first() {
                if let Some(other) = rest.iter().find(|c| c.shape() != first.shape()) {
                    return Err(TaqlError::ShapeMismatch {
                        func: func.to_string(),
                        expected: first.shape().clone(),
                        actual: other.shape().clone(),
                    });
                }
            }
            ArrayValue::stack(operand.data_type(), &cells)?
        } else {
            let values = self
                .ids
                .iter()
                .map(|id| operand.get_value(*id))
                .collect::<TaqlResult<Vec<_>>>()?;
            ArrayValue::from_values(operand.data_type(), Shape::vector(values.len()), values)?
        };

        if self.reduce != LazyReduce::Gather {
            let ArrayValue::Double(numbers) = gathered
                .clone()
                .coerce(DataType::Double)
                .ok_or_else(|| {
                    TaqlError::Type(format!(
                        "aggregate function {func} needs numeric values, got {}",
                        gathered.data_type()
                    ))
                })?
            else {
                return Err(TaqlError::Type(format!(
                    "aggregate function {func} needs numeric values"
                )));
            };
            let values = numbers.compressed();
            self.reduced = Some(match self.reduce {
                LazyReduce::Median => {
                    let v = sorted(values);
                    match v.len() {
                        0 => f64::NAN,
                        n if n % 2 == 1 => v[n / 2],
                        n => (v[n / 2 - 1] + v[n / 2]) / 2.0,
                    }
                }
                LazyReduce::Fractile(fraction) => {
                    let v = sorted(values);
                    if v.is_empty() {
                        f64::NAN
                    } else {
                        v[((v.len() - 1) as f64 * fraction) as usize]
                    }
                }
                LazyReduce::Variance => variance(&values),
                LazyReduce::StdDev => variance(&values).sqrt(),
                LazyReduce::Gather => f64::NAN,
            });
        }
        self.gathered = Some(gathered);
        Ok(())
    }

    fn get(&self, getter: Getter) -> Option<Value> {
        match (self.reduce, getter) {
            (LazyReduce::Gather, Getter::Array | Getter::ArrayOf(_)) => {
                self.gathered.clone().map(Value::Array)
            }
            (LazyReduce::Gather, _) => None,
            (_, Getter::Double) => self.reduced.map(Value::Double),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum FuncKind {
    Null,
    First(Option<RowId>),
    Last(Option<RowId>),
    ExprId(Vec<RowId>),
    Rowid(Vec<RowId>),
    Aggr(LazyAggr),
    Scalar(ScalarAcc),
    Array(ArrayAcc),
    Fixed(Value),
}

/// The state of one aggregate function for one group.
#[derive(Debug)]
pub struct GroupFunc {
    name: String,
    operand: Option<Arc<dyn ExprNode>>,
    data_type: DataType,
    kind: ValueKind,
    seqnr: usize,
    state: FuncState,
    func: FuncKind,
}

macro_rules! typed_getter {
    ($fn:ident, $getter:expr, $ty:ty, $pat:pat => $out:expr) => {
        pub fn $fn(&self) -> TaqlResult<$ty> {
            match self.produce($getter)? {
                $pat => Ok($out),
                _ => Err(TaqlError::NotImplemented {
                    func: self.name.clone(),
                    getter: $getter.name(),
                }),
            }
        }
    };
}

impl GroupFunc {
    fn with_kind(
        name: impl Into<String>,
        operand: Option<Arc<dyn ExprNode>>,
        data_type: DataType,
        kind: ValueKind,
        func: FuncKind,
    ) -> Self {
        Self {
            name: name.into(),
            operand,
            data_type,
            kind,
            seqnr: 0,
            state: FuncState::Fresh,
            func,
        }
    }

    /// Placeholder for aggregates evaluated elsewhere; it must never be applied.
    pub fn null() -> Self {
        Self::with_kind("null", None, DataType::Bool, ValueKind::Scalar, FuncKind::Null)
    }

    /// Collects the row ids of its group.
    pub fn expr_id() -> Self {
        Self::with_kind(
            "exprid",
            None,
            DataType::Int,
            ValueKind::Array,
            FuncKind::ExprId(Vec::new()),
        )
    }

    /// A function whose value is known up front.
    pub fn ready(name: impl Into<String>, value: Value) -> Self {
        let kind = if value.is_array() {
            ValueKind::Array
        } else {
            ValueKind::Scalar
        };
        let mut func = Self::with_kind(name, None, value.data_type(), kind, FuncKind::Fixed(value));
        func.state = FuncState::Ready;
        func
    }

    pub(crate) fn first(name: &str, operand: Arc<dyn ExprNode>) -> Self {
        let (data_type, kind) = (operand.data_type(), operand.value_kind());
        Self::with_kind(name, Some(operand), data_type, kind, FuncKind::First(None))
    }

    pub(crate) fn last(name: &str, operand: Arc<dyn ExprNode>) -> Self {
        let (data_type, kind) = (operand.data_type(), operand.value_kind());
        Self::with_kind(name, Some(operand), data_type, kind, FuncKind::Last(None))
    }

    pub(crate) fn rowid(name: &str) -> Self {
        Self::with_kind(
            name,
            None,
            DataType::Int,
            ValueKind::Array,
            FuncKind::Rowid(Vec::new()),
        )
    }

    pub(crate) fn scalar(
        name: &str,
        operand: Option<Arc<dyn ExprNode>>,
        data_type: DataType,
        combine: Combine,
    ) -> Self {
        Self::with_kind(
            name,
            operand,
            data_type,
            ValueKind::Scalar,
            FuncKind::Scalar(ScalarAcc::new(data_type, combine)),
        )
    }

    pub(crate) fn array(
        name: &str,
        operand: Arc<dyn ExprNode>,
        data_type: DataType,
        combine: Combine,
    ) -> Self {
        Self::with_kind(
            name,
            Some(operand),
            data_type,
            ValueKind::Array,
            FuncKind::Array(ArrayAcc::new(data_type, combine)),
        )
    }

    pub(crate) fn lazy(
        name: &str,
        operand: Arc<dyn ExprNode>,
        data_type: DataType,
        kind: ValueKind,
        reduce: LazyReduce,
    ) -> Self {
        Self::with_kind(
            name,
            Some(operand),
            data_type,
            kind,
            FuncKind::Aggr(LazyAggr {
                reduce,
                ids: Vec::new(),
                gathered: None,
                reduced: None,
            }),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seqnr(&self) -> usize {
        self.seqnr
    }

    pub fn set_seqnr(&mut self, seqnr: usize) {
        self.seqnr = seqnr;
    }

    pub fn state(&self) -> FuncState {
        self.state
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn value_kind(&self) -> ValueKind {
        self.kind
    }

    /// Lazy functions collect row ids and compute their value in [`GroupFunc::finish`].
    pub fn is_lazy(&self) -> bool {
        matches!(
            self.func,
            FuncKind::Null | FuncKind::ExprId(_) | FuncKind::Rowid(_) | FuncKind::Aggr(_)
        )
    }

    /// Account for one row of the group.
    pub fn apply(&mut self, id: RowId) -> TaqlResult<()> {
        match self.state {
            FuncState::Ready => return Ok(()),
            FuncState::Finalized => {
                return Err(TaqlError::InvalidExpr(format!(
                    "aggregate function {} applied after it was finished",
                    self.name
                )))
            }
            FuncState::Fresh | FuncState::Accumulating => {}
        }

        match &mut self.func {
            FuncKind::Null => {
                return Err(TaqlError::InvalidExpr(
                    "a null aggregate function should not be applied".to_string(),
                ))
            }
            FuncKind::First(slot) => {
                if slot.is_none() {
                    *slot = Some(id);
                }
            }
            FuncKind::Last(slot) => *slot = Some(id),
            FuncKind::ExprId(ids) | FuncKind::Rowid(ids) => ids.push(id),
            FuncKind::Aggr(lazy) => lazy.ids.push(id),
            FuncKind::Scalar(acc) => {
                let value = match &self.operand {
                    Some(operand) => operand.get_value(id)?,
                    None if acc.combine == Combine::Count => Value::Int(1),
                    None => return Err(missing_operand(&self.name)),
                };
                match value {
                    Value::Array(array) => {
                        let mask = array.mask().cloned();
                        for (i, element) in array.to_values().iter().enumerate() {
                            if mask.as_ref().is_some_and(|m| m.is_flagged(i)) {
                                continue;
                            }
                            acc.fold(&self.name, element)?;
                        }
                    }
                    scalar => acc.fold(&self.name, &scalar)?,
                }
            }
            FuncKind::Array(acc) => {
                let operand = self
                    .operand
                    .as_ref()
                    .ok_or_else(|| missing_operand(&self.name))?;
                acc.fold(&self.name, operand.get_array(id)?)?;
            }
            FuncKind::Fixed(_) => {}
        }
        self.state = FuncState::Accumulating;
        Ok(())
    }

    /// Compute the value of a lazy function. Only the first call does work; eager functions
    /// ignore it.
    pub fn finish(&mut self) -> TaqlResult<()> {
        if !self.is_lazy() || self.state == FuncState::Finalized {
            return Ok(());
        }
        if let FuncKind::Aggr(lazy) = &mut self.func {
            let operand = self
                .operand
                .as_ref()
                .ok_or_else(|| missing_operand(&self.name))?;
            lazy.finish(&self.name, operand.as_ref())?;
            log::debug!("finished {} over {} rows", self.name, lazy.ids.len());
        }
        self.state = FuncState::Finalized;
        Ok(())
    }

    /// Row ids collected by an id-collecting function.
    pub fn ids(&self) -> TaqlResult<&[RowId]> {
        match &self.func {
            FuncKind::ExprId(ids) => Ok(ids),
            _ => Err(TaqlError::NotImplemented {
                func: self.name.clone(),
                getter: "ids",
            }),
        }
    }

    fn produce(&self, getter: Getter) -> TaqlResult<Value> {
        if self.is_lazy() && self.state != FuncState::Finalized {
            return Err(TaqlError::NotFinished {
                func: self.name.clone(),
            });
        }
        let not_implemented = || TaqlError::NotImplemented {
            func: self.name.clone(),
            getter: getter.name(),
        };
        let value = match &self.func {
            FuncKind::First(id) | FuncKind::Last(id) => {
                let id = id.ok_or_else(|| {
                    TaqlError::InvalidExpr(format!(
                        "aggregate function {} has not seen a row",
                        self.name
                    ))
                })?;
                let operand = self
                    .operand
                    .as_ref()
                    .ok_or_else(|| missing_operand(&self.name))?;
                return evaluate(operand.as_ref(), id, getter);
            }
            FuncKind::Rowid(ids) => Some(Value::Array(
                MArray::from_vec(ids.iter().map(|id| id.rownr() as i64).collect()).into(),
            )),
            FuncKind::Aggr(lazy) => lazy.get(getter),
            FuncKind::Scalar(acc) => acc.get(getter),
            FuncKind::Array(acc) => match getter {
                Getter::Array | Getter::ArrayOf(_) => Some(Value::Array(acc.get()?)),
                _ => None,
            },
            FuncKind::Fixed(value) => Some(value.clone()),
            FuncKind::Null | FuncKind::ExprId(_) => None,
        };
        value
            .and_then(|v| getter.conform(v))
            .ok_or_else(not_implemented)
    }

    typed_getter!(get_bool, Getter::Bool, bool, Value::Bool(v) => v);
    typed_getter!(get_int, Getter::Int, i64, Value::Int(v) => v);
    typed_getter!(get_double, Getter::Double, f64, Value::Double(v) => v);
    typed_getter!(get_complex, Getter::Complex, Complex64, Value::Complex(v) => v);
    typed_getter!(get_string, Getter::String, Arc<str>, Value::String(v) => v);
    typed_getter!(get_date, Getter::Date, MjdTime, Value::Date(v) => v);
    typed_getter!(get_array, Getter::Array, ArrayValue, Value::Array(v) => v);
    typed_getter!(get_array_bool, Getter::ArrayOf(DataType::Bool), MArray<bool>,
        Value::Array(ArrayValue::Bool(v)) => v);
    typed_getter!(get_array_int, Getter::ArrayOf(DataType::Int), MArray<i64>,
        Value::Array(ArrayValue::Int(v)) => v);
    typed_getter!(get_array_double, Getter::ArrayOf(DataType::Double), MArray<f64>,
        Value::Array(ArrayValue::Double(v)) => v);
    typed_getter!(get_array_complex, Getter::ArrayOf(DataType::Complex), MArray<Complex64>,
        Value::Array(ArrayValue::Complex(v)) => v);
    typed_getter!(get_array_string, Getter::ArrayOf(DataType::String), MArray<Arc<str>>,
        Value::Array(ArrayValue::String(v)) => v);
    typed_getter!(get_array_date, Getter::ArrayOf(DataType::Date), MArray<MjdTime>,
        Value::Array(ArrayValue::Date(v)) => v);

    /// The value through the getter matching the function's result type.
    pub fn get_value(&self) -> TaqlResult<Value> {
        self.produce(Getter::for_type(self.data_type, self.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::RowNumberNode;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Cells(Vec<ArrayValue>);

    impl ExprNode for Cells {
        fn name(&self) -> String {
            "cells".to_string()
        }

        fn data_type(&self) -> DataType {
            DataType::Double
        }

        fn value_kind(&self) -> ValueKind {
            ValueKind::Array
        }

        fn get_array(&self, id: RowId) -> TaqlResult<ArrayValue> {
            Ok(self.0[id.rownr()].clone())
        }
    }

    fn rows(func: &mut GroupFunc, rows: &[usize]) {
        for &row in rows {
            func.apply(RowId::new(row)).unwrap();
        }
    }

    #[test]
    fn first_keeps_earliest_and_last_latest() {
        let operand: Arc<dyn ExprNode> = Arc::new(RowNumberNode);
        let mut first = GroupFunc::first("gfirst", operand.clone());
        let mut last = GroupFunc::last("glast", operand);
        rows(&mut first, &[4, 2, 9]);
        rows(&mut last, &[4, 2, 9]);
        assert_eq!(first.get_int().unwrap(), 4);
        assert_eq!(last.get_int().unwrap(), 9);
        assert_eq!(last.get_double().unwrap(), 9.0);
        assert_eq!(first.state(), FuncState::Accumulating);
    }

    #[test]
    fn lazy_functions_must_be_finished_first() {
        let mut rowid = GroupFunc::rowid("growid");
        rows(&mut rowid, &[1, 3]);
        assert_eq!(
            rowid.get_array_int(),
            Err(TaqlError::NotFinished {
                func: "growid".to_string()
            })
        );
        rowid.finish().unwrap();
        assert_eq!(rowid.get_array_int().unwrap().into_data(), vec![1, 3]);
        assert!(rowid.apply(RowId::new(5)).is_err());
    }

    #[test]
    fn getters_of_the_wrong_type_are_not_implemented() {
        let mut count = GroupFunc::scalar("gcount", None, DataType::Int, Combine::Count);
        rows(&mut count, &[0, 1, 2]);
        assert_eq!(count.get_int().unwrap(), 3);
        assert_eq!(count.get_double().unwrap(), 3.0);
        assert_eq!(
            count.get_string(),
            Err(TaqlError::NotImplemented {
                func: "gcount".to_string(),
                getter: "get_string"
            })
        );
        assert!(matches!(
            GroupFunc::expr_id().ids(),
            Ok(ids) if ids.is_empty()
        ));
        assert!(count.ids().is_err());
    }

    #[test]
    fn null_and_ready_functions() {
        assert!(matches!(
            GroupFunc::null().apply(RowId::new(0)),
            Err(TaqlError::InvalidExpr(_))
        ));
        let mut ready = GroupFunc::ready("const", Value::Double(2.5));
        ready.apply(RowId::new(0)).unwrap();
        assert_eq!(ready.state(), FuncState::Ready);
        assert_eq!(ready.get_double().unwrap(), 2.5);
    }

    #[test]
    fn array_sums_reject_other_shapes() {
        let operand: Arc<dyn ExprNode> = Arc::new(Cells(vec![
            MArray::from_vec(vec![1.0, 2.0]).into(),
            MArray::from_vec(vec![3.0, 4.0]).into(),
            MArray::from_vec(vec![5.0, 6.0, 7.0]).into(),
        ]));
        let mut sums = GroupFunc::array("gsums", operand, DataType::Double, Combine::Sum);
        rows(&mut sums, &[0, 1]);
        assert_eq!(sums.get_array_double().unwrap().into_data(), vec![4.0, 6.0]);
        assert_eq!(
            sums.apply(RowId::new(2)),
            Err(TaqlError::ShapeMismatch {
                func: "gsums".to_string(),
                expected: Shape::vector(2),
                actual: Shape::vector(3),
            })
        );
    }

    #[test]
    fn masked_elements_are_skipped_by_means() {
        let masked = MArray::from_vec(vec![10.0, 20.0])
            .with_mask(ArrayMask::from_flags([false, true]))
            .unwrap();
        let operand: Arc<dyn ExprNode> = Arc::new(Cells(vec![
            masked.into(),
            MArray::from_vec(vec![30.0, 40.0]).into(),
        ]));
        let mut means = GroupFunc::array("gmeans", operand, DataType::Double, Combine::Mean);
        rows(&mut means, &[0, 1]);
        let result = means.get_array_double().unwrap();
        assert_eq!(result.data(), &[20.0, 40.0]);
        assert!(!result.is_masked(1));
    }

    #[test]
    fn clear_input_masks_leave_the_result_unmasked() {
        let clear = MArray::from_vec(vec![1.0, 2.0])
            .with_mask(ArrayMask::clear(2))
            .unwrap();
        let operand: Arc<dyn ExprNode> = Arc::new(Cells(vec![clear.into()]));
        let mut maxs = GroupFunc::array("gmaxs", operand, DataType::Double, Combine::Max);
        rows(&mut maxs, &[0]);
        let result = maxs.get_array_double().unwrap();
        assert_eq!(result.data(), &[1.0, 2.0]);
        assert!(!result.has_mask());
    }

    #[test]
    fn median_of_even_count_averages_middle_values() {
        let mut median = GroupFunc::lazy(
            "gmedian",
            Arc::new(RowNumberNode),
            DataType::Double,
            ValueKind::Scalar,
            LazyReduce::Median,
        );
        rows(&mut median, &[7, 1, 3, 5]);
        median.finish().unwrap();
        assert_eq!(median.get_double().unwrap(), 4.0);
    }
}
