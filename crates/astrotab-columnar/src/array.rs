//! Masked N-dimensional arrays as stored in array columns.
//!
//! Arrays are laid out with the first axis varying fastest. A cell of an N-dimensional array
//! column read for many rows at once becomes an (N+1)-dimensional array whose last axis is the
//! row axis (see [`MArray::stack`]).

use crate::error::{TableError, TableResult};
use crate::mask::ArrayMask;
use crate::types::{DataType, MjdTime, Value};
use num_complex::Complex64;
use std::fmt;
use std::sync::Arc;

/// Extents of an N-dimensional array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn vector(len: usize) -> Self {
        Self(vec![len])
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of elements; an empty shape describes no array at all and holds nothing.
    pub fn product(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            self.0.iter().product()
        }
    }

    /// Flat offset of `index`, or `None` if it does not address an element.
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.0.len() {
            return None;
        }
        let mut offset = 0usize;
        let mut step = 1usize;
        for (&i, &dim) in index.iter().zip(&self.0) {
            if i >= dim {
                return None;
            }
            offset += i * step;
            step *= dim;
        }
        Some(offset)
    }

    /// This shape with one more (slowest varying) axis of `extent`.
    pub fn appended(&self, extent: usize) -> Shape {
        let mut dims = self.0.clone();
        dims.push(extent);
        Shape(dims)
    }

    pub fn without_last(&self) -> Shape {
        let mut dims = self.0.clone();
        dims.pop();
        Shape(dims)
    }

    fn steps(&self) -> Vec<usize> {
        let mut steps = Vec::with_capacity(self.0.len());
        let mut step = 1usize;
        for &dim in &self.0 {
            steps.push(step);
            step *= dim;
        }
        steps
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

/// A strided section of an N-dimensional array: per axis a start, a length and a stride.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slicer {
    start: Vec<usize>,
    length: Vec<usize>,
    stride: Vec<usize>,
}

impl Slicer {
    pub fn new(start: impl Into<Vec<usize>>, length: impl Into<Vec<usize>>) -> Self {
        let start = start.into();
        let stride = vec![1; start.len()];
        Self {
            start,
            length: length.into(),
            stride,
        }
    }

    pub fn with_stride(mut self, stride: impl Into<Vec<usize>>) -> Self {
        self.stride = stride.into();
        self
    }

    /// A slicer selecting every element of `shape`.
    pub fn full(shape: &Shape) -> Self {
        Self::new(vec![0; shape.ndim()], shape.dims().to_vec())
    }

    pub fn result_shape(&self) -> Shape {
        Shape::new(self.length.clone())
    }

    pub fn check(&self, shape: &Shape) -> TableResult<()> {
        let ndim = shape.ndim();
        if self.start.len() != ndim || self.length.len() != ndim || self.stride.len() != ndim {
            return Err(TableError::InvalidSlice(format!(
                "slicer has {} axes, array shape {shape} has {ndim}",
                self.start.len()
            )));
        }
        for axis in 0..ndim {
            let (start, len, stride, dim) = (
                self.start[axis],
                self.length[axis],
                self.stride[axis],
                shape.dims()[axis],
            );
            if stride == 0 {
                return Err(TableError::InvalidSlice(format!("zero stride on axis {axis}")));
            }
            let end_ok = if len == 0 {
                start <= dim
            } else {
                start + (len - 1) * stride < dim
            };
            if !end_ok {
                return Err(TableError::InvalidSlice(format!(
                    "axis {axis}: start {start} length {len} stride {stride} exceeds extent {dim}"
                )));
            }
        }
        Ok(())
    }

    /// Flat offsets into an array of `shape` of every selected element, first axis fastest.
    fn offsets(&self, shape: &Shape) -> Vec<usize> {
        let ndim = self.length.len();
        let total: usize = if ndim == 0 {
            0
        } else {
            self.length.iter().product()
        };
        let mut out = Vec::with_capacity(total);
        if total == 0 {
            return out;
        }
        let steps = shape.steps();
        let mut pos = vec![0usize; ndim];
        loop {
            out.push(
                (0..ndim)
                    .map(|k| (self.start[k] + pos[k] * self.stride[k]) * steps[k])
                    .sum(),
            );
            let mut axis = 0;
            loop {
                if axis == ndim {
                    return out;
                }
                pos[axis] += 1;
                if pos[axis] < self.length[axis] {
                    break;
                }
                pos[axis] = 0;
                axis += 1;
            }
        }
    }
}

/// An N-dimensional array with an optional element mask.
#[derive(Clone, Debug, PartialEq)]
pub struct MArray<T> {
    shape: Shape,
    data: Vec<T>,
    mask: Option<ArrayMask>,
}

impl<T: Clone> MArray<T> {
    pub fn new(shape: Shape, data: Vec<T>) -> TableResult<Self> {
        if shape.product() != data.len() {
            return Err(TableError::ShapeMismatch {
                expected: shape,
                actual: Shape::vector(data.len()),
            });
        }
        Ok(Self {
            shape,
            data,
            mask: None,
        })
    }

    /// A one-dimensional array.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            shape: Shape::vector(data.len()),
            data,
            mask: None,
        }
    }

    pub fn filled(shape: Shape, value: T) -> Self {
        let data = vec![value; shape.product()];
        Self {
            shape,
            data,
            mask: None,
        }
    }

    pub fn with_mask(mut self, mask: ArrayMask) -> TableResult<Self> {
        if mask.len() != self.data.len() {
            return Err(TableError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: Shape::vector(mask.len()),
            });
        }
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    pub fn mask(&self) -> Option<&ArrayMask> {
        self.mask.as_ref()
    }

    pub fn is_masked(&self, offset: usize) -> bool {
        self.mask.as_ref().is_some_and(|m| m.is_flagged(offset))
    }

    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.data.get(self.shape.offset(index)?)
    }

    pub fn conforms<U>(&self, other: &MArray<U>) -> bool {
        self.shape == other.shape
    }

    pub fn slice(&self, slicer: &Slicer) -> TableResult<Self> {
        slicer.check(&self.shape)?;
        let offsets = slicer.offsets(&self.shape);
        let data = offsets.iter().map(|&o| self.data[o].clone()).collect();
        let mask = self
            .mask
            .as_ref()
            .map(|m| ArrayMask::from_flags(offsets.iter().map(|&o| m.is_flagged(o))));
        Ok(Self {
            shape: slicer.result_shape(),
            data,
            mask,
        })
    }

    /// Overwrite the section selected by `slicer` with `source`, which must have the shape of
    /// the section.
    pub fn assign_slice(&mut self, slicer: &Slicer, source: &MArray<T>) -> TableResult<()> {
        slicer.check(&self.shape)?;
        let section = slicer.result_shape();
        if section != source.shape {
            return Err(TableError::ShapeMismatch {
                expected: section,
                actual: source.shape.clone(),
            });
        }
        let offsets = slicer.offsets(&self.shape);
        if source.mask.is_some() && self.mask.is_none() {
            self.mask = Some(ArrayMask::clear(self.data.len()));
        }
        for (src, &dst) in offsets.iter().enumerate() {
            self.data[dst] = source.data[src].clone();
            if let Some(mask) = self.mask.as_mut() {
                mask.set(dst, source.is_masked(src));
            }
        }
        Ok(())
    }

    /// The unmasked elements in storage order.
    pub fn compressed(&self) -> Vec<T> {
        match &self.mask {
            None => self.data.clone(),
            Some(mask) => self
                .data
                .iter()
                .enumerate()
                .filter(|(i, _)| !mask.is_flagged(*i))
                .map(|(_, v)| v.clone())
                .collect(),
        }
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> MArray<U> {
        MArray {
            shape: self.shape.clone(),
            data: self.data.iter().map(f).collect(),
            mask: self.mask.clone(),
        }
    }

    /// Stack equally shaped cells along a new last axis.
    pub fn stack(cells: &[MArray<T>]) -> TableResult<Self> {
        let Some(first) = cells.first() else {
            return Ok(Self::from_vec(Vec::new()));
        };
        let cell_shape = first.shape.clone();
        let any_mask = cells.iter().any(|c| c.mask.is_some());
        let mut data = Vec::with_capacity(cell_shape.product() * cells.len());
        let mut mask = any_mask.then(ArrayMask::default);
        for cell in cells {
            if cell.shape != cell_shape {
                return Err(TableError::ShapeMismatch {
                    expected: cell_shape,
                    actual: cell.shape.clone(),
                });
            }
            data.extend(cell.data.iter().cloned());
            if let Some(mask) = mask.as_mut() {
                for i in 0..cell.data.len() {
                    mask.push(cell.is_masked(i));
                }
            }
        }
        Ok(Self {
            shape: cell_shape.appended(cells.len()),
            data,
            mask,
        })
    }

    /// Split along the last axis; the inverse of [`MArray::stack`].
    pub fn unstack(&self) -> Vec<Self> {
        let Some(&count) = self.shape.dims().last() else {
            return Vec::new();
        };
        let cell_shape = self.shape.without_last();
        let cell_len = if cell_shape.ndim() == 0 {
            1
        } else {
            cell_shape.product()
        };
        let cell_shape = if cell_shape.ndim() == 0 {
            Shape::vector(1)
        } else {
            cell_shape
        };
        (0..count)
            .map(|i| {
                let range = i * cell_len..(i + 1) * cell_len;
                Self {
                    shape: cell_shape.clone(),
                    data: self.data[range.clone()].to_vec(),
                    mask: self
                        .mask
                        .as_ref()
                        .map(|m| ArrayMask::from_flags(range.clone().map(|o| m.is_flagged(o)))),
                }
            })
            .collect()
    }
}

/// An array of any element [`DataType`].
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValue {
    Bool(MArray<bool>),
    Int(MArray<i64>),
    Double(MArray<f64>),
    Complex(MArray<Complex64>),
    String(MArray<Arc<str>>),
    Date(MArray<MjdTime>),
}

macro_rules! with_array {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            ArrayValue::Bool($arr) => $body,
            ArrayValue::Int($arr) => $body,
            ArrayValue::Double($arr) => $body,
            ArrayValue::Complex($arr) => $body,
            ArrayValue::String($arr) => $body,
            ArrayValue::Date($arr) => $body,
        }
    };
}

macro_rules! map_array {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            ArrayValue::Bool($arr) => ArrayValue::Bool($body),
            ArrayValue::Int($arr) => ArrayValue::Int($body),
            ArrayValue::Double($arr) => ArrayValue::Double($body),
            ArrayValue::Complex($arr) => ArrayValue::Complex($body),
            ArrayValue::String($arr) => ArrayValue::String($body),
            ArrayValue::Date($arr) => ArrayValue::Date($body),
        }
    };
}

fn element_mismatch(context: &str, expected: DataType, actual: DataType) -> TableError {
    TableError::TypeMismatch {
        context: context.to_string(),
        expected,
        actual,
    }
}

impl ArrayValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ArrayValue::Bool(_) => DataType::Bool,
            ArrayValue::Int(_) => DataType::Int,
            ArrayValue::Double(_) => DataType::Double,
            ArrayValue::Complex(_) => DataType::Complex,
            ArrayValue::String(_) => DataType::String,
            ArrayValue::Date(_) => DataType::Date,
        }
    }

    pub fn shape(&self) -> &Shape {
        with_array!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().ndim()
    }

    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mask(&self) -> Option<&ArrayMask> {
        with_array!(self, a => a.mask())
    }

    pub fn has_mask(&self) -> bool {
        self.mask().is_some()
    }

    /// An array of `shape` holding the zero value of `data_type`.
    pub fn filled(data_type: DataType, shape: Shape) -> ArrayValue {
        match data_type {
            DataType::Bool => ArrayValue::Bool(MArray::filled(shape, false)),
            DataType::Int => ArrayValue::Int(MArray::filled(shape, 0)),
            DataType::Double => ArrayValue::Double(MArray::filled(shape, 0.0)),
            DataType::Complex => {
                ArrayValue::Complex(MArray::filled(shape, Complex64::new(0.0, 0.0)))
            }
            DataType::String => ArrayValue::String(MArray::filled(shape, Arc::from(""))),
            DataType::Date => ArrayValue::Date(MArray::filled(shape, MjdTime::default())),
        }
    }

    /// Build an array of `data_type` from scalar values, coercing each element.
    pub fn from_values(data_type: DataType, shape: Shape, values: Vec<Value>) -> TableResult<Self> {
        fn collect<T>(
            data_type: DataType,
            values: Vec<Value>,
            get: impl Fn(&Value) -> Option<T>,
        ) -> TableResult<Vec<T>> {
            values
                .iter()
                .map(|v| {
                    get(v).ok_or_else(|| {
                        element_mismatch("array element", data_type, v.data_type())
                    })
                })
                .collect()
        }

        Ok(match data_type {
            DataType::Bool => ArrayValue::Bool(MArray::new(
                shape,
                collect(data_type, values, Value::as_bool)?,
            )?),
            DataType::Int => ArrayValue::Int(MArray::new(
                shape,
                collect(data_type, values, Value::as_int)?,
            )?),
            DataType::Double => ArrayValue::Double(MArray::new(
                shape,
                collect(data_type, values, |v| match v {
                    Value::Date(_) => None,
                    other => other.as_double(),
                })?,
            )?),
            DataType::Complex => ArrayValue::Complex(MArray::new(
                shape,
                collect(data_type, values, Value::as_complex)?,
            )?),
            DataType::String => ArrayValue::String(MArray::new(
                shape,
                collect(data_type, values, |v| match v {
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                })?,
            )?),
            DataType::Date => ArrayValue::Date(MArray::new(
                shape,
                collect(data_type, values, Value::as_date)?,
            )?),
        })
    }

    /// Element at flat `offset` as a scalar value.
    pub fn element(&self, offset: usize) -> Option<Value> {
        Some(match self {
            ArrayValue::Bool(a) => Value::Bool(*a.data().get(offset)?),
            ArrayValue::Int(a) => Value::Int(*a.data().get(offset)?),
            ArrayValue::Double(a) => Value::Double(*a.data().get(offset)?),
            ArrayValue::Complex(a) => Value::Complex(*a.data().get(offset)?),
            ArrayValue::String(a) => Value::String(a.data().get(offset)?.clone()),
            ArrayValue::Date(a) => Value::Date(*a.data().get(offset)?),
        })
    }

    /// All elements as scalar values in storage order.
    pub fn to_values(&self) -> Vec<Value> {
        (0..self.len()).filter_map(|i| self.element(i)).collect()
    }

    pub fn slice(&self, slicer: &Slicer) -> TableResult<ArrayValue> {
        Ok(map_array!(self, a => a.slice(slicer)?))
    }

    pub fn assign_slice(&mut self, slicer: &Slicer, source: &ArrayValue) -> TableResult<()> {
        let expected = self.data_type();
        match (self, source) {
            (ArrayValue::Bool(a), ArrayValue::Bool(s)) => a.assign_slice(slicer, s),
            (ArrayValue::Int(a), ArrayValue::Int(s)) => a.assign_slice(slicer, s),
            (ArrayValue::Double(a), ArrayValue::Double(s)) => a.assign_slice(slicer, s),
            (ArrayValue::Complex(a), ArrayValue::Complex(s)) => a.assign_slice(slicer, s),
            (ArrayValue::String(a), ArrayValue::String(s)) => a.assign_slice(slicer, s),
            (ArrayValue::Date(a), ArrayValue::Date(s)) => a.assign_slice(slicer, s),
            (_, other) => Err(element_mismatch("array slice", expected, other.data_type())),
        }
    }

    /// Stack equally typed and shaped cells along a new last axis.
    pub fn stack(data_type: DataType, cells: &[ArrayValue]) -> TableResult<ArrayValue> {
        macro_rules! stack_as {
            ($variant:ident) => {{
                let mut typed = Vec::with_capacity(cells.len());
                for cell in cells {
                    match cell {
                        ArrayValue::$variant(a) => typed.push(a.clone()),
                        other => {
                            return Err(element_mismatch(
                                "stacked cells",
                                data_type,
                                other.data_type(),
                            ))
                        }
                    }
                }
                ArrayValue::$variant(MArray::stack(&typed)?)
            }};
        }

        Ok(match data_type {
            DataType::Bool => stack_as!(Bool),
            DataType::Int => stack_as!(Int),
            DataType::Double => stack_as!(Double),
            DataType::Complex => stack_as!(Complex),
            DataType::String => stack_as!(String),
            DataType::Date => stack_as!(Date),
        })
    }

    pub fn unstack(&self) -> Vec<ArrayValue> {
        match self {
            ArrayValue::Bool(a) => a.unstack().into_iter().map(ArrayValue::Bool).collect(),
            ArrayValue::Int(a) => a.unstack().into_iter().map(ArrayValue::Int).collect(),
            ArrayValue::Double(a) => a.unstack().into_iter().map(ArrayValue::Double).collect(),
            ArrayValue::Complex(a) => a.unstack().into_iter().map(ArrayValue::Complex).collect(),
            ArrayValue::String(a) => a.unstack().into_iter().map(ArrayValue::String).collect(),
            ArrayValue::Date(a) => a.unstack().into_iter().map(ArrayValue::Date).collect(),
        }
    }

    /// Convert the element type, keeping shape and mask.
    pub fn coerce(self, target: DataType) -> Option<ArrayValue> {
        if self.data_type() == target {
            return Some(self);
        }
        let shape = self.shape().clone();
        let mask = self.mask().cloned();
        let values = self
            .to_values()
            .into_iter()
            .map(|v| v.coerce(target))
            .collect::<Option<Vec<_>>>()?;
        let converted = ArrayValue::from_values(target, shape, values).ok()?;
        match mask {
            Some(mask) => converted.with_mask(mask).ok(),
            None => Some(converted),
        }
    }

    pub fn with_mask(self, mask: ArrayMask) -> TableResult<ArrayValue> {
        Ok(map_array!(self, a => a.with_mask(mask)?))
    }
}

impl From<MArray<bool>> for ArrayValue {
    fn from(a: MArray<bool>) -> Self {
        ArrayValue::Bool(a)
    }
}

impl From<MArray<i64>> for ArrayValue {
    fn from(a: MArray<i64>) -> Self {
        ArrayValue::Int(a)
    }
}

impl From<MArray<f64>> for ArrayValue {
    fn from(a: MArray<f64>) -> Self {
        ArrayValue::Double(a)
    }
}

impl From<MArray<Complex64>> for ArrayValue {
    fn from(a: MArray<Complex64>) -> Self {
        ArrayValue::Complex(a)
    }
}

impl From<MArray<Arc<str>>> for ArrayValue {
    fn from(a: MArray<Arc<str>>) -> Self {
        ArrayValue::String(a)
    }
}

impl From<MArray<MjdTime>> for ArrayValue {
    fn from(a: MArray<MjdTime>) -> Self {
        ArrayValue::Date(a)
    }
}
