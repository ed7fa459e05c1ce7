//! Conversion between canonical (fixed byte order) external layouts and local values.
//!
//! Paged storage keeps its cells in a canonical byte order chosen by [`TableOptions`], so a
//! page written on one machine decodes identically on another.
//!
//! [`TableOptions`]: crate::TableOptions

use crate::error::{TableError, TableResult};
use crate::types::{DataType, MjdTime, Value};
use num_complex::Complex64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// A fixed-size primitive with a canonical external representation.
pub trait Canonical: Copy {
    const SIZE: usize;

    fn read(order: ByteOrder, src: &[u8]) -> Self;
    fn write(self, order: ByteOrder, dst: &mut [u8]);
}

macro_rules! canonical_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Canonical for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn read(order: ByteOrder, src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&src[..Self::SIZE]);
                    match order {
                        ByteOrder::Little => <$ty>::from_le_bytes(raw),
                        ByteOrder::Big => <$ty>::from_be_bytes(raw),
                    }
                }

                fn write(self, order: ByteOrder, dst: &mut [u8]) {
                    let raw = match order {
                        ByteOrder::Little => self.to_le_bytes(),
                        ByteOrder::Big => self.to_be_bytes(),
                    };
                    dst[..Self::SIZE].copy_from_slice(&raw);
                }
            }
        )*
    };
}

canonical_primitive!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl Canonical for bool {
    const SIZE: usize = 1;

    fn read(_order: ByteOrder, src: &[u8]) -> Self {
        src[0] != 0
    }

    fn write(self, _order: ByteOrder, dst: &mut [u8]) {
        dst[0] = u8::from(self);
    }
}

impl Canonical for Complex64 {
    const SIZE: usize = 16;

    fn read(order: ByteOrder, src: &[u8]) -> Self {
        Complex64::new(f64::read(order, &src[..8]), f64::read(order, &src[8..16]))
    }

    fn write(self, order: ByteOrder, dst: &mut [u8]) {
        self.re.write(order, &mut dst[..8]);
        self.im.write(order, &mut dst[8..16]);
    }
}

fn short_buffer(needed: usize, got: usize) -> TableError {
    TableError::Conversion(format!("need {needed} bytes, buffer has {got}"))
}

/// Convert one canonical value to local representation; returns the value and the number of
/// bytes consumed.
pub fn to_local<T: Canonical>(order: ByteOrder, src: &[u8]) -> TableResult<(T, usize)> {
    if src.len() < T::SIZE {
        return Err(short_buffer(T::SIZE, src.len()));
    }
    Ok((T::read(order, src), T::SIZE))
}

/// Convert one local value to canonical representation; returns the number of bytes written.
pub fn from_local<T: Canonical>(order: ByteOrder, value: T, dst: &mut [u8]) -> TableResult<usize> {
    if dst.len() < T::SIZE {
        return Err(short_buffer(T::SIZE, dst.len()));
    }
    value.write(order, dst);
    Ok(T::SIZE)
}

pub fn to_local_slice<T: Canonical>(
    order: ByteOrder,
    src: &[u8],
    count: usize,
) -> TableResult<Vec<T>> {
    let needed = count * T::SIZE;
    if src.len() < needed {
        return Err(short_buffer(needed, src.len()));
    }
    Ok(src
        .chunks_exact(T::SIZE)
        .take(count)
        .map(|chunk| T::read(order, chunk))
        .collect())
}

pub fn from_local_slice<T: Canonical>(order: ByteOrder, values: &[T]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * T::SIZE];
    for (value, chunk) in values.iter().zip(out.chunks_exact_mut(T::SIZE)) {
        value.write(order, chunk);
    }
    out
}

/// Size in bytes of a canonical scalar of `data_type`; `None` for variable-width types.
pub fn canonical_size(data_type: DataType) -> Option<usize> {
    match data_type {
        DataType::Bool => Some(bool::SIZE),
        DataType::Int => Some(i64::SIZE),
        DataType::Double | DataType::Date => Some(f64::SIZE),
        DataType::Complex => Some(Complex64::SIZE),
        DataType::String => None,
    }
}

/// Encode a scalar cell of `data_type` into `dst`.
pub fn encode_value(
    order: ByteOrder,
    data_type: DataType,
    value: &Value,
    dst: &mut [u8],
) -> TableResult<usize> {
    let mismatch = || TableError::TypeMismatch {
        context: "canonical encoding".to_string(),
        expected: data_type,
        actual: value.data_type(),
    };
    match data_type {
        DataType::Bool => from_local(order, value.as_bool().ok_or_else(mismatch)?, dst),
        DataType::Int => from_local(order, value.as_int().ok_or_else(mismatch)?, dst),
        DataType::Double => from_local(order, value.as_double().ok_or_else(mismatch)?, dst),
        DataType::Complex => from_local(order, value.as_complex().ok_or_else(mismatch)?, dst),
        DataType::Date => from_local(order, value.as_date().ok_or_else(mismatch)?.days(), dst),
        DataType::String => Err(TableError::UnsupportedType {
            data_type,
            context: "canonical encoding".to_string(),
        }),
    }
}

/// Decode a scalar cell of `data_type` from `src`.
pub fn decode_value(order: ByteOrder, data_type: DataType, src: &[u8]) -> TableResult<Value> {
    Ok(match data_type {
        DataType::Bool => Value::Bool(to_local::<bool>(order, src)?.0),
        DataType::Int => Value::Int(to_local::<i64>(order, src)?.0),
        DataType::Double => Value::Double(to_local::<f64>(order, src)?.0),
        DataType::Complex => Value::Complex(to_local::<Complex64>(order, src)?.0),
        DataType::Date => Value::Date(MjdTime(to_local::<f64>(order, src)?.0)),
        DataType::String => {
            return Err(TableError::UnsupportedType {
                data_type,
                context: "canonical decoding".to_string(),
            })
        }
    })
}
