//! Column storage for astronomical tables.
//!
//! This crate focuses on:
//! - Typed value cells and masked N-dimensional arrays.
//! - A storage-independent column contract ([`TableColumn`]) with in-memory, paged and
//!   reference (view) implementations.
//! - Views that select, sort and iterate the rows of another table without copying cell data.
//! - Canonical byte-order conversion used by paged storage.

#![forbid(unsafe_code)]

pub mod array;
mod cache;
mod column;
pub mod conversion;
mod error;
mod iter;
mod mask;
mod memory;
mod paged;
mod ref_column;
mod ref_table;
mod sort;
mod table;
mod types;

pub use crate::array::{ArrayValue, MArray, Shape, Slicer};
pub use crate::cache::{CacheStats, PageCacheConfig};
pub use crate::column::{CellKind, ColumnDesc, Keywords, RowNumbers, RowNumbersIter, TableColumn};
pub use crate::conversion::ByteOrder;
pub use crate::error::{TableError, TableResult};
pub use crate::iter::TableIterator;
pub use crate::mask::ArrayMask;
pub use crate::memory::MemoryColumn;
pub use crate::paged::PagedColumn;
pub use crate::ref_column::{RefColumn, RowMapping};
pub use crate::ref_table::RefTable;
pub use crate::sort::{sort_positions, IterBuf, SortKey, SortOrder, SortValue};
pub use crate::table::{MemoryTable, StorageKind, Table, TableBuilder, TableOptions};
pub use crate::types::{DataType, MjdTime, Value};
