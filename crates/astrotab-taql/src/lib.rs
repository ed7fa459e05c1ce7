//! GROUP BY and aggregate evaluation over astrotab tables.
//!
//! A [`GroupByQuery`] evaluates key expressions per row, routes every row to the
//! [`GroupFuncSet`] of its key and returns a [`GroupResult`] holding one set of finished
//! aggregate functions per group. Expressions are built directly from [`ExprNode`]s; there is
//! no query parser here.

#![forbid(unsafe_code)]

mod aggr;
mod error;
mod executor;
mod expr;
mod func;
mod func_set;
mod group_key;
mod result;
mod row_id;

pub use crate::aggr::{AggrNode, AggrOp};
pub use crate::error::{TaqlError, TaqlResult};
pub use crate::executor::{GroupByOptions, GroupByQuery};
pub use crate::expr::{ColumnNode, ConstNode, ExprNode, RowNumberNode, ValueKind};
pub use crate::func::{FuncState, GroupFunc};
pub use crate::func_set::GroupFuncSet;
pub use crate::group_key::{GroupKeySet, KeyValue};
pub use crate::result::GroupResult;
pub use crate::row_id::RowId;
