use astrotab_columnar::{Shape, TableError};

pub type TaqlResult<T> = Result<T, TaqlError>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TaqlError {
    #[error("invalid expression: {0}")]
    InvalidExpr(String),

    #[error("A GROUPBY key cannot have data type {data_type} ({expr})")]
    UnsupportedKeyType { expr: String, data_type: String },

    #[error("{func}::{getter} not implemented")]
    NotImplemented { func: String, getter: &'static str },

    #[error("aggregate function {func} is read before it was finished")]
    NotFinished { func: String },

    #[error("Mismatching array shapes in aggregate function {func}: {expected} versus {actual}")]
    ShapeMismatch {
        func: String,
        expected: Shape,
        actual: Shape,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error(transparent)]
    Table(#[from] TableError),
}
