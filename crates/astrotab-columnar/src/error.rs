use crate::array::Shape;
use crate::types::DataType;

pub type TableResult<T> = Result<T, TableError>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("row {row} out of range (table has {nrow} rows)")]
    RowOutOfRange { row: usize, nrow: usize },

    #[error("column {column} is not writable")]
    NotWritable { column: String },

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: Shape, actual: Shape },

    #[error("column {0} does not contain arrays")]
    NotArrayColumn(String),

    #[error("column {0} does not contain scalars")]
    NotScalarColumn(String),

    #[error("cell {row} of column {column} is undefined")]
    Undefined { column: String, row: usize },

    #[error("invalid slice: {0}")]
    InvalidSlice(String),

    #[error("data type {data_type} is not supported by {context}")]
    UnsupportedType { data_type: DataType, context: String },

    #[error("schema mismatch for {table}: expected {expected} values, got {actual}")]
    SchemaMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("column {column} has {actual} rows, table {table} has {expected}")]
    ColumnLengthMismatch {
        table: String,
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("column {column} has fixed cell shape {shape}")]
    ShapeFixed { column: String, shape: Shape },

    #[error("conversion error: {0}")]
    Conversion(String),
}
