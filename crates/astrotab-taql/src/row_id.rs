use std::fmt;

/// Identifies the row an expression is evaluated for.
///
/// Row ids are row numbers of the table (or view) being queried; they are what aggregate
/// functions capture and what lazy functions re-evaluate their operand at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId {
    row: usize,
}

impl RowId {
    pub fn new(row: usize) -> Self {
        Self { row }
    }

    pub fn rownr(self) -> usize {
        self.row
    }
}

impl From<usize> for RowId {
    fn from(row: usize) -> Self {
        Self::new(row)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.row)
    }
}
