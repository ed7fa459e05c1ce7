use crate::cache::PageCacheConfig;
use crate::column::{check_row, ColumnDesc, TableColumn};
use crate::conversion::{canonical_size, ByteOrder};
use crate::error::{TableError, TableResult};
use crate::memory::MemoryColumn;
use crate::paged::PagedColumn;
use crate::types::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Where [`TableBuilder`] puts scalar cells of fixed-width types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageKind {
    #[default]
    Memory,
    Paged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    pub page_size_rows: usize,
    pub cache: PageCacheConfig,
    pub byte_order: ByteOrder,
    pub storage: StorageKind,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            page_size_rows: 4_096,
            cache: PageCacheConfig::default(),
            byte_order: ByteOrder::default(),
            storage: StorageKind::default(),
        }
    }
}

/// A named set of equally long columns. Implemented by stored tables and by views.
pub trait Table: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn nrow(&self) -> usize;

    fn column_names(&self) -> Vec<String>;

    fn column(&self, name: &str) -> TableResult<Arc<dyn TableColumn>>;

    fn is_writable(&self) -> bool;

    /// Row number of `row` in the table that stores the data.
    fn root_row(&self, row: usize) -> TableResult<usize> {
        check_row(row, self.nrow())?;
        Ok(row)
    }
}

#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    columns: Vec<Arc<dyn TableColumn>>,
    nrow: usize,
}

impl MemoryTable {
    pub fn from_columns(
        name: impl Into<String>,
        columns: Vec<Arc<dyn TableColumn>>,
    ) -> TableResult<Self> {
        let name = name.into();
        let nrow = columns.first().map(|c| c.nrow()).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            let col_name = &column.desc().name;
            if !seen.insert(col_name.clone()) {
                return Err(TableError::DuplicateColumn(col_name.clone()));
            }
            if column.nrow() != nrow {
                return Err(TableError::ColumnLengthMismatch {
                    table: name,
                    column: col_name.clone(),
                    expected: nrow,
                    actual: column.nrow(),
                });
            }
        }
        Ok(Self {
            name,
            columns,
            nrow,
        })
    }

    pub fn columns(&self) -> &[Arc<dyn TableColumn>] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.desc().name == name)
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn nrow(&self) -> usize {
        self.nrow
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.desc().name.clone()).collect()
    }

    fn column(&self, name: &str) -> TableResult<Arc<dyn TableColumn>> {
        self.column_index(name)
            .map(|idx| self.columns[idx].clone())
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    fn is_writable(&self) -> bool {
        self.columns.iter().all(|c| c.is_writable())
    }
}

/// Row-wise ingestion into a [`MemoryTable`].
pub struct TableBuilder {
    name: String,
    schema: Vec<ColumnDesc>,
    options: TableOptions,
    cells: Vec<Vec<Value>>,
    rows: usize,
    read_only: bool,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>, schema: Vec<ColumnDesc>, options: TableOptions) -> Self {
        let cells = schema.iter().map(|_| Vec::new()).collect();
        Self {
            name: name.into(),
            schema,
            options,
            cells,
            rows: 0,
            read_only: false,
        }
    }

    /// Build columns that reject writes.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn nrow(&self) -> usize {
        self.rows
    }

    pub fn append_row(&mut self, row: Vec<Value>) -> TableResult<()> {
        if row.len() != self.schema.len() {
            return Err(TableError::SchemaMismatch {
                table: self.name.clone(),
                expected: self.schema.len(),
                actual: row.len(),
            });
        }
        let row = self
            .schema
            .iter()
            .zip(row)
            .map(|(desc, value)| desc.conform(value))
            .collect::<TableResult<Vec<_>>>()?;
        for (column, value) in self.cells.iter_mut().zip(row) {
            column.push(value);
        }
        self.rows += 1;
        Ok(())
    }

    pub fn finish(self) -> TableResult<MemoryTable> {
        let mut columns: Vec<Arc<dyn TableColumn>> = Vec::with_capacity(self.schema.len());
        for (desc, values) in self.schema.into_iter().zip(self.cells) {
            let paged = self.options.storage == StorageKind::Paged
                && !desc.is_array()
                && canonical_size(desc.data_type).is_some();
            if paged {
                let column = PagedColumn::from_values(desc, self.options, values)?;
                columns.push(Arc::new(if self.read_only {
                    column.read_only()
                } else {
                    column
                }));
            } else {
                let column = MemoryColumn::from_values(desc, values)?;
                columns.push(Arc::new(if self.read_only {
                    column.read_only()
                } else {
                    column
                }));
            }
        }
        MemoryTable::from_columns(self.name, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn schema() -> Vec<ColumnDesc> {
        vec![
            ColumnDesc::scalar("ANTENNA", DataType::String),
            ColumnDesc::scalar("TIME", DataType::Double),
        ]
    }

    #[test]
    fn builder_checks_row_width() {
        let mut builder = TableBuilder::new("obs", schema(), TableOptions::default());
        let err = builder.append_row(vec![Value::from("A")]).unwrap_err();
        assert_eq!(
            err,
            TableError::SchemaMismatch {
                table: "obs".to_string(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn paged_storage_keeps_strings_in_memory() {
        let options = TableOptions {
            storage: StorageKind::Paged,
            page_size_rows: 2,
            ..TableOptions::default()
        };
        let mut builder = TableBuilder::new("obs", schema(), options);
        for (ant, time) in [("A", 1.0), ("B", 2.0), ("C", 3.0)] {
            builder
                .append_row(vec![Value::from(ant), Value::from(time)])
                .unwrap();
        }
        let table = builder.finish().unwrap();
        assert_eq!(table.nrow(), 3);
        assert_eq!(table.column("TIME").unwrap().get(2).unwrap(), Value::Double(3.0));
        assert_eq!(table.column("ANTENNA").unwrap().get(1).unwrap(), Value::from("B"));
        assert!(matches!(
            table.column("FLAG"),
            Err(TableError::UnknownColumn(_))
        ));
    }

    #[test]
    fn read_only_tables_are_not_writable() {
        let table = TableBuilder::new("obs", schema(), TableOptions::default())
            .read_only()
            .finish()
            .unwrap();
        assert!(!table.is_writable());
    }
}
