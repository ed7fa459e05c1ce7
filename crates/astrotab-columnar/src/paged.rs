use crate::array::{ArrayValue, Shape};
use crate::cache::{CacheStats, LruCache};
use crate::column::{check_row, ColumnDesc, Keywords, RowNumbers, TableColumn};
use crate::conversion::{canonical_size, decode_value, encode_value};
use crate::error::{TableError, TableResult};
use crate::table::TableOptions;
use crate::types::Value;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Default)]
struct Pages {
    pages: Vec<Vec<u8>>,
    nrow: usize,
}

/// Scalar column of a fixed-width type stored in pages of canonical bytes.
///
/// Reads decode a whole page at a time and keep recently used pages decoded in a small LRU
/// cache; writes patch the page bytes and drop the page from the cache.
#[derive(Debug)]
pub struct PagedColumn {
    desc: ColumnDesc,
    width: usize,
    options: TableOptions,
    store: RwLock<Pages>,
    cache: Mutex<LruCache<usize, Arc<Vec<Value>>>>,
    keywords: RwLock<Keywords>,
    writable: bool,
}

impl PagedColumn {
    pub fn new(desc: ColumnDesc, options: TableOptions) -> TableResult<Self> {
        let width = match (desc.is_array(), canonical_size(desc.data_type)) {
            (false, Some(width)) => width,
            _ => {
                return Err(TableError::UnsupportedType {
                    data_type: desc.data_type,
                    context: format!("paged storage of column {}", desc.name),
                })
            }
        };
        Ok(Self {
            desc,
            width,
            options,
            store: RwLock::new(Pages::default()),
            cache: Mutex::new(LruCache::new(options.cache.max_entries)),
            keywords: RwLock::new(Keywords::new()),
            writable: true,
        })
    }

    pub fn from_values(
        desc: ColumnDesc,
        options: TableOptions,
        values: Vec<Value>,
    ) -> TableResult<Self> {
        let column = Self::new(desc, options)?;
        for value in values {
            column.push(value)?;
        }
        Ok(column)
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Append a cell at the end of the column.
    pub fn push(&self, value: Value) -> TableResult<()> {
        let value = self.desc.conform(value)?;
        let mut encoded = vec![0u8; self.width];
        encode_value(
            self.options.byte_order,
            self.desc.data_type,
            &value,
            &mut encoded,
        )?;

        let page_rows = self.options.page_size_rows.max(1);
        let mut store = self.store.write().expect("paged column store poisoned");
        if store.nrow % page_rows == 0 {
            store.pages.push(Vec::with_capacity(page_rows * self.width));
        }
        if let Some(page) = store.pages.last_mut() {
            page.extend_from_slice(&encoded);
        }
        let page_idx = store.nrow / page_rows;
        store.nrow += 1;
        drop(store);

        self.cache
            .lock()
            .expect("paged column cache poisoned")
            .remove(&page_idx);
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.store.read().expect("paged column store poisoned").pages.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().expect("paged column cache poisoned").stats()
    }

    fn locate(&self, row: usize) -> (usize, usize) {
        let page_rows = self.options.page_size_rows.max(1);
        (row / page_rows, row % page_rows)
    }

    fn decoded_page(&self, page_idx: usize) -> TableResult<Arc<Vec<Value>>> {
        if let Some(hit) = self
            .cache
            .lock()
            .expect("paged column cache poisoned")
            .get(&page_idx)
        {
            return Ok(hit);
        }

        log::trace!("decoding page {page_idx} of column {}", self.desc.name);
        let decoded = {
            let store = self.store.read().expect("paged column store poisoned");
            let page = store
                .pages
                .get(page_idx)
                .ok_or(TableError::RowOutOfRange {
                    row: page_idx * self.options.page_size_rows.max(1),
                    nrow: store.nrow,
                })?;
            page.chunks_exact(self.width)
                .map(|cell| decode_value(self.options.byte_order, self.desc.data_type, cell))
                .collect::<TableResult<Vec<_>>>()?
        };
        let decoded = Arc::new(decoded);
        self.cache
            .lock()
            .expect("paged column cache poisoned")
            .insert(page_idx, decoded.clone());
        Ok(decoded)
    }
}

impl TableColumn for PagedColumn {
    fn desc(&self) -> &ColumnDesc {
        &self.desc
    }

    fn nrow(&self) -> usize {
        self.store.read().expect("paged column store poisoned").nrow
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn keywords(&self) -> Keywords {
        self.keywords.read().expect("column keywords poisoned").clone()
    }

    fn set_keyword(&self, name: &str, value: Value) -> TableResult<()> {
        if !self.writable {
            return Err(TableError::NotWritable {
                column: self.desc.name.clone(),
            });
        }
        self.keywords
            .write()
            .expect("column keywords poisoned")
            .insert(name.to_string(), value);
        Ok(())
    }

    fn is_defined(&self, row: usize) -> TableResult<bool> {
        check_row(row, self.nrow())?;
        Ok(true)
    }

    fn set_shape(&self, _row: usize, _shape: &Shape) -> TableResult<()> {
        Err(TableError::NotArrayColumn(self.desc.name.clone()))
    }

    fn shape(&self, _row: usize) -> TableResult<Shape> {
        Err(TableError::NotArrayColumn(self.desc.name.clone()))
    }

    fn get(&self, row: usize) -> TableResult<Value> {
        check_row(row, self.nrow())?;
        let (page_idx, in_page) = self.locate(row);
        let page = self.decoded_page(page_idx)?;
        page.get(in_page)
            .cloned()
            .ok_or(TableError::RowOutOfRange {
                row,
                nrow: self.nrow(),
            })
    }

    fn put(&self, row: usize, value: Value) -> TableResult<()> {
        if !self.writable {
            return Err(TableError::NotWritable {
                column: self.desc.name.clone(),
            });
        }
        let value = self.desc.conform(value)?;
        let (page_idx, in_page) = self.locate(row);
        {
            let mut store = self.store.write().expect("paged column store poisoned");
            check_row(row, store.nrow)?;
            let start = in_page * self.width;
            let cell = &mut store.pages[page_idx][start..start + self.width];
            encode_value(self.options.byte_order, self.desc.data_type, &value, cell)?;
        }
        self.cache
            .lock()
            .expect("paged column cache poisoned")
            .remove(&page_idx);
        Ok(())
    }

    /// Rows are visited in the requested order; consecutive rows on the same page reuse the
    /// decoded page without going back to the cache.
    fn get_scalar_column_cells(&self, rows: &RowNumbers) -> TableResult<ArrayValue> {
        let nrow = self.nrow();
        let mut current: Option<(usize, Arc<Vec<Value>>)> = None;
        let mut values = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            check_row(row, nrow)?;
            let (page_idx, in_page) = self.locate(row);
            let page = match &current {
                Some((idx, page)) if *idx == page_idx => page.clone(),
                _ => {
                    let page = self.decoded_page(page_idx)?;
                    current = Some((page_idx, page.clone()));
                    page
                }
            };
            values.push(page[in_page].clone());
        }
        ArrayValue::from_values(self.desc.data_type, Shape::vector(values.len()), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PageCacheConfig;
    use crate::conversion::ByteOrder;
    use crate::types::DataType;

    fn options() -> TableOptions {
        TableOptions {
            page_size_rows: 4,
            cache: PageCacheConfig { max_entries: 2 },
            byte_order: ByteOrder::Big,
            ..TableOptions::default()
        }
    }

    #[test]
    fn values_roundtrip_across_pages() {
        let col = PagedColumn::from_values(
            ColumnDesc::scalar("TIME", DataType::Double),
            options(),
            (0..10).map(|i| Value::Double(f64::from(i) * 0.5)).collect(),
        )
        .unwrap();
        assert_eq!(col.page_count(), 3);
        assert_eq!(col.get(9).unwrap(), Value::Double(4.5));
        assert_eq!(col.get(0).unwrap(), Value::Double(0.0));
        assert!(matches!(col.get(10), Err(TableError::RowOutOfRange { .. })));
    }

    #[test]
    fn put_invalidates_cached_page() {
        let col = PagedColumn::from_values(
            ColumnDesc::scalar("ANT", DataType::Int),
            options(),
            (0..6).map(Value::Int).collect(),
        )
        .unwrap();
        assert_eq!(col.get(5).unwrap(), Value::Int(5));
        col.put(5, Value::Int(50)).unwrap();
        assert_eq!(col.get(5).unwrap(), Value::Int(50));
        assert_eq!(col.get(4).unwrap(), Value::Int(4));

        let stats = col.cache_stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn string_columns_are_not_paged() {
        let err = PagedColumn::new(ColumnDesc::scalar("NAME", DataType::String), options())
            .unwrap_err();
        assert!(matches!(err, TableError::UnsupportedType { .. }));
    }
}
