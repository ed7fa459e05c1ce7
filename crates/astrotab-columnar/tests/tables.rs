use astrotab_columnar::{
    ByteOrder, ColumnDesc, DataType, MjdTime, PageCacheConfig, PagedColumn, RefTable, SortOrder,
    StorageKind, Table, TableBuilder, TableColumn, TableIterator, TableOptions, Value,
};
use num_complex::Complex64;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn observations(options: TableOptions) -> Arc<dyn Table> {
    let mut builder = TableBuilder::new(
        "observations",
        vec![
            ColumnDesc::scalar("FIELD", DataType::String),
            ColumnDesc::scalar("SCAN", DataType::Int),
            ColumnDesc::scalar("TIME", DataType::Date),
            ColumnDesc::scalar("VIS", DataType::Complex),
            ColumnDesc::scalar("FLAG", DataType::Bool).with_default(false),
        ],
        options,
    );
    let rows = [
        ("3C286", 2, 59000.25, 1.0),
        ("3C48", 1, 59000.5, 2.0),
        ("3C286", 1, 59000.75, 3.0),
        ("3C48", 2, 59001.0, 4.0),
        ("3C286", 1, 59001.25, 5.0),
    ];
    for (field, scan, mjd, re) in rows {
        builder
            .append_row(vec![
                Value::from(field),
                Value::Int(scan),
                Value::Date(MjdTime::from_days(mjd)),
                Value::Complex(Complex64::new(re, -re)),
                Value::Bool(scan == 2),
            ])
            .unwrap();
    }
    Arc::new(builder.finish().unwrap())
}

#[test]
fn paged_and_memory_tables_read_the_same() {
    let memory = observations(TableOptions::default());
    let paged = observations(TableOptions {
        page_size_rows: 2,
        cache: PageCacheConfig { max_entries: 1 },
        byte_order: ByteOrder::Big,
        storage: StorageKind::Paged,
    });

    for name in memory.column_names() {
        let a = memory.column(&name).unwrap();
        let b = paged.column(&name).unwrap();
        for row in 0..memory.nrow() {
            assert_eq!(a.get(row).unwrap(), b.get(row).unwrap(), "column {name} row {row}");
        }
    }
}

#[test]
fn paged_column_cache_counts_page_decodes() {
    let options = TableOptions {
        page_size_rows: 3,
        cache: PageCacheConfig { max_entries: 1 },
        ..TableOptions::default()
    };
    let column = PagedColumn::from_values(
        ColumnDesc::scalar("SCAN", DataType::Int),
        options,
        (0..9).map(Value::Int).collect(),
    )
    .unwrap();

    let all = column.get_scalar_column().unwrap();
    assert_eq!(all.len(), 9);
    let stats = column.cache_stats();
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.evictions, 2);
}

#[test]
fn sorted_view_orders_on_several_columns() {
    let table = observations(TableOptions::default());
    let view = RefTable::sorted_by(
        table,
        &[("FIELD", SortOrder::Ascending), ("TIME", SortOrder::Descending)],
    )
    .unwrap();
    assert_eq!(view.rows(), vec![4, 2, 0, 3, 1]);
}

#[test]
fn complex_columns_cannot_be_sorted() {
    let table = observations(TableOptions::default());
    assert!(RefTable::sorted_by(table, &[("VIS", SortOrder::Ascending)]).is_err());
}

#[test]
fn iterator_groups_rows_by_field() {
    let table = observations(TableOptions::default());
    let fields: Vec<(Value, usize)> = TableIterator::new(table, &[("FIELD", SortOrder::Ascending)])
        .unwrap()
        .map(|run| {
            let run = run.unwrap();
            (run.column("FIELD").unwrap().get(0).unwrap(), run.nrow())
        })
        .collect();
    assert_eq!(
        fields,
        vec![(Value::from("3C286"), 3), (Value::from("3C48"), 2)]
    );
}

#[test]
fn select_keeps_table_order() {
    let table = observations(TableOptions::default());
    let flags = table.column("FLAG").unwrap();
    let flagged = RefTable::select(table.clone(), |row| {
        Ok(flags.get(row)?.as_bool() == Some(true))
    })
    .unwrap();
    assert_eq!(flagged.rows(), vec![0, 3]);
    assert_eq!(flagged.name(), "observations");
}

#[test]
fn initialize_resets_cells_to_column_default() {
    let table = observations(TableOptions::default());
    let view = RefTable::new(table.clone(), vec![3]).unwrap();
    view.column("FLAG").unwrap().initialize(0..1).unwrap();
    assert_eq!(table.column("FLAG").unwrap().get(3).unwrap(), Value::Bool(false));
    assert_eq!(table.column("FLAG").unwrap().get(0).unwrap(), Value::Bool(true));
}
