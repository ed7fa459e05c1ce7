use astrotab_columnar::{
    ArrayValue, ColumnDesc, DataType, MArray, RefTable, RowNumbers, Shape, Slicer, Table,
    TableBuilder, TableColumn, TableError, TableOptions, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn spectra(rows: usize) -> Arc<dyn Table> {
    let mut builder = TableBuilder::new(
        "spectra",
        vec![
            ColumnDesc::scalar("ID", DataType::Int),
            ColumnDesc::fixed_array("DATA", DataType::Double, Shape::vector(3)),
        ],
        TableOptions::default(),
    );
    for row in 0..rows {
        let base = row as f64 * 10.0;
        builder
            .append_row(vec![
                Value::Int(row as i64),
                Value::Array(ArrayValue::Double(MArray::from_vec(vec![
                    base,
                    base + 1.0,
                    base + 2.0,
                ]))),
            ])
            .unwrap();
    }
    Arc::new(builder.finish().unwrap())
}

#[test]
fn bulk_reads_translate_each_row() {
    let table = spectra(6);
    let view = RefTable::new(table.clone(), vec![5, 0, 3]).unwrap();
    let ids = view.column("ID").unwrap();

    assert_eq!(
        ids.get_scalar_column().unwrap().to_values(),
        vec![Value::Int(5), Value::Int(0), Value::Int(3)]
    );
    assert_eq!(
        ids.get_scalar_column_cells(&RowNumbers::List(vec![2, 1]))
            .unwrap()
            .to_values(),
        vec![Value::Int(3), Value::Int(0)]
    );

    let data = view.column("DATA").unwrap();
    let column_slice = data
        .get_column_slice(&Slicer::new(vec![1], vec![1]))
        .unwrap();
    assert_eq!(column_slice.shape(), &Shape::new(vec![1, 3]));
    assert_eq!(
        column_slice.to_values(),
        vec![Value::Double(51.0), Value::Double(1.0), Value::Double(31.0)]
    );
}

#[test]
fn per_cell_shape_queries_are_translated() {
    let mut builder = TableBuilder::new(
        "cube",
        vec![ColumnDesc::array("IMG", DataType::Int)],
        TableOptions::default(),
    );
    builder
        .append_row(vec![Value::Array(ArrayValue::filled(
            DataType::Int,
            Shape::new(vec![2, 2]),
        ))])
        .unwrap();
    builder
        .append_row(vec![Value::Array(ArrayValue::filled(
            DataType::Int,
            Shape::vector(5),
        ))])
        .unwrap();
    let table: Arc<dyn Table> = Arc::new(builder.finish().unwrap());

    let view = RefTable::new(table, vec![1, 0]).unwrap();
    let img = view.column("IMG").unwrap();
    assert_eq!(img.shape(0).unwrap(), Shape::vector(5));
    assert_eq!(img.ndim(1).unwrap(), 2);
    assert_eq!(img.ndim_column(), None);
    assert!(img.can_change_shape());
    assert!(img.is_defined(1).unwrap());
    assert!(img.is_stored());
}

#[test]
fn writes_through_view_land_in_physical_rows() {
    let table = spectra(4);
    let view = RefTable::new(table.clone(), vec![2, 3]).unwrap();

    view.column("ID").unwrap().put(1, Value::Int(99)).unwrap();
    assert_eq!(table.column("ID").unwrap().get(3).unwrap(), Value::Int(99));

    let patch = ArrayValue::Double(MArray::from_vec(vec![-1.0]));
    view.column("DATA")
        .unwrap()
        .put_slice(0, &Slicer::new(vec![2], vec![1]), &patch)
        .unwrap();
    assert_eq!(
        table.column("DATA").unwrap().get_array(2).unwrap().to_values(),
        vec![Value::Double(20.0), Value::Double(21.0), Value::Double(-1.0)]
    );

    view.column("ID")
        .unwrap()
        .put_scalar_column(&ArrayValue::Int(MArray::from_vec(vec![7, 8])))
        .unwrap();
    assert_eq!(
        table.column("ID").unwrap().get_scalar_column().unwrap().to_values(),
        vec![Value::Int(0), Value::Int(1), Value::Int(7), Value::Int(8)]
    );
}

#[test]
fn read_only_view_rejects_every_write_path() {
    let table = spectra(3);
    let view = RefTable::read_only(table.clone(), vec![1]).unwrap();
    assert!(!view.is_writable());

    let ids = view.column("ID").unwrap();
    let data = view.column("DATA").unwrap();
    let cell = ArrayValue::Double(MArray::from_vec(vec![0.0, 0.0, 0.0]));

    assert!(matches!(ids.put(0, Value::Int(5)), Err(TableError::NotWritable { .. })));
    assert!(matches!(data.put_array(0, &cell), Err(TableError::NotWritable { .. })));
    assert!(matches!(
        data.put_slice(0, &Slicer::new(vec![0], vec![1]), &cell),
        Err(TableError::NotWritable { .. })
    ));

    assert_eq!(table.column("ID").unwrap().get(1).unwrap(), Value::Int(1));
    assert_eq!(
        table.column("DATA").unwrap().get_array(1).unwrap().to_values(),
        vec![Value::Double(10.0), Value::Double(11.0), Value::Double(12.0)]
    );
}

#[test]
fn row_outside_view_is_out_of_range() {
    let view = RefTable::new(spectra(5), vec![4]).unwrap();
    let err = view.column("ID").unwrap().get(1).unwrap_err();
    assert_eq!(err, TableError::RowOutOfRange { row: 1, nrow: 1 });
}

#[test]
fn mapping_updates_are_seen_by_existing_columns() {
    let view = RefTable::new(spectra(5), vec![0]).unwrap();
    let ids = view.column("ID").unwrap();
    view.push_row(4).unwrap();
    assert_eq!(ids.nrow(), 2);
    assert_eq!(ids.get(1).unwrap(), Value::Int(4));

    view.set_rows(vec![3]).unwrap();
    assert_eq!(ids.get(0).unwrap(), Value::Int(3));
    assert!(view.push_row(5).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn view_reads_match_physical_reads(
        rows in proptest::collection::vec(0usize..20, 0..30),
        inner in proptest::collection::vec(any::<prop::sample::Index>(), 0..10),
    ) {
        let table = spectra(20);
        let view = Arc::new(RefTable::new(table.clone(), rows.clone()).unwrap());
        let physical = table.column("ID").unwrap();
        let through_view = view.column("ID").unwrap();

        for (view_row, &row) in rows.iter().enumerate() {
            prop_assert_eq!(through_view.get(view_row).unwrap(), physical.get(row).unwrap());
            prop_assert_eq!(view.root_row(view_row).unwrap(), row);
        }

        if !rows.is_empty() {
            let inner_rows: Vec<usize> = inner.iter().map(|i| i.index(rows.len())).collect();
            let nested = RefTable::new(view.clone(), inner_rows.clone()).unwrap();
            let nested_ids = nested.column("ID").unwrap();
            for (nested_row, &view_row) in inner_rows.iter().enumerate() {
                prop_assert_eq!(
                    nested_ids.get(nested_row).unwrap(),
                    physical.get(rows[view_row]).unwrap()
                );
            }
        }
    }
}
