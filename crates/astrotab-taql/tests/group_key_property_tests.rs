use astrotab_columnar::{ColumnDesc, DataType, Table, TableBuilder, TableOptions, Value};
use astrotab_taql::{
    AggrNode, AggrOp, ColumnNode, ExprNode, GroupByOptions, GroupByQuery, GroupKeySet, RowId,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn build(rows: &[(i64, String)]) -> Arc<dyn Table> {
    let mut builder = TableBuilder::new(
        "rows",
        vec![
            ColumnDesc::scalar("BAND", DataType::Int),
            ColumnDesc::scalar("POL", DataType::String),
        ],
        TableOptions::default(),
    );
    for (band, pol) in rows {
        builder
            .append_row(vec![Value::Int(*band), Value::from(pol.as_str())])
            .unwrap();
    }
    Arc::new(builder.finish().unwrap())
}

fn keys(table: &dyn Table) -> Vec<Arc<dyn ExprNode>> {
    vec![
        Arc::new(ColumnNode::new(table, "BAND").unwrap()),
        Arc::new(ColumnNode::new(table, "POL").unwrap()),
    ]
}

fn row_strategy() -> impl Strategy<Value = Vec<(i64, String)>> {
    proptest::collection::vec((0i64..4, "[RL]{2}"), 0..60)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn equal_rows_produce_equal_keys(rows in row_strategy()) {
        let table = build(&rows);
        let exprs = keys(table.as_ref());
        let template = GroupKeySet::build(&exprs).unwrap();

        for a in 0..rows.len() {
            for b in 0..rows.len() {
                let mut ka = template.clone();
                let mut kb = template.clone();
                ka.fill(&exprs, RowId::new(a)).unwrap();
                kb.fill(&exprs, RowId::new(b)).unwrap();
                prop_assert_eq!(ka == kb, rows[a] == rows[b]);
                prop_assert_eq!(ka.cmp(&kb), rows[a].cmp(&rows[b]));
            }
        }
    }

    #[test]
    fn groups_partition_the_rows(rows in row_strategy()) {
        let table = build(&rows);
        let result = GroupByQuery::new(
            keys(table.as_ref()),
            vec![Arc::new(AggrNode::new(AggrOp::Count, None).unwrap())],
        )
        .with_options(GroupByOptions { sort_groups: true, keep_row_ids: true })
        .execute_table(table.as_ref())
        .unwrap();

        let mut expected: BTreeMap<&(i64, String), Vec<usize>> = BTreeMap::new();
        for (row, key) in rows.iter().enumerate() {
            expected.entry(key).or_default().push(row);
        }
        prop_assert_eq!(result.group_count(), expected.len());

        for (g, (key, members)) in expected.iter().enumerate() {
            prop_assert_eq!(
                result.key_values(g).unwrap(),
                vec![Value::Int(key.0), Value::from(key.1.as_str())]
            );
            let ids: Vec<usize> = result.ids(g).unwrap().iter().map(|id| id.rownr()).collect();
            prop_assert_eq!(&ids, members);
            prop_assert_eq!(result.value(g, 0).unwrap(), Value::Int(members.len() as i64));
        }
    }
}
