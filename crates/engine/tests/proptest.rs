//! Property-based tests for rill-engine using proptest.

use proptest::prelude::*;
use rill_context::{AggSpec, Aggregate, ViewConfig};
use rill_core::{DataType, Scalar, Schema};
use rill_engine::{EngineConfig, FaultPolicy, Table};
use std::collections::BTreeMap;

const CATEGORIES: [&str; 3] = ["A", "B", "C"];

#[derive(Clone, Debug)]
enum Step {
    Write { key: i32, category: usize, amount: i32 },
    Remove(i32),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0i32..10, 0usize..3, -100i32..100)
            .prop_map(|(key, category, amount)| Step::Write { key, category, amount }),
        1 => (0i32..10).prop_map(Step::Remove),
    ]
}

fn schema() -> Schema {
    Schema::from_pairs(&[
        ("id", DataType::Int32),
        ("category", DataType::String),
        ("amount", DataType::Float64),
    ])
    .unwrap()
}

fn report() -> EngineConfig {
    EngineConfig::new().fault_policy(FaultPolicy::Report)
}

fn apply(table: &mut Table, steps: &[Step]) {
    for step in steps {
        match step {
            Step::Write { key, category, amount } => {
                table
                    .update(&[vec![
                        Scalar::Int32(*key),
                        Scalar::str(CATEGORIES[*category]),
                        Scalar::Float64(*amount as f64),
                    ]])
                    .unwrap();
            }
            Step::Remove(key) => {
                table.remove(&[Scalar::Int32(*key)]).unwrap();
            }
        }
    }
}

fn model(steps: &[Step]) -> BTreeMap<i32, (usize, i32)> {
    let mut state = BTreeMap::new();
    for step in steps {
        match step {
            Step::Write { key, category, amount } => {
                state.insert(*key, (*category, *amount));
            }
            Step::Remove(key) => {
                state.remove(key);
            }
        }
    }
    state
}

proptest! {
    /// Pivot leaves and the flat row count track a sequential model.
    #[test]
    fn views_track_model(steps in prop::collection::vec(step_strategy(), 1..50)) {
        let mut table = Table::new(&schema(), Some("id"), report()).unwrap();
        let flat = table.view(&ViewConfig::new()).unwrap();
        let pivot = table
            .view(
                &ViewConfig::new()
                    .row_pivot("category")
                    .column("amount")
                    .aggregate(AggSpec::new("amount", Aggregate::Sum)),
            )
            .unwrap();
        apply(&mut table, &steps);

        let expected = model(&steps);
        prop_assert_eq!(table.size(), expected.len());
        prop_assert_eq!(flat.num_rows().unwrap(), expected.len());

        let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
        for (category, amount) in expected.values() {
            *sums.entry(CATEGORIES[*category]).or_insert(0.0) += *amount as f64;
        }
        let rows = pivot.num_rows().unwrap();
        let data = pivot.get_data(0..rows, 0..1).unwrap();
        let mut seen: BTreeMap<&str, f64> = BTreeMap::new();
        for r in 1..rows {
            let path = pivot.get_row_path(r).unwrap();
            let name = CATEGORIES
                .iter()
                .find(|c| path.first().and_then(|p| p.as_str()) == Some(**c))
                .unwrap();
            seen.insert(*name, data[r].as_f64().unwrap_or(0.0));
        }
        prop_assert_eq!(seen, sums);
    }

    /// An index-less table with a limit keeps the most recent rows only.
    #[test]
    fn limit_bounds_size(batches in prop::collection::vec(1usize..6, 1..10), limit in 1usize..8) {
        let schema = Schema::from_pairs(&[("value", DataType::Int64)]).unwrap();
        let mut table = Table::new(&schema, None, report().limit(limit)).unwrap();
        let mut written = 0usize;
        for len in batches {
            let rows: Vec<Vec<Scalar>> = (0..len)
                .map(|i| vec![Scalar::Int64((written + i) as i64)])
                .collect();
            table.update(&rows).unwrap();
            written += len;
            prop_assert_eq!(table.size(), written.min(limit));
        }
        let mut values: Vec<i64> = {
            let snapshot = table.get_table();
            (0..snapshot.size())
                .filter_map(|r| match snapshot.get_scalar("value", r).unwrap() {
                    Scalar::Int64(v) => Some(v),
                    _ => None,
                })
                .collect()
        };
        values.sort_unstable();
        let expected: Vec<i64> = ((written - written.min(limit))..written).map(|v| v as i64).collect();
        prop_assert_eq!(values, expected);
    }
}
