use lanes_core::model::{Row, Table};
use lanes_core::priority::priority_from_offset;
use lanes_core::realtime::{ChangeEvent, apply_change};
use lanes_core::store::BoardStore;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Insert { id: u8, column: u8, title: String },
    Update { id: u8, title: String },
    Delete { id: u8 },
}

fn task_id(id: u8) -> String {
    format!("t{id}")
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, 0u8..3, "[a-z]{1,6}").prop_map(|(id, column, title)| Op::Insert { id, column, title }),
        (0u8..8, "[a-z]{1,6}").prop_map(|(id, title)| Op::Update { id, title }),
        (0u8..8).prop_map(|id| Op::Delete { id }),
    ]
}

fn to_event(op: &Op) -> ChangeEvent {
    let mut row = Row::new();
    match op {
        Op::Insert { id, column, title } => {
            row.insert("id".into(), task_id(*id).into());
            row.insert("column_id".into(), format!("c{column}").into());
            row.insert("title".into(), title.clone().into());
            ChangeEvent::insert(Table::Tasks, row)
        }
        Op::Update { id, title } => {
            row.insert("id".into(), task_id(*id).into());
            row.insert("title".into(), title.clone().into());
            ChangeEvent::update(Table::Tasks, row, None)
        }
        Op::Delete { id } => {
            row.insert("id".into(), task_id(*id).into());
            ChangeEvent::delete(Table::Tasks, row)
        }
    }
}

fn apply_all(events: &[ChangeEvent]) -> BoardStore {
    let mut store = BoardStore::new();
    for event in events {
        apply_change(&mut store, event).expect("well-formed event");
    }
    store
}

fn ids(store: &BoardStore) -> Vec<String> {
    store.tasks().iter().map(|t| t.id.clone()).collect()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn duplicated_delivery_matches_single_delivery(ops in prop::collection::vec(arb_op(), 0..40)) {
        let events: Vec<ChangeEvent> = ops.iter().map(to_event).collect();
        let doubled: Vec<ChangeEvent> = events
            .iter()
            .flat_map(|e| [e.clone(), e.clone()])
            .collect();

        prop_assert_eq!(apply_all(&events), apply_all(&doubled));
    }

    #[test]
    fn merges_never_leave_duplicate_ids(ops in prop::collection::vec(arb_op(), 0..60)) {
        let events: Vec<ChangeEvent> = ops.iter().map(to_event).collect();
        let store = apply_all(&events);
        prop_assert!(store.duplicate_ids().is_empty());
    }

    #[test]
    fn updates_never_reorder(
        inserts in prop::collection::vec((0u8..3, "[a-z]{1,6}"), 1..12),
        updates in prop::collection::vec((0usize..12, "[a-z]{1,6}"), 0..24),
    ) {
        let mut events: Vec<ChangeEvent> = inserts
            .iter()
            .enumerate()
            .map(|(i, (column, title))| {
                let id = u8::try_from(i).expect("fewer than 256 inserts");
                to_event(&Op::Insert { id, column: *column, title: title.clone() })
            })
            .collect();
        let store = apply_all(&events);
        let before = ids(&store);

        for (index, title) in &updates {
            let id = u8::try_from(index % inserts.len()).expect("small index");
            events.push(to_event(&Op::Update { id, title: title.clone() }));
        }
        let after = apply_all(&events);

        prop_assert_eq!(before, ids(&after));
    }

    #[test]
    fn slider_is_monotone(a in 0.0f64..400.0, b in 0.0f64..400.0, width in 1.0f64..400.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(priority_from_offset(lo, width) <= priority_from_offset(hi, width));
    }
}
