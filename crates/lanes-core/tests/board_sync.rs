//! Two clients on one shared storage, exchanging writes through the feed.

use chrono::{TimeZone, Utc};
use lanes_core::board::Board;
use lanes_core::config::LanesConfig;
use lanes_core::drag::DragItem;
use lanes_core::gateway::{
    DeliverablePatch, Level, Mutation, NewDeliverable, NewTask, TaskPatch,
};
use lanes_core::graph::DependencyGate;
use lanes_core::model::{Column, DeliverableStatus, Entity, Project, Table};
use lanes_core::realtime::ChangeEvent;
use lanes_core::storage::{Filter, MemoryStorage, Storage};

fn shared_storage() -> MemoryStorage {
    let base = Utc
        .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .expect("valid base time");
    let storage = MemoryStorage::with_logical_clock(base);
    let project = Project {
        id: "p1".into(),
        name: "Launch".into(),
        description: None,
        created_at: None,
        updated_at: None,
    };
    storage.insert(Table::Projects, project.to_row()).expect("project");
    for (position, title) in ["Todo", "Doing", "Done"].into_iter().enumerate() {
        let mut column = Column::new(Some("p1".into()), title);
        column.id = title.to_lowercase();
        column.order_position = Some(i64::try_from(position).expect("small"));
        storage.insert(Table::Columns, column.to_row()).expect("column");
    }
    storage
}

fn open(storage: &MemoryStorage) -> Board<MemoryStorage> {
    Board::open(storage.clone(), "p1", LanesConfig::default()).expect("open board")
}

fn add_task(board: &mut Board<MemoryStorage>, column: &str, title: &str) -> String {
    board
        .mutate(Mutation::AddTask(NewTask::new(column, title)))
        .expect("add task")
        .expect("task id")
}

fn titles_in(board: &Board<MemoryStorage>, column: &str) -> Vec<String> {
    board
        .store()
        .tasks_in_column(column)
        .map(|t| t.title.clone())
        .collect()
}

#[test]
fn replayed_insert_leaves_one_task() {
    let storage = shared_storage();
    let mut alice = open(&storage);
    let mut bob = open(&storage);

    let id = add_task(&mut alice, "todo", "Draft");
    alice.flush();
    bob.pump();

    let row = bob.store().task(&id).expect("bob sees the task").to_row();
    bob.apply_change(ChangeEvent::insert(Table::Tasks, row.clone()))
        .expect("replay");
    bob.apply_change(ChangeEvent::insert(Table::Tasks, row))
        .expect("replay again");

    assert_eq!(bob.store().tasks().len(), 1);
    assert!(bob.store().duplicate_ids().is_empty());
}

#[test]
fn remote_update_keeps_display_order() {
    let storage = shared_storage();
    let mut alice = open(&storage);
    let mut bob = open(&storage);

    add_task(&mut alice, "todo", "A");
    let b = add_task(&mut alice, "todo", "B");
    add_task(&mut alice, "todo", "C");
    alice.flush();
    bob.pump();
    assert_eq!(titles_in(&bob, "todo"), ["A", "B", "C"]);

    bob.mutate(Mutation::UpdateTask {
        id: b,
        patch: TaskPatch {
            title: Some("B'".into()),
            ..TaskPatch::default()
        },
    })
    .expect("update");
    bob.flush();
    alice.pump();

    assert_eq!(titles_in(&alice, "todo"), ["A", "B'", "C"]);
    assert_eq!(titles_in(&bob, "todo"), ["A", "B'", "C"]);
}

#[test]
fn cross_column_drag_lands_before_hovered_task_everywhere() {
    let storage = shared_storage();
    let mut alice = open(&storage);
    let mut bob = open(&storage);

    add_task(&mut alice, "todo", "X1");
    let t = add_task(&mut alice, "todo", "T");
    add_task(&mut alice, "todo", "X3");
    let u = add_task(&mut alice, "doing", "U");
    add_task(&mut alice, "doing", "Y2");
    alice.flush();
    bob.pump();

    let picked = alice.pick_up(DragItem::Task(t.clone())).expect("pick up");
    assert_eq!(picked, "Picked up. Task T is at position 2 of 3 in column Todo.");

    alice
        .drag_over(DragItem::Task(u.clone()), 1)
        .expect("drag over");
    let dropped = alice.drop_on(Some(DragItem::Task(u))).expect("drop");
    assert_eq!(dropped, "Dropped. Task T is at position 1 of 3 in column Doing.");
    assert_eq!(titles_in(&alice, "doing"), ["T", "U", "Y2"]);

    alice.flush();
    let stored = storage
        .select(Table::Tasks, &[Filter::eq("id", t.clone())])
        .expect("select");
    assert_eq!(stored[0]["column_id"], "doing");

    bob.pump();
    assert_eq!(bob.store().task(&t).expect("task").column_id, "doing");
}

#[test]
fn cancelled_drag_restores_position_and_writes_nothing() {
    let storage = shared_storage();
    let mut alice = open(&storage);

    add_task(&mut alice, "todo", "X1");
    let t = add_task(&mut alice, "todo", "T");
    add_task(&mut alice, "todo", "X3");
    let u = add_task(&mut alice, "doing", "U");
    alice.flush();
    let before = alice.store().tasks().to_vec();

    alice.pick_up(DragItem::Task(t)).expect("pick up");
    alice.drag_over(DragItem::Task(u), 1).expect("drag over");
    let text = alice.cancel_drag().expect("cancel");

    assert!(text.starts_with("Dragging was cancelled."));
    assert_eq!(alice.store().tasks(), before.as_slice());
    assert_eq!(alice.pending_writes(), 0);
}

#[test]
fn column_delete_cascades_to_every_client() {
    let storage = shared_storage();
    let mut alice = open(&storage);
    let mut bob = open(&storage);

    add_task(&mut alice, "todo", "T1");
    add_task(&mut alice, "todo", "T2");
    add_task(&mut alice, "done", "Keep");
    alice.flush();
    bob.pump();

    alice
        .mutate(Mutation::DeleteColumn { id: "todo".into() })
        .expect("delete column");
    assert!(alice.store().column("todo").is_none());
    alice.flush();

    let remaining = storage
        .select(Table::Tasks, &[Filter::eq("column_id", "todo")])
        .expect("select");
    assert!(remaining.is_empty());

    bob.pump();
    assert!(bob.store().column("todo").is_none());
    assert_eq!(bob.store().tasks().len(), 1);
    assert!(bob.store().orphaned_tasks().is_empty());
}

#[test]
fn dependency_gate_opens_when_remote_completes_it() {
    let storage = shared_storage();
    let mut alice = open(&storage);
    let mut bob = open(&storage);

    let task = add_task(&mut alice, "todo", "Ship");
    let first = alice
        .mutate(Mutation::AddDeliverable(NewDeliverable::new(task.clone(), "Spec")))
        .expect("add")
        .expect("id");
    let mut second = NewDeliverable::new(task, "Build");
    second.depends_on = Some(first.clone());
    let second = alice
        .mutate(Mutation::AddDeliverable(second))
        .expect("add")
        .expect("id");
    alice.flush();
    bob.pump();

    assert!(matches!(bob.gate(&second), DependencyGate::Blocked { .. }));

    alice
        .mutate(Mutation::UpdateDeliverable {
            id: first,
            patch: DeliverablePatch {
                status: Some(DeliverableStatus::Completed),
                ..DeliverablePatch::default()
            },
        })
        .expect("complete");
    alice.flush();
    bob.pump();

    assert_eq!(bob.gate(&second), DependencyGate::Open);
}

#[test]
fn optimistic_insert_collapses_with_its_echo() {
    let storage = shared_storage();
    let mut alice = open(&storage);

    let id = add_task(&mut alice, "todo", "Draft");
    assert!(alice.store().task(&id).expect("local").created_at.is_none());

    alice.flush();
    alice.pump();

    assert_eq!(alice.store().tasks().len(), 1);
    let task = alice.store().task(&id).expect("task");
    assert!(task.created_at.is_some());
    assert!(alice.store().duplicate_ids().is_empty());
}

#[test]
fn failed_write_notifies_without_rollback() {
    let storage = shared_storage();
    let mut alice = open(&storage);

    storage.fail_next_writes(1);
    let id = add_task(&mut alice, "todo", "Lost");
    let report = alice.flush();

    assert_eq!(report.failures, 1);
    assert!(alice.store().task(&id).is_some());
    let notes = alice.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, Level::Error);
}

#[test]
fn refetch_with_reversed_storage_order_keeps_display_order() {
    let storage = shared_storage();
    let mut alice = open(&storage);

    for title in ["one", "two", "three"] {
        add_task(&mut alice, "todo", title);
    }
    alice.flush();
    alice.pump();
    let before: Vec<String> = alice.store().tasks().iter().map(|t| t.id.clone()).collect();

    storage.set_reverse_select(true);
    alice.refetch().expect("refetch");

    let after: Vec<String> = alice.store().tasks().iter().map(|t| t.id.clone()).collect();
    assert_eq!(before, after);
    let columns: Vec<&str> = alice.store().columns().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(columns, ["todo", "doing", "done"]);
}

#[test]
fn fresh_open_sees_columns_in_order_position_order() {
    let storage = shared_storage();
    storage.set_reverse_select(true);
    let board = open(&storage);
    let columns: Vec<&str> = board.store().columns().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(columns, ["todo", "doing", "done"]);
}
