//! One open board: the storage handle, the Entity Store, the gateway
//! outbox, the drag engine and the realtime subscriptions, owned together
//! for as long as the board is open.
//!
//! The caller's event loop drives it with three kinds of calls: gesture
//! and edit callbacks ([`Board::mutate`], the drag wrappers, tool calls),
//! [`Board::flush`] to issue queued remote writes, and [`Board::pump`] to
//! fold whatever the change feed delivered. Each call is a complete
//! `&mut` transition of the store.

use tracing::{debug, info, instrument, warn};

use crate::config::LanesConfig;
use crate::drag::{DragEngine, DragItem, DragTarget, DropCommit, describe};
use crate::error::BoardError;
use crate::gateway::{FlushReport, Gateway, Mutation, Notification};
use crate::graph::{DependencyGate, DependencyGraph};
use crate::model::{Column, Deliverable, DeliverableContent, Project, Table, Task, row_str};
use crate::realtime::merge::sort_by_order_position;
use crate::realtime::{
    BoardFeed, ChangeEvent, ChangeKind, IgnoreReason, MergeError, MergeOutcome, ParkedEvents,
    apply_change, reconcile_order,
};
use crate::storage::{Filter, Storage, StorageError, select_as};
use crate::store::BoardStore;
use crate::tools::{ToolCall, resolve};

/// Counts from one [`Board::pump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub received: usize,
    pub applied: usize,
    pub ignored: usize,
    pub parked: usize,
    pub replayed: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct Board<S: Storage> {
    storage: S,
    project_id: String,
    config: LanesConfig,
    store: BoardStore,
    gateway: Gateway,
    drag: DragEngine,
    feed: BoardFeed,
    parked: ParkedEvents,
}

impl<S: Storage> Board<S> {
    /// Subscribe to the configured tables, then load the project's board.
    ///
    /// Subscribing first means nothing written between the load and the
    /// subscription is missed; events that repeat loaded rows merge in
    /// place.
    ///
    /// # Errors
    ///
    /// [`BoardError::ProjectNotLoaded`] when the project does not exist,
    /// [`BoardError::Storage`] when a select, subscribe or decode fails.
    pub fn open(storage: S, project_id: &str, config: LanesConfig) -> Result<Self, BoardError> {
        let mut feed = BoardFeed::new();
        if config.sync.realtime {
            for &table in &config.sync.tables {
                let filter = match table {
                    Table::Projects => Some(Filter::eq("id", project_id)),
                    Table::Columns => Some(Filter::eq("project_id", project_id)),
                    Table::Tasks | Table::Deliverables | Table::DeliverableContents => None,
                };
                feed.push(storage.subscribe(table, filter)?);
            }
        }

        let store = fetch(&storage, project_id)?;
        if store.project().is_none() {
            return Err(BoardError::ProjectNotLoaded);
        }

        info!(
            project = project_id,
            columns = store.columns().len(),
            tasks = store.tasks().len(),
            subscriptions = feed.tables().len(),
            "board opened"
        );

        Ok(Self {
            gateway: Gateway::new(config.gateway_options()),
            drag: DragEngine::new(config.drag.debounce_per_tick),
            parked: ParkedEvents::with_capacity(config.sync.max_parked_events),
            storage,
            project_id: project_id.to_string(),
            config,
            store,
            feed,
        })
    }

    /// Release the realtime subscriptions. The board stays readable and
    /// can still flush, but no longer receives remote changes.
    pub fn close(&mut self) {
        if self.feed.is_empty() {
            return;
        }
        self.feed.release();
        self.parked.clear();
        info!(project = %self.project_id, "board closed");
    }

    #[must_use]
    pub const fn store(&self) -> &BoardStore {
        &self.store
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub const fn config(&self) -> &LanesConfig {
        &self.config
    }

    #[must_use]
    pub const fn drag(&self) -> &DragEngine {
        &self.drag
    }

    #[must_use]
    pub const fn parked(&self) -> &ParkedEvents {
        &self.parked
    }

    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.gateway.pending().len()
    }

    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        self.gateway.notifications()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.gateway.take_notifications()
    }

    // -- local edits --------------------------------------------------------

    /// Apply a mutation locally and queue its remote writes.
    ///
    /// # Errors
    ///
    /// Validation errors from the gateway; nothing changed in that case.
    pub fn mutate(&mut self, mutation: Mutation) -> Result<Option<String>, BoardError> {
        self.gateway.apply(&mut self.store, mutation)
    }

    /// Resolve an AI tool call and apply every mutation it produces.
    ///
    /// The call is all-or-nothing: if any mutation fails validation, the
    /// store and the pending writes are left as they were.
    ///
    /// # Errors
    ///
    /// [`BoardError::Tool`] for an unknown tool or bad arguments, or the
    /// first gateway validation error.
    pub fn call_tool(&mut self, call: &ToolCall) -> Result<Vec<Option<String>>, BoardError> {
        let mutations = resolve(&self.store, call)?;
        debug!(tool = %call.name, mutations = mutations.len(), "tool call resolved");
        self.gateway.apply_all(&mut self.store, mutations)
    }

    /// Issue every queued remote write.
    #[instrument(skip(self), fields(project = %self.project_id))]
    pub fn flush(&mut self) -> FlushReport {
        self.gateway.flush(&mut self.store, &self.storage)
    }

    // -- realtime -----------------------------------------------------------

    /// Fold everything the change feed has delivered since the last pump.
    ///
    /// Malformed events are logged and dropped one at a time; no error
    /// leaves this call.
    #[instrument(skip(self), fields(project = %self.project_id))]
    pub fn pump(&mut self) -> PumpReport {
        let events = self.feed.drain();
        let mut report = PumpReport {
            received: events.len(),
            ..PumpReport::default()
        };
        for event in events {
            self.receive(event, &mut report);
        }
        if report.received > 0 {
            debug!(?report, "pumped change feed");
        }
        report
    }

    /// Apply a single change event as if the feed had delivered it.
    ///
    /// # Errors
    ///
    /// Returns the [`MergeError`] for a malformed payload; the store is
    /// unchanged.
    pub fn apply_change(&mut self, event: ChangeEvent) -> Result<MergeOutcome, MergeError> {
        if self.is_foreign(&event) {
            return Ok(MergeOutcome::Ignored(IgnoreReason::OtherProject));
        }
        let mut report = PumpReport::default();
        let outcome = apply_change(&mut self.store, &event);
        if let Ok(outcome) = &outcome {
            self.after_merge(&event, *outcome, &mut report);
        }
        outcome
    }

    fn receive(&mut self, event: ChangeEvent, report: &mut PumpReport) {
        if self.is_foreign(&event) {
            report.ignored += 1;
            debug!(table = %event.table, id = event.row_id().unwrap_or("?"), "ignoring row of another project");
            return;
        }
        match apply_change(&mut self.store, &event) {
            Ok(outcome) => {
                if outcome.is_applied() {
                    report.applied += 1;
                } else {
                    report.ignored += 1;
                }
                self.after_merge(&event, outcome, report);
            }
            Err(err) => {
                report.dropped += 1;
                warn!(table = %event.table, kind = %event.kind, error = %err, "dropping malformed change event");
            }
        }
    }

    /// Whether `event`'s row hangs off a column of another project.
    ///
    /// Only rows whose parent is not loaded are looked up, walking parent
    /// ids through storage up to the column. A lineage that cannot be
    /// traced counts as ours; refetch prunes it if it never resolves.
    fn is_foreign(&self, event: &ChangeEvent) -> bool {
        if event.table == Table::Columns {
            return event.field("project_id").is_some_and(|p| p != self.project_id);
        }
        let Some(mut link) = parent_link(event.table, |key| event.field(key)) else {
            return false;
        };
        loop {
            let (table, id) = link;
            if self.store.holds(table, &id) {
                return false;
            }
            let row = match self.storage.select(table, &[Filter::eq("id", id.clone())]) {
                Ok(rows) => rows.into_iter().next(),
                Err(err) => {
                    warn!(%table, id = %id, error = %err, "could not trace row lineage");
                    return false;
                }
            };
            let Some(row) = row else {
                return false;
            };
            if table == Table::Columns {
                return row_str(&row, "project_id").is_some_and(|p| p != self.project_id);
            }
            let Some(next) = parent_link(table, |key| row_str(&row, key)) else {
                return false;
            };
            link = next;
        }
    }

    /// Park deliverable events whose task is not here yet, and replay the
    /// ones a task insert was waiting for.
    fn after_merge(&mut self, event: &ChangeEvent, outcome: MergeOutcome, report: &mut PumpReport) {
        match (event.table, outcome) {
            (Table::Deliverables, MergeOutcome::Ignored(IgnoreReason::UnknownParent)) => {
                if let Some(task_id) = event.field("task_id").map(str::to_string) {
                    if self.parked.park(&task_id, event.clone()) {
                        report.parked += 1;
                        debug!(task_id = %task_id, kind = %event.kind, "parked deliverable event");
                    } else {
                        report.dropped += 1;
                    }
                }
            }
            (Table::Tasks, MergeOutcome::Appended | MergeOutcome::Merged) => {
                let Some(task_id) = event.row_id().map(str::to_string) else {
                    return;
                };
                for parked in self.parked.take(&task_id) {
                    report.replayed += 1;
                    self.receive(parked, report);
                }
            }
            (Table::Tasks, MergeOutcome::Removed) if event.kind == ChangeKind::Delete => {
                if let Some(task_id) = event.row_id() {
                    let discarded = self.parked.take(task_id).len();
                    if discarded > 0 {
                        debug!(task_id, discarded, "discarded events parked on a deleted task");
                    }
                }
            }
            _ => {}
        }
    }

    /// Re-select the whole board and fold it into the current display
    /// order. Parked events are discarded; orphaned tasks are pruned.
    ///
    /// # Errors
    ///
    /// [`BoardError::Storage`] when a select fails or a row does not
    /// decode. The store is unchanged in that case.
    pub fn refetch(&mut self) -> Result<(), BoardError> {
        let fetched = fetch(&self.storage, &self.project_id)?;
        let project = fetched.project().cloned();
        let columns = reconcile_order(self.store.columns(), fetched.columns().to_vec());
        let tasks: Vec<Task> = reconcile_order(self.store.tasks(), fetched.tasks().to_vec())
            .into_iter()
            .map(|mut task| {
                if let Some(current) = self.store.task(&task.id) {
                    task.deliverables =
                        reconcile_order(&current.deliverables, std::mem::take(&mut task.deliverables));
                }
                task
            })
            .collect();
        let contents = reconcile_order(self.store.contents(), fetched.contents().to_vec());

        self.store.update_project(|_| project);
        self.store.update_columns(|_| columns);
        self.store.update_tasks(|_| tasks);
        self.store.update_contents(|_| contents);
        self.parked.clear();
        info!(
            project = %self.project_id,
            columns = self.store.columns().len(),
            tasks = self.store.tasks().len(),
            "board refetched"
        );
        Ok(())
    }

    // -- drag and drop ------------------------------------------------------

    /// Start a gesture; returns the pick-up announcement.
    ///
    /// # Errors
    ///
    /// [`BoardError::Drag`] mid-gesture or for an unknown item.
    pub fn pick_up(&mut self, item: DragItem) -> Result<String, BoardError> {
        let announcement = self.drag.pick_up(&self.store, item)?;
        Ok(describe(&self.store, &announcement))
    }

    /// Pointer moved over `target` during `tick`. `None` when debounced.
    ///
    /// # Errors
    ///
    /// [`BoardError::Drag`] when idle, for a missing target, or when the
    /// dragged task vanished.
    pub fn drag_over(&mut self, target: DragTarget, tick: u64) -> Result<Option<String>, BoardError> {
        let announcement = self.drag.drag_over(&mut self.store, target, tick)?;
        Ok(announcement.map(|a| describe(&self.store, &a)))
    }

    /// End the gesture and commit it through the gateway. A drop without a
    /// target cancels.
    ///
    /// # Errors
    ///
    /// [`BoardError::Drag`] when idle, or a gateway validation error for
    /// the commit.
    pub fn drop_on(&mut self, target: Option<DragTarget>) -> Result<String, BoardError> {
        let result = self.drag.drop(&mut self.store, target)?;
        let text = describe(&self.store, &result.announcement);
        match result.commit {
            Some(DropCommit::MoveColumn { id, to_index }) => {
                self.gateway
                    .apply(&mut self.store, Mutation::MoveColumn { id, to_index })?;
            }
            Some(DropCommit::Task { id, from_column }) => {
                self.gateway
                    .apply(&mut self.store, Mutation::CommitTaskDrop { id, from_column })?;
            }
            None => {}
        }
        Ok(text)
    }

    /// Abort the gesture, restoring the dragged task.
    ///
    /// # Errors
    ///
    /// [`BoardError::Drag`] when idle.
    pub fn cancel_drag(&mut self) -> Result<String, BoardError> {
        let announcement = self.drag.cancel(&mut self.store)?;
        Ok(describe(&self.store, &announcement))
    }

    // -- queries ------------------------------------------------------------

    /// Whether a deliverable's dependency lets it be worked on.
    #[must_use]
    pub fn gate(&self, deliverable_id: &str) -> DependencyGate {
        DependencyGraph::from_store(&self.store).gate(deliverable_id)
    }
}

/// The parent table and id a row of `table` points at.
fn parent_link<'a>(table: Table, field: impl Fn(&str) -> Option<&'a str>) -> Option<(Table, String)> {
    let (parent, key) = match table {
        Table::Tasks => (Table::Columns, "column_id"),
        Table::Deliverables => (Table::Tasks, "task_id"),
        Table::DeliverableContents => (Table::Deliverables, "deliverable_id"),
        Table::Projects | Table::Columns => return None,
    };
    field(key).map(|id| (parent, id.to_string()))
}

/// Load one project's board from storage: the project row, its columns in
/// `order_position` order, their tasks with deliverables attached, and the
/// deliverables' content rows.
///
/// # Errors
///
/// Any [`StorageError`] from a select or a row decode.
pub fn fetch<S: Storage + ?Sized>(storage: &S, project_id: &str) -> Result<BoardStore, StorageError> {
    let project = select_as::<Project, S>(storage, &[Filter::eq("id", project_id)])?
        .into_iter()
        .next();
    let columns: Vec<Column> = select_as(storage, &[Filter::eq("project_id", project_id)])?;
    let column_ids: Vec<String> = columns.iter().map(|c| c.id.clone()).collect();

    let mut tasks: Vec<Task> = if column_ids.is_empty() {
        Vec::new()
    } else {
        select_as(storage, &[Filter::is_in("column_id", column_ids)])?
    };
    let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();

    let deliverables: Vec<Deliverable> = if task_ids.is_empty() {
        Vec::new()
    } else {
        select_as(storage, &[Filter::is_in("task_id", task_ids)])?
    };
    let deliverable_ids: Vec<String> = deliverables.iter().map(|d| d.id.clone()).collect();
    for deliverable in deliverables {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == deliverable.task_id) {
            task.deliverables.push(deliverable);
        }
    }

    let contents: Vec<DeliverableContent> = if deliverable_ids.is_empty() {
        Vec::new()
    } else {
        select_as(storage, &[Filter::is_in("deliverable_id", deliverable_ids)])?
    };

    let mut store = BoardStore::new();
    store.update_project(|_| project);
    store.update_columns(|_| sort_by_order_position(columns));
    store.update_tasks(|_| tasks);
    store.update_contents(|_| contents);
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::NewTask;
    use crate::model::Row;
    use crate::storage::MemoryStorage;

    fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut project = Row::new();
        project.insert("id".into(), "p1".into());
        project.insert("name".into(), "Launch".into());
        storage.insert(Table::Projects, project).expect("project");
        for (id, title, pos) in [("todo", "Todo", 0), ("done", "Done", 1)] {
            let mut column = Row::new();
            column.insert("id".into(), id.into());
            column.insert("project_id".into(), "p1".into());
            column.insert("title".into(), title.into());
            column.insert("order_position".into(), pos.into());
            storage.insert(Table::Columns, column).expect("column");
        }
        storage
    }

    fn task_row(id: &str, column_id: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), id.into());
        row.insert("column_id".into(), column_id.into());
        row.insert("title".into(), id.to_uppercase().into());
        row.insert("priority".into(), "medium".into());
        row
    }

    fn deliverable_row(id: &str, task_id: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), id.into());
        row.insert("task_id".into(), task_id.into());
        row.insert("title".into(), id.into());
        row.insert("status".into(), "Not Started".into());
        row
    }

    #[test]
    fn open_loads_and_subscribes_every_table() {
        let storage = seeded();
        let board = Board::open(storage.clone(), "p1", LanesConfig::default()).expect("open");
        assert_eq!(board.store().columns().len(), 2);
        assert_eq!(storage.subscriber_count(), Table::ALL.len());
    }

    #[test]
    fn open_unknown_project_fails() {
        let err = Board::open(seeded(), "nope", LanesConfig::default()).expect_err("missing project");
        assert!(matches!(err, BoardError::ProjectNotLoaded));
    }

    #[test]
    fn close_releases_subscriptions() {
        let storage = seeded();
        let mut board = Board::open(storage.clone(), "p1", LanesConfig::default()).expect("open");
        board.close();
        assert_eq!(storage.subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_board_releases_subscriptions() {
        let storage = seeded();
        {
            let _board = Board::open(storage.clone(), "p1", LanesConfig::default()).expect("open");
            assert!(storage.subscriber_count() > 0);
        }
        assert_eq!(storage.subscriber_count(), 0);
    }

    #[test]
    fn pump_applies_other_clients_writes() {
        let storage = seeded();
        let mut board = Board::open(storage.clone(), "p1", LanesConfig::default()).expect("open");
        storage.insert(Table::Tasks, task_row("t1", "todo")).expect("insert");
        let report = board.pump();
        assert_eq!(report.applied, 1);
        assert_eq!(board.store().tasks_in_column("todo").count(), 1);
    }

    #[test]
    fn own_echo_collapses_into_optimistic_insert() {
        let storage = seeded();
        let mut board = Board::open(storage, "p1", LanesConfig::default()).expect("open");
        board
            .mutate(Mutation::AddTask(NewTask::new("todo", "Write docs")))
            .expect("add");
        board.flush();
        board.pump();
        assert_eq!(board.store().tasks().len(), 1);
        assert!(board.store().tasks()[0].created_at.is_some());
    }

    #[test]
    fn early_deliverable_is_parked_until_its_task_lands() {
        let storage = seeded();
        let mut board = Board::open(storage, "p1", LanesConfig::default()).expect("open");

        board
            .apply_change(ChangeEvent::insert(Table::Deliverables, deliverable_row("d1", "t1")))
            .expect("parkable");
        assert_eq!(board.parked().len(), 1);

        board
            .apply_change(ChangeEvent::insert(Table::Tasks, task_row("t1", "todo")))
            .expect("task");
        assert!(board.parked().is_empty());
        assert!(board.store().deliverable("d1").is_some());
    }

    #[test]
    fn malformed_events_are_dropped_not_fatal() {
        let storage = seeded();
        let mut board = Board::open(storage.clone(), "p1", LanesConfig::default()).expect("open");
        let mut bad = Row::new();
        bad.insert("title".into(), "no id".into());
        let err = board.apply_change(ChangeEvent::insert(Table::Tasks, bad));
        assert!(err.is_err());
        assert!(board.store().tasks().is_empty());
    }

    #[test]
    fn realtime_off_opens_without_subscriptions() {
        let storage = seeded();
        let mut config = LanesConfig::default();
        config.sync.realtime = false;
        let board = Board::open(storage.clone(), "p1", config).expect("open");
        assert_eq!(storage.subscriber_count(), 0);
        drop(board);
    }

    #[test]
    fn deliverable_moved_to_an_unloaded_task_waits_for_it() {
        let mut board = Board::open(seeded(), "p1", LanesConfig::default()).expect("open");
        board
            .apply_change(ChangeEvent::insert(Table::Tasks, task_row("t1", "todo")))
            .expect("t1");
        board
            .apply_change(ChangeEvent::insert(Table::Deliverables, deliverable_row("d1", "t1")))
            .expect("d1");

        let mut moved = Row::new();
        moved.insert("id".into(), "d1".into());
        moved.insert("task_id".into(), "t9".into());
        let outcome = board
            .apply_change(ChangeEvent::update(Table::Deliverables, moved, None))
            .expect("move");
        assert_eq!(outcome, MergeOutcome::Ignored(IgnoreReason::UnknownParent));
        assert_eq!(board.parked().len(), 1);
        assert!(board.store().deliverable("d1").is_some());

        board
            .apply_change(ChangeEvent::insert(Table::Tasks, task_row("t9", "todo")))
            .expect("t9");
        assert!(board.parked().is_empty());
        assert_eq!(board.store().deliverable("d1").map(|d| d.task_id.as_str()), Some("t9"));
        assert_eq!(board.store().task("t1").map(|t| t.deliverables.len()), Some(0));
    }

    fn two_projects() -> MemoryStorage {
        let storage = seeded();
        let mut project = Row::new();
        project.insert("id".into(), "p2".into());
        project.insert("name".into(), "Other".into());
        storage.insert(Table::Projects, project).expect("p2");
        let mut column = Row::new();
        column.insert("id".into(), "elsewhere".into());
        column.insert("project_id".into(), "p2".into());
        column.insert("title".into(), "Elsewhere".into());
        storage.insert(Table::Columns, column).expect("p2 column");
        storage
    }

    #[test]
    fn rows_of_another_project_are_not_held() {
        let storage = two_projects();
        let mut board = Board::open(storage.clone(), "p1", LanesConfig::default()).expect("open");
        for i in 0..5 {
            storage
                .insert(Table::Tasks, task_row(&format!("x{i}"), "elsewhere"))
                .expect("foreign task");
        }
        storage
            .insert(Table::Deliverables, deliverable_row("xd", "x0"))
            .expect("foreign deliverable");

        let report = board.pump();
        assert_eq!(report.received, 6);
        assert_eq!(report.ignored, 6);
        assert!(board.store().tasks().is_empty());
        assert!(board.store().orphaned_tasks().is_empty());
        assert!(board.parked().is_empty());

        storage.insert(Table::Tasks, task_row("t1", "todo")).expect("own task");
        assert_eq!(board.pump().applied, 1);
        assert_eq!(board.store().tasks().len(), 1);
    }

    #[test]
    fn task_arriving_before_its_own_column_is_kept() {
        let storage = seeded();
        let mut board = Board::open(storage.clone(), "p1", LanesConfig::default()).expect("open");
        let mut column = Row::new();
        column.insert("id".into(), "later".into());
        column.insert("project_id".into(), "p1".into());
        column.insert("title".into(), "Later".into());
        let column = storage.insert(Table::Columns, column).expect("column");

        let outcome = board
            .apply_change(ChangeEvent::insert(Table::Tasks, task_row("t1", "later")))
            .expect("task");
        assert_eq!(outcome, MergeOutcome::Appended);
        assert_eq!(board.store().orphaned_tasks().len(), 1);

        board
            .apply_change(ChangeEvent::insert(Table::Columns, column))
            .expect("column event");
        assert!(board.store().orphaned_tasks().is_empty());
    }

    fn tool(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn failed_tool_call_leaves_the_board_untouched() {
        let storage = seeded();
        storage.insert(Table::Tasks, task_row("t1", "todo")).expect("t1");
        storage.insert(Table::Tasks, task_row("t2", "todo")).expect("t2");
        let mut board = Board::open(storage, "p1", LanesConfig::default()).expect("open");
        let before = board.store().clone();

        let err = board
            .call_tool(&tool(
                "delete_tasks",
                serde_json::json!({"task_ids": ["t1", "missing", "t2"]}),
            ))
            .expect_err("missing task");
        assert!(matches!(err, BoardError::TaskNotFound(ref id) if id == "missing"));
        assert_eq!(board.store(), &before);
        assert_eq!(board.pending_writes(), 0);

        board
            .call_tool(&tool(
                "add_tasks",
                serde_json::json!({"tasks": [{"title": "ok"}, {"title": "   "}]}),
            ))
            .expect_err("blank title");
        assert_eq!(board.store().tasks().len(), 2);
        assert_eq!(board.pending_writes(), 0);
    }

    #[test]
    fn successful_tool_call_applies_every_mutation() {
        let mut board = Board::open(seeded(), "p1", LanesConfig::default()).expect("open");
        let created = board
            .call_tool(&tool(
                "add_tasks",
                serde_json::json!({"tasks": [{"title": "a"}, {"title": "b", "column": "Done"}]}),
            ))
            .expect("add");
        assert_eq!(created.len(), 2);
        assert_eq!(board.store().tasks().len(), 2);
        assert_eq!(board.store().tasks_in_column("done").count(), 1);
        assert_eq!(board.pending_writes(), 2);
    }

    #[test]
    fn refetch_prunes_orphans_and_parked_events() {
        let storage = seeded();
        let mut board = Board::open(storage, "p1", LanesConfig::default()).expect("open");
        board
            .apply_change(ChangeEvent::insert(Table::Tasks, task_row("ghost", "gone")))
            .expect("orphan");
        board
            .apply_change(ChangeEvent::insert(Table::Deliverables, deliverable_row("d9", "t9")))
            .expect("parked");
        assert_eq!(board.store().orphaned_tasks().len(), 1);

        board.refetch().expect("refetch");
        assert!(board.store().orphaned_tasks().is_empty());
        assert!(board.parked().is_empty());
    }
}
