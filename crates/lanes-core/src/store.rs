//! The Entity Store: the board's complete client-visible state.
//!
//! Every mutation goes through an `update_*` setter that receives the
//! previous collection by value and returns the next one. Nothing outside
//! this module holds a snapshot it later writes back, so an optimistic edit
//! and a realtime merge landing in the same frame compose instead of one
//! clobbering the other.
//!
//! Within-column task order is the order of the flat `tasks` vector
//! filtered by `column_id`; there is no per-column array.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{Column, Deliverable, DeliverableContent, Project, Table, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardStore {
    #[serde(default)]
    project: Option<Project>,
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    contents: Vec<DeliverableContent>,
}

impl BoardStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- setters ------------------------------------------------------------

    pub fn update_project(&mut self, f: impl FnOnce(Option<Project>) -> Option<Project>) {
        self.project = f(self.project.take());
    }

    pub fn update_columns(&mut self, f: impl FnOnce(Vec<Column>) -> Vec<Column>) {
        self.columns = f(std::mem::take(&mut self.columns));
    }

    pub fn update_tasks(&mut self, f: impl FnOnce(Vec<Task>) -> Vec<Task>) {
        self.tasks = f(std::mem::take(&mut self.tasks));
    }

    pub fn update_contents(
        &mut self,
        f: impl FnOnce(Vec<DeliverableContent>) -> Vec<DeliverableContent>,
    ) {
        self.contents = f(std::mem::take(&mut self.contents));
    }

    // -- reads --------------------------------------------------------------

    #[must_use]
    pub const fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn contents(&self) -> &[DeliverableContent] {
        &self.contents
    }

    #[must_use]
    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    #[must_use]
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn task_index(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Whether a row of `table` with `id` is loaded.
    #[must_use]
    pub fn holds(&self, table: Table, id: &str) -> bool {
        match table {
            Table::Projects => self.project.as_ref().is_some_and(|p| p.id == id),
            Table::Columns => self.column(id).is_some(),
            Table::Tasks => self.task(id).is_some(),
            Table::Deliverables => self.deliverable(id).is_some(),
            Table::DeliverableContents => self.contents.iter().any(|c| c.id == id),
        }
    }

    /// The filtered view of one column, in flat-array order.
    pub fn tasks_in_column<'a>(&'a self, column_id: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.iter().filter(move |t| t.column_id == column_id)
    }

    /// Zero-based position of a task within its column's view, and the
    /// number of tasks in that column.
    #[must_use]
    pub fn task_position(&self, task_id: &str) -> Option<(usize, usize)> {
        let task = self.task(task_id)?;
        let mut position = None;
        let mut count = 0;
        for (i, t) in self.tasks_in_column(&task.column_id).enumerate() {
            if t.id == task_id {
                position = Some(i);
            }
            count += 1;
        }
        position.map(|p| (p, count))
    }

    /// Every deliverable on the board, task by task.
    pub fn deliverables(&self) -> impl Iterator<Item = &Deliverable> {
        self.tasks.iter().flat_map(|t| t.deliverables.iter())
    }

    #[must_use]
    pub fn deliverable(&self, id: &str) -> Option<&Deliverable> {
        self.deliverables().find(|d| d.id == id)
    }

    #[must_use]
    pub fn content(&self, deliverable_id: &str) -> Option<&DeliverableContent> {
        self.contents
            .iter()
            .find(|c| c.deliverable_id == deliverable_id)
    }

    /// Content body for a deliverable. A missing row reads as empty.
    #[must_use]
    pub fn content_for(&self, deliverable_id: &str) -> &str {
        self.content(deliverable_id).map_or("", |c| c.content.as_str())
    }

    /// Tasks whose column is not on the board (delete races, feed skew).
    #[must_use]
    pub fn orphaned_tasks(&self) -> Vec<&Task> {
        let known: HashSet<&str> = self.columns.iter().map(|c| c.id.as_str()).collect();
        self.tasks
            .iter()
            .filter(|t| !known.contains(t.column_id.as_str()))
            .collect()
    }

    /// Ids that appear more than once in a collection. Always empty when
    /// the merge rules hold.
    #[must_use]
    pub fn duplicate_ids(&self) -> Vec<(Table, String)> {
        fn scan<'a>(
            table: Table,
            ids: impl Iterator<Item = &'a str>,
            out: &mut Vec<(Table, String)>,
        ) {
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(id) {
                    out.push((table, id.to_string()));
                }
            }
        }

        let mut out = Vec::new();
        scan(Table::Columns, self.columns.iter().map(|c| c.id.as_str()), &mut out);
        scan(Table::Tasks, self.tasks.iter().map(|t| t.id.as_str()), &mut out);
        scan(Table::Deliverables, self.deliverables().map(|d| d.id.as_str()), &mut out);
        scan(
            Table::DeliverableContents,
            self.contents.iter().map(|c| c.id.as_str()),
            &mut out,
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(id: &str) -> Column {
        let mut c = Column::new(None, id.to_uppercase());
        c.id = id.to_string();
        c
    }

    fn task(id: &str, column_id: &str) -> Task {
        let mut t = Task::new(column_id, id);
        t.id = id.to_string();
        t
    }

    fn store() -> BoardStore {
        let mut store = BoardStore::new();
        store.update_columns(|_| vec![column("x"), column("y")]);
        store.update_tasks(|_| {
            vec![
                task("a", "x"),
                task("u", "y"),
                task("b", "x"),
                task("c", "x"),
                task("v", "y"),
            ]
        });
        store
    }

    #[test]
    fn column_view_is_filtered_flat_order() {
        let store = store();
        let ids: Vec<&str> = store.tasks_in_column("x").map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(store.task_position("b"), Some((1, 3)));
        assert_eq!(store.task_position("v"), Some((1, 2)));
        assert_eq!(store.task_position("missing"), None);
    }

    #[test]
    fn setters_compose_over_previous_state() {
        let mut store = store();
        store.update_tasks(|prev| prev.into_iter().filter(|t| t.id != "u").collect());
        store.update_tasks(|mut prev| {
            prev.push(task("w", "y"));
            prev
        });
        let ids: Vec<&str> = store.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "v", "w"]);
    }

    #[test]
    fn missing_content_reads_empty() {
        let store = store();
        assert_eq!(store.content_for("nope"), "");
    }

    #[test]
    fn orphans_and_duplicates_are_reported() {
        let mut store = store();
        store.update_tasks(|mut prev| {
            prev.push(task("ghost", "gone"));
            prev.push(task("a", "x"));
            prev
        });
        let orphans: Vec<&str> = store.orphaned_tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(orphans, ["ghost"]);
        assert_eq!(store.duplicate_ids(), vec![(Table::Tasks, "a".to_string())]);
    }
}
