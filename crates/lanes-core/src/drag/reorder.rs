//! Reordering primitives over the flat task array.
//!
//! A column's view is the flat array filtered by `column_id`, so moving a
//! task "before U" means placing it immediately before U in the flat array;
//! tasks of other columns in between are irrelevant to every view.

use crate::model::Task;

/// Move the element at `from` to `to`, shifting the ones in between.
///
/// After the call the element sits at index `to`. Out-of-range indices
/// leave the slice unchanged.
pub fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || to >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

/// Where a task ends up relative to the task it is hovering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverMove {
    /// Same column: standard array move onto the hovered index.
    WithinColumn,
    /// Other column: reassign and land immediately before the hovered task.
    AcrossColumns,
    /// Nothing changed (hovering itself, or a task that is not there).
    None,
}

/// Apply "task `active` is over task `over`" to the flat array.
///
/// Across columns the task always ends up just before `over` in the target
/// column's view. A forward move lands at `over_index - 1`, since removing
/// `active` shifts `over` down by one; a backward move lands at
/// `over_index` itself.
pub fn move_task_over_task(tasks: &mut Vec<Task>, active: &str, over: &str) -> OverMove {
    let Some(active_index) = tasks.iter().position(|t| t.id == active) else {
        return OverMove::None;
    };
    let Some(over_index) = tasks.iter().position(|t| t.id == over) else {
        return OverMove::None;
    };
    if active_index == over_index {
        return OverMove::None;
    }

    if tasks[active_index].column_id == tasks[over_index].column_id {
        array_move(tasks, active_index, over_index);
        return OverMove::WithinColumn;
    }

    let target_column = tasks[over_index].column_id.clone();
    tasks[active_index].column_id = target_column;
    let landing = if active_index < over_index {
        over_index - 1
    } else {
        over_index
    };
    array_move(tasks, active_index, landing);
    OverMove::AcrossColumns
}

/// Apply "task `active` is over column `column_id`": reassign the column,
/// keep the array position. Returns whether anything changed.
pub fn move_task_to_column(tasks: &mut [Task], active: &str, column_id: &str) -> bool {
    match tasks.iter_mut().find(|t| t.id == active) {
        Some(task) if task.column_id != column_id => {
            task.column_id = column_id.to_string();
            true
        }
        _ => false,
    }
}

/// Remove `task_id` and append it, so it becomes the last task of whatever
/// column it is in.
pub fn move_to_end(tasks: &mut Vec<Task>, task_id: &str) {
    if let Some(index) = tasks.iter().position(|t| t.id == task_id) {
        let task = tasks.remove(index);
        tasks.push(task);
    }
}

/// Put `task_id` back into `column_id`, before `successor` if that task is
/// still present, otherwise at `index` clamped to the array.
pub fn restore_position(tasks: &mut Vec<Task>, task_id: &str, column_id: &str, index: usize, successor: Option<&str>) {
    let Some(current) = tasks.iter().position(|t| t.id == task_id) else {
        return;
    };
    let mut task = tasks.remove(current);
    task.column_id = column_id.to_string();
    let landing = successor
        .and_then(|s| tasks.iter().position(|t| t.id == s))
        .unwrap_or_else(|| index.min(tasks.len()));
    tasks.insert(landing, task);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, column_id: &str) -> Task {
        let mut t = Task::new(column_id, id);
        t.id = id.to_string();
        t
    }

    fn flat(tasks: &[Task]) -> Vec<String> {
        tasks.iter().map(|t| format!("{}:{}", t.id, t.column_id)).collect()
    }

    fn view<'a>(tasks: &'a [Task], column: &str) -> Vec<&'a str> {
        tasks
            .iter()
            .filter(|t| t.column_id == column)
            .map(|t| t.id.as_str())
            .collect()
    }

    #[test]
    fn array_move_shifts_between() {
        let mut v = vec!['a', 'b', 'c', 'd'];
        array_move(&mut v, 0, 2);
        assert_eq!(v, ['b', 'c', 'a', 'd']);
        array_move(&mut v, 3, 0);
        assert_eq!(v, ['d', 'b', 'c', 'a']);
        array_move(&mut v, 1, 9);
        assert_eq!(v, ['d', 'b', 'c', 'a']);
    }

    #[test]
    fn forward_cross_column_lands_before_hovered() {
        // X: [a, t, b], Y: [u, v]; t sits before u in the flat array.
        let mut tasks = vec![task("a", "X"), task("t", "X"), task("b", "X"), task("u", "Y"), task("v", "Y")];
        assert_eq!(move_task_over_task(&mut tasks, "t", "u"), OverMove::AcrossColumns);
        assert_eq!(view(&tasks, "Y"), ["t", "u", "v"]);
        assert_eq!(view(&tasks, "X"), ["a", "b"]);
    }

    #[test]
    fn backward_cross_column_lands_before_hovered() {
        let mut tasks = vec![task("u", "Y"), task("v", "Y"), task("a", "X"), task("t", "X")];
        assert_eq!(move_task_over_task(&mut tasks, "t", "v"), OverMove::AcrossColumns);
        assert_eq!(view(&tasks, "Y"), ["u", "t", "v"]);
    }

    #[test]
    fn same_column_uses_array_move() {
        let mut tasks = vec![task("a", "X"), task("b", "X"), task("c", "X")];
        assert_eq!(move_task_over_task(&mut tasks, "a", "c"), OverMove::WithinColumn);
        assert_eq!(view(&tasks, "X"), ["b", "c", "a"]);
        assert_eq!(move_task_over_task(&mut tasks, "a", "a"), OverMove::None);
    }

    #[test]
    fn over_column_keeps_array_position() {
        let mut tasks = vec![task("a", "X"), task("b", "X")];
        assert!(move_task_to_column(&mut tasks, "a", "Y"));
        assert!(!move_task_to_column(&mut tasks, "a", "Y"));
        assert_eq!(flat(&tasks), ["a:Y", "b:X"]);
    }

    #[test]
    fn restore_prefers_successor_then_index() {
        let mut tasks = vec![task("a", "X"), task("b", "X"), task("t", "Y"), task("c", "X")];
        restore_position(&mut tasks, "t", "X", 1, Some("b"));
        assert_eq!(flat(&tasks), ["a:X", "t:X", "b:X", "c:X"]);

        let mut tasks = vec![task("t", "Y"), task("a", "X")];
        restore_position(&mut tasks, "t", "X", 7, Some("gone"));
        assert_eq!(flat(&tasks), ["a:X", "t:X"]);
    }

    #[test]
    fn move_to_end_appends() {
        let mut tasks = vec![task("a", "X"), task("b", "Y"), task("c", "Y")];
        move_to_end(&mut tasks, "a");
        assert_eq!(flat(&tasks), ["b:Y", "c:Y", "a:X"]);
    }
}
