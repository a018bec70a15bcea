//! The AI tool-call bridge.
//!
//! Tool calls arrive as a name plus loosely-typed JSON arguments. Each call
//! is validated and resolved against the current store into ordinary
//! [`Mutation`]s, which then go through the same gateway as a user action.
//! There is no second write path.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::error::ErrorCode;
use crate::gateway::{DeliverablePatch, Mutation, NewDeliverable, NewTask, TaskPatch};
use crate::model::date::parse_due_date;
use crate::model::{DeliverableStatus, Priority};
use crate::store::BoardStore;

pub const ADD_TASKS: &str = "add_tasks";
pub const UPDATE_TASK: &str = "update_task";
pub const DELETE_TASKS: &str = "delete_tasks";
pub const MANAGE_DELIVERABLES: &str = "manage_deliverables";
pub const MANAGE_DELIVERABLE_CONTENT: &str = "manage_deliverable_content";

/// One tool invocation from the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl ToolError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownTool(_) => ErrorCode::UnknownTool,
            Self::InvalidArguments { .. } => ErrorCode::InvalidToolArguments,
        }
    }

    fn invalid(tool: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Argument shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AddTasksArgs {
    tasks: Vec<TaskArgs>,
}

#[derive(Debug, Deserialize)]
struct TaskArgs {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateTaskArgs {
    task_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteTasksArgs {
    task_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DeliverableAction {
    #[serde(alias = "add", alias = "CREATE", alias = "Create")]
    Create,
    #[serde(alias = "UPDATE", alias = "Update")]
    Update,
    #[serde(alias = "remove", alias = "DELETE", alias = "Delete")]
    Delete,
}

#[derive(Debug, Deserialize)]
struct DeliverableArgs {
    action: DeliverableAction,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    deliverable_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    /// Present-and-null clears the dependency; absent leaves it alone.
    #[serde(default, deserialize_with = "present")]
    depends_on: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct ContentArgs {
    deliverable_id: String,
    content: String,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: &Value) -> Result<T, ToolError> {
    // Some models send the arguments object as a JSON string.
    let value = match arguments {
        Value::String(text) => serde_json::from_str(text).map_err(|e| ToolError::invalid(tool, e.to_string()))?,
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| ToolError::invalid(tool, e.to_string()))
}

fn priority(tool: &str, raw: Option<&str>) -> Result<Option<Priority>, ToolError> {
    raw.map(|p| p.parse().map_err(|e: crate::model::ParseEnumError| ToolError::invalid(tool, e.to_string())))
        .transpose()
}

fn status(tool: &str, raw: Option<&str>) -> Result<Option<DeliverableStatus>, ToolError> {
    raw.map(|s| s.parse().map_err(|e: crate::model::ParseEnumError| ToolError::invalid(tool, e.to_string())))
        .transpose()
}

/// `None` for absent, `Some(None)` for an empty string.
fn due_date(tool: &str, raw: Option<&str>) -> Result<Option<Option<chrono::NaiveDate>>, ToolError> {
    match raw.map(str::trim) {
        None => Ok(None),
        Some("") => Ok(Some(None)),
        Some(text) => parse_due_date(text)
            .map(|d| Some(Some(d)))
            .ok_or_else(|| ToolError::invalid(tool, format!("invalid due_date '{text}'"))),
    }
}

/// Resolve a column reference by id, then by case-insensitive title.
fn column(tool: &str, store: &BoardStore, reference: &str) -> Result<String, ToolError> {
    if let Some(c) = store.column(reference) {
        return Ok(c.id.clone());
    }
    let wanted = reference.trim().to_lowercase();
    store
        .columns()
        .iter()
        .find(|c| c.title.trim().to_lowercase() == wanted)
        .map(|c| c.id.clone())
        .ok_or_else(|| ToolError::invalid(tool, format!("no column named '{reference}'")))
}

fn required(tool: &str, field: &str, value: Option<String>) -> Result<String, ToolError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ToolError::invalid(tool, format!("`{field}` is required")))
}

/// Validate `call` and turn it into the mutations it stands for.
///
/// # Errors
///
/// Returns [`ToolError::UnknownTool`] for an unknown name, and
/// [`ToolError::InvalidArguments`] when the arguments do not match the
/// tool's schema or name a column that does not exist.
pub fn resolve(store: &BoardStore, call: &ToolCall) -> Result<Vec<Mutation>, ToolError> {
    let tool = call.name.as_str();
    match tool {
        ADD_TASKS => {
            let args: AddTasksArgs = parse_args(tool, &call.arguments)?;
            if args.tasks.is_empty() {
                return Err(ToolError::invalid(tool, "`tasks` must not be empty"));
            }
            let default_column = store.columns().first().map(|c| c.id.clone());
            args.tasks
                .into_iter()
                .map(|task| {
                    let column_id = match task.column.as_deref() {
                        Some(reference) => column(tool, store, reference)?,
                        None => default_column
                            .clone()
                            .ok_or_else(|| ToolError::invalid(tool, "the board has no columns"))?,
                    };
                    let mut new = NewTask::new(column_id, task.title);
                    new.description = task.description;
                    new.priority = priority(tool, task.priority.as_deref())?.unwrap_or_default();
                    new.due_date = due_date(tool, task.due_date.as_deref())?.flatten();
                    Ok(Mutation::AddTask(new))
                })
                .collect()
        }
        UPDATE_TASK => {
            let args: UpdateTaskArgs = parse_args(tool, &call.arguments)?;
            let patch = TaskPatch {
                title: args.title,
                description: args.description.map(Some),
                due_date: due_date(tool, args.due_date.as_deref())?,
                priority: priority(tool, args.priority.as_deref())?,
                column_id: None,
            };
            let mut mutations = Vec::new();
            if patch != TaskPatch::default() {
                mutations.push(Mutation::UpdateTask {
                    id: args.task_id.clone(),
                    patch,
                });
            }
            if let Some(reference) = args.column.as_deref() {
                mutations.push(Mutation::MoveTask {
                    id: args.task_id,
                    column_id: column(tool, store, reference)?,
                });
            }
            if mutations.is_empty() {
                return Err(ToolError::invalid(tool, "nothing to update"));
            }
            Ok(mutations)
        }
        DELETE_TASKS => {
            let args: DeleteTasksArgs = parse_args(tool, &call.arguments)?;
            Ok(args
                .task_ids
                .into_iter()
                .map(|id| Mutation::DeleteTask { id })
                .collect())
        }
        MANAGE_DELIVERABLES => {
            let args: DeliverableArgs = parse_args(tool, &call.arguments)?;
            match args.action {
                DeliverableAction::Create => {
                    let mut new = NewDeliverable::new(
                        required(tool, "task_id", args.task_id)?,
                        required(tool, "title", args.title)?,
                    );
                    new.description = args.description;
                    new.status = status(tool, args.status.as_deref())?.unwrap_or_default();
                    new.due_date = due_date(tool, args.due_date.as_deref())?.flatten();
                    new.depends_on = args.depends_on.flatten();
                    Ok(vec![Mutation::AddDeliverable(new)])
                }
                DeliverableAction::Update => {
                    let id = required(tool, "deliverable_id", args.deliverable_id)?;
                    let patch = DeliverablePatch {
                        title: args.title,
                        description: args.description.map(Some),
                        status: status(tool, args.status.as_deref())?,
                        due_date: due_date(tool, args.due_date.as_deref())?,
                    };
                    let mut mutations = Vec::new();
                    if patch != DeliverablePatch::default() {
                        mutations.push(Mutation::UpdateDeliverable { id: id.clone(), patch });
                    }
                    if let Some(depends_on) = args.depends_on {
                        mutations.push(Mutation::SetDependency { id, depends_on });
                    }
                    if mutations.is_empty() {
                        return Err(ToolError::invalid(tool, "nothing to update"));
                    }
                    Ok(mutations)
                }
                DeliverableAction::Delete => Ok(vec![Mutation::DeleteDeliverable {
                    id: required(tool, "deliverable_id", args.deliverable_id)?,
                }]),
            }
        }
        MANAGE_DELIVERABLE_CONTENT => {
            let args: ContentArgs = parse_args(tool, &call.arguments)?;
            Ok(vec![Mutation::UpsertContent {
                deliverable_id: args.deliverable_id,
                content: args.content,
            }])
        }
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

/// JSON-schema descriptions of every tool, in the shape chat APIs expect.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let priority = json!({"type": "string", "enum": Priority::ALL.map(Priority::as_str)});
    let status = json!({
        "type": "string",
        "enum": ["Not Started", "In Progress", "Completed", "Approved", "Rejected"]
    });
    let date = json!({"type": "string", "description": "YYYY-MM-DD"});

    vec![
        ToolDefinition {
            name: ADD_TASKS,
            description: "Add one or more tasks to the board.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": {"type": "string"},
                                "description": {"type": "string"},
                                "column": {"type": "string", "description": "Column id or title; defaults to the first column."},
                                "priority": priority,
                                "due_date": date
                            },
                            "required": ["title"]
                        }
                    }
                },
                "required": ["tasks"]
            }),
        },
        ToolDefinition {
            name: UPDATE_TASK,
            description: "Update a task's properties or move it to another column.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "column": {"type": "string"},
                    "priority": priority,
                    "due_date": date
                },
                "required": ["task_id"]
            }),
        },
        ToolDefinition {
            name: DELETE_TASKS,
            description: "Delete tasks by id.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "task_ids": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["task_ids"]
            }),
        },
        ToolDefinition {
            name: MANAGE_DELIVERABLES,
            description: "Create, update or delete a deliverable of a task.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["create", "update", "delete"]},
                    "task_id": {"type": "string"},
                    "deliverable_id": {"type": "string"},
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "status": status,
                    "due_date": date,
                    "depends_on": {"type": ["string", "null"], "description": "Deliverable that must be completed first; null clears it."}
                },
                "required": ["action"]
            }),
        },
        ToolDefinition {
            name: MANAGE_DELIVERABLE_CONTENT,
            description: "Replace the rich-text content of a deliverable.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "deliverable_id": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["deliverable_id", "content"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    fn store() -> BoardStore {
        let mut store = BoardStore::new();
        store.update_columns(|_| {
            ["To Do", "Doing"]
                .iter()
                .enumerate()
                .map(|(i, title)| {
                    let mut c = Column::new(None, *title);
                    c.id = format!("c{i}");
                    c
                })
                .collect()
        });
        store
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn add_tasks_resolves_columns_and_enums() {
        let mutations = resolve(
            &store(),
            &call(
                ADD_TASKS,
                json!({"tasks": [
                    {"title": "Plan", "column": "doing", "priority": "HIGH", "due_date": "2024-06-01T09:00:00Z"},
                    {"title": "Ship"}
                ]}),
            ),
        )
        .expect("valid call");
        let Mutation::AddTask(first) = &mutations[0] else {
            panic!("expected AddTask");
        };
        assert_eq!(first.column_id, "c1");
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.due_date.map(|d| d.to_string()).as_deref(), Some("2024-06-01"));
        let Mutation::AddTask(second) = &mutations[1] else {
            panic!("expected AddTask");
        };
        assert_eq!(second.column_id, "c0");
    }

    #[test]
    fn stringified_arguments_are_accepted() {
        let mutations = resolve(
            &store(),
            &call(DELETE_TASKS, Value::String(r#"{"task_ids": ["a", "b"]}"#.into())),
        )
        .expect("valid call");
        assert_eq!(mutations.len(), 2);
    }

    #[test]
    fn bad_arguments_are_rejected_before_dispatch() {
        let err = resolve(&store(), &call(ADD_TASKS, json!({"tasks": [{"title": "x", "priority": "p0"}]})))
            .expect_err("bad priority");
        assert_eq!(err.code(), ErrorCode::InvalidToolArguments);

        let err = resolve(&store(), &call(ADD_TASKS, json!({"tasks": [{"title": "x", "column": "Later"}]})))
            .expect_err("unknown column");
        assert!(err.to_string().contains("no column named"));

        let err = resolve(&store(), &call("launch_rockets", json!({}))).expect_err("unknown tool");
        assert_eq!(err.code(), ErrorCode::UnknownTool);
    }

    #[test]
    fn update_task_splits_patch_and_move() {
        let mutations = resolve(
            &store(),
            &call(UPDATE_TASK, json!({"task_id": "t1", "priority": "urgent", "column": "To Do"})),
        )
        .expect("valid call");
        assert!(matches!(&mutations[0], Mutation::UpdateTask { patch, .. } if patch.priority == Some(Priority::Urgent)));
        assert!(matches!(&mutations[1], Mutation::MoveTask { column_id, .. } if column_id == "c0"));
    }

    #[test]
    fn deliverable_dependency_null_clears() {
        let mutations = resolve(
            &store(),
            &call(
                MANAGE_DELIVERABLES,
                json!({"action": "update", "deliverable_id": "d1", "depends_on": null}),
            ),
        )
        .expect("valid call");
        assert_eq!(
            mutations,
            vec![Mutation::SetDependency {
                id: "d1".into(),
                depends_on: None
            }]
        );

        let err = resolve(&store(), &call(MANAGE_DELIVERABLES, json!({"action": "update", "deliverable_id": "d1"})))
            .expect_err("empty update");
        assert!(err.to_string().contains("nothing to update"));
    }

    #[test]
    fn definitions_cover_every_tool() {
        let names: Vec<&str> = tool_definitions().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            [ADD_TASKS, UPDATE_TASK, DELETE_TASKS, MANAGE_DELIVERABLES, MANAGE_DELIVERABLE_CONTENT]
        );
        for definition in tool_definitions() {
            assert_eq!(definition.parameters["type"], "object");
        }
    }
}
