use std::fmt;

use thiserror::Error;

use crate::drag::DragError;
use crate::gateway::Direction;
use crate::graph::cycles::CycleWarning;
use crate::realtime::MergeError;
use crate::storage::StorageError;
use crate::tools::ToolError;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ProjectNotLoaded,
    ColumnNotFound,
    TaskNotFound,
    DeliverableNotFound,
    InvalidField,
    CycleDetected,
    NoAdjacentColumn,
    MalformedChangeEvent,
    DragNotActive,
    DragAlreadyActive,
    DragTargetMissing,
    RemoteWriteRejected,
    RemoteRowNotFound,
    StorageUnavailable,
    UnknownTool,
    InvalidToolArguments,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::ProjectNotLoaded => "E1003",
            Self::ColumnNotFound => "E2001",
            Self::TaskNotFound => "E2002",
            Self::DeliverableNotFound => "E2003",
            Self::InvalidField => "E2004",
            Self::CycleDetected => "E2005",
            Self::NoAdjacentColumn => "E2006",
            Self::MalformedChangeEvent => "E3001",
            Self::DragNotActive => "E4001",
            Self::DragAlreadyActive => "E4002",
            Self::DragTargetMissing => "E4003",
            Self::RemoteWriteRejected => "E5001",
            Self::RemoteRowNotFound => "E5002",
            Self::StorageUnavailable => "E5003",
            Self::UnknownTool => "E6001",
            Self::InvalidToolArguments => "E6002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ProjectNotLoaded => "Project not loaded",
            Self::ColumnNotFound => "Column not found",
            Self::TaskNotFound => "Task not found",
            Self::DeliverableNotFound => "Deliverable not found",
            Self::InvalidField => "Invalid field value",
            Self::CycleDetected => "Dependency cycle would be created",
            Self::NoAdjacentColumn => "No adjacent column",
            Self::MalformedChangeEvent => "Malformed realtime change event",
            Self::DragNotActive => "No drag in progress",
            Self::DragAlreadyActive => "A drag is already in progress",
            Self::DragTargetMissing => "Drag target no longer exists",
            Self::RemoteWriteRejected => "Remote write rejected",
            Self::RemoteRowNotFound => "Remote row not found",
            Self::StorageUnavailable => "Storage unavailable",
            Self::UnknownTool => "Unknown tool",
            Self::InvalidToolArguments => "Invalid tool arguments",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .lanes/config.toml and retry."),
            Self::ProjectNotLoaded => Some("Open the board for an existing project id."),
            Self::ColumnNotFound | Self::TaskNotFound | Self::DeliverableNotFound => {
                Some("The entity may have been deleted by another client; refetch the board.")
            }
            Self::InvalidField => None,
            Self::CycleDetected => {
                Some("Remove or change the dependency so deliverables do not wait on each other.")
            }
            Self::NoAdjacentColumn => Some("The task is already in the first or last column."),
            Self::MalformedChangeEvent => None,
            Self::DragNotActive | Self::DragAlreadyActive => {
                Some("Finish or cancel the current drag before starting another.")
            }
            Self::DragTargetMissing => Some("The hovered entity was removed; pick a new target."),
            Self::RemoteWriteRejected | Self::RemoteRowNotFound => {
                Some("Local state may have drifted; refetch the board to re-sync.")
            }
            Self::StorageUnavailable => Some("Check connectivity to the datastore and retry."),
            Self::UnknownTool => Some("Use one of the names returned by tool_definitions()."),
            Self::InvalidToolArguments => {
                Some("Arguments must match the tool's JSON schema.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by board operations.
///
/// Validation failures are returned before any local state changes; remote
/// write failures never come back through this type (they are logged and
/// turned into notifications by the gateway).
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("no project is loaded on this board")]
    ProjectNotLoaded,
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("deliverable not found: {0}")]
    DeliverableNotFound(String),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("{0}")]
    Cycle(CycleWarning),
    #[error("no column to the {0} of the task's column")]
    NoAdjacentColumn(Direction),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Drag(#[from] DragError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl BoardError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Map this error onto the stable code table.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ProjectNotLoaded => ErrorCode::ProjectNotLoaded,
            Self::ColumnNotFound(_) => ErrorCode::ColumnNotFound,
            Self::TaskNotFound(_) => ErrorCode::TaskNotFound,
            Self::DeliverableNotFound(_) => ErrorCode::DeliverableNotFound,
            Self::InvalidField { .. } => ErrorCode::InvalidField,
            Self::Cycle(_) => ErrorCode::CycleDetected,
            Self::NoAdjacentColumn(_) => ErrorCode::NoAdjacentColumn,
            Self::Merge(_) => ErrorCode::MalformedChangeEvent,
            Self::Drag(err) => err.code(),
            Self::Storage(err) => err.code(),
            Self::Tool(err) => err.code(),
        }
    }
}
