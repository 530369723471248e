use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a run currently is. `Completed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    ParseInput,
    CreatePreview,
    ShowPreview,
    Dispatch,
    HandleError,
    Notify,
    Completed,
}

impl WorkflowStage {
    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ParseInput => "parse_input",
            Self::CreatePreview => "create_preview",
            Self::ShowPreview => "show_preview",
            Self::Dispatch => "dispatch",
            Self::HandleError => "handle_error",
            Self::Notify => "notify",
            Self::Completed => "completed",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    IntentRecognized,
    IntentRejected,
    PreviewBuilt,
    Approved,
    Rejected,
    Dispatched,
    DispatchFailed,
    ErrorHandled,
    NotificationAttempted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
    pub event: WorkflowEvent,
}
