pub mod controller;
pub mod engine;
pub mod run_state;
pub mod states;

pub use controller::WorkflowController;
pub use engine::{transition, FlowTransitionError, WorkflowEngine};
pub use run_state::{ConfirmationStatus, RunState, WorkflowResult};
pub use states::{TransitionOutcome, WorkflowEvent, WorkflowStage};
