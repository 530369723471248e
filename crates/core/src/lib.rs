//! Workflow engine for turning free-form CRM instructions into confirmed actions.
//!
//! A run goes extract → preview → confirm → dispatch → notify. Collaborators (extractor,
//! confirmation surface, executors, notifier) are injected through the traits in this crate.

pub mod audit;
pub mod config;
pub mod confirm;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod flows;
pub mod logging;
pub mod notify;
pub mod preview;

pub use confirm::{
    AutoApprove, ChannelConfirmation, ConfirmationHandle, ConfirmationLoop, ConfirmationOutcome,
    ConfirmationPolicy, ConfirmationSurface, Decision, PreviewPrompt, RoutedDecision,
    ScriptedConfirmation,
};
pub use dispatch::{ActionExecutor, Dispatcher, ExecutorError, RequiredField, ResultPayload};
pub use domain::intent::{FieldMap, Intent};
pub use domain::money::{format_currency, parse_amount};
pub use domain::preview::{FieldType, FieldValue, Preview, PreviewSchema};
pub use errors::{ErrorKind, WorkflowError};
pub use extract::{EntityExtractor, Extraction, ExtractionError, StaticExtractor};
pub use flows::{RunState, WorkflowController, WorkflowResult, WorkflowStage};
pub use notify::{InMemoryNotifier, NotificationKind, NotificationPayload, Notifier};
pub use preview::{PreviewBuilder, PreviewTemplate};
