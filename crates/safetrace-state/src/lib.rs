//! # safetrace-state: Alert and Recall Lifecycles
//!
//! State machines for the two records an anomaly moves through:
//!
//! - [`Alert`]: pending → processing → resolved → closed, with the
//!   processing → pending and processing → closed side exits.
//! - [`ProductRecall`]: draft → active → complete, cancellable from draft
//!   or active, gated on approval and a known affected quantity.
//!
//! Both keep their legal edges in the status enum's `valid_transitions()`
//! table and append a [`TransitionRecord`] for every accepted transition.
//! [`RecallProcess`] events drive [`ProgressState`], whose completion
//! signal the orchestrator turns into the recall's completion.
//!
//! Every operation takes the current time as an argument; nothing here
//! reads a clock.

pub mod alert;
pub mod process;
pub mod progress;
pub mod recall;
pub mod record;
pub mod requests;

pub use alert::{Alert, AlertDraft, AlertOrigin, Reporter};
pub use process::RecallProcess;
pub use progress::{
    progress_percent, CapacityExceeded, ProgressState, ProgressUpdate, ReplayOutcome,
};
pub use recall::{ActorKind, Initiator, ProductRecall, RecallDraft};
pub use record::TransitionRecord;
pub use requests::{
    ApproveRecallRequest, CreateAlertRequest, CreateRecallRequest, RecordProcessRequest,
    UpdateAlertStatusRequest,
};
