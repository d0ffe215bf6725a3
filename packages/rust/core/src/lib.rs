//! Approval gate and review-cycle orchestration for WikiScribe.
//!
//! [`gate`] is the two-phase confirmation handshake in front of the wiki
//! publisher; [`session`] persists a handshake between invocations.

pub mod gate;
pub mod session;

pub use gate::{
    GateOutcome, MemoryContext, PENDING_MESSAGE, PagePublisher, ToolContext, ask_human_approval,
    request_or_resolve,
};
pub use session::{ProgressReporter, Review, SilentProgress, record_response, review_draft};
