//! Approval gate: the two-phase human confirmation before publishing.
//!
//! The first invocation registers a [`ConfirmationRequest`] on the host's
//! [`ToolContext`] and reports `pending`. A later invocation, once the host
//! has attached the reviewer's [`ConfirmationResponse`], either publishes the
//! draft through a [`PagePublisher`] or reports the rejection.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use wikiscribe_shared::{
    ConfirmationRequest, ConfirmationResponse, Decision, PageTarget, Result, ToolResult,
    ToolStatus, WikiScribeError,
};
use wikiscribe_wiki::{UpsertedPage, WikiApi, WikiPublisher, failure_message};

/// Message reported while the reviewer has not answered yet.
pub const PENDING_MESSAGE: &str = "Waiting for user confirmation";

// ---------------------------------------------------------------------------
// Host seams
// ---------------------------------------------------------------------------

/// The slice of the agent runtime the gate talks to.
pub trait ToolContext {
    /// The reviewer's answer, if one has been attached for this call.
    fn tool_confirmation(&self) -> Option<&ConfirmationResponse>;

    /// Register (or re-register) the outstanding confirmation request.
    fn request_confirmation(&mut self, request: ConfirmationRequest);
}

/// Publishes an approved draft.
#[async_trait]
pub trait PagePublisher: Send + Sync {
    async fn publish(&self, target: &PageTarget, draft: &str) -> Result<UpsertedPage>;
}

#[async_trait]
impl<W: WikiApi> PagePublisher for WikiPublisher<W> {
    async fn publish(&self, target: &PageTarget, draft: &str) -> Result<UpsertedPage> {
        self.try_upsert_page(&target.space_key, &target.title, draft)
            .await
    }
}

/// A [`ToolContext`] held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    confirmation: Option<ConfirmationResponse>,
    requested: Vec<ConfirmationRequest>,
}

impl MemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that already carries the reviewer's answer.
    pub fn with_confirmation(response: ConfirmationResponse) -> Self {
        Self {
            confirmation: Some(response),
            requested: Vec::new(),
        }
    }

    /// Attach the reviewer's answer.
    pub fn confirm(&mut self, response: ConfirmationResponse) {
        self.confirmation = Some(response);
    }

    /// Every request registered so far, oldest first.
    pub fn requests(&self) -> &[ConfirmationRequest] {
        &self.requested
    }
}

impl ToolContext for MemoryContext {
    fn tool_confirmation(&self) -> Option<&ConfirmationResponse> {
        self.confirmation.as_ref()
    }

    fn request_confirmation(&mut self, request: ConfirmationRequest) {
        self.requested.push(request);
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// What one gate invocation decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// A request is outstanding.
    Pending,
    /// The draft was published; carries the success message.
    Approved(String),
    /// The reviewer declined; carries their feedback verbatim.
    Rejected(String),
    /// Validation or publish failure; carries the message.
    Error(String),
}

impl GateOutcome {
    pub fn status(&self) -> ToolStatus {
        match self {
            Self::Pending => ToolStatus::Pending,
            Self::Approved(_) => ToolStatus::Success,
            Self::Rejected(_) => ToolStatus::Rejected,
            Self::Error(_) => ToolStatus::Error,
        }
    }

    pub fn into_tool_result(self) -> ToolResult {
        let status = self.status();
        let message = match self {
            Self::Pending => PENDING_MESSAGE.to_string(),
            Self::Approved(message) | Self::Error(message) => message,
            Self::Rejected(feedback) => format!("Draft rejected by user. Feedback: {feedback}"),
        };
        ToolResult::new(status, message)
    }
}

/// Request confirmation for `draft`, or act on the answer already attached.
///
/// Never publishes on the call that registers the request.
#[instrument(skip_all, fields(draft_len = draft.len()))]
pub async fn request_or_resolve(
    ctx: &mut dyn ToolContext,
    publisher: &dyn PagePublisher,
    draft: &str,
) -> GateOutcome {
    let Some(response) = ctx.tool_confirmation() else {
        ctx.request_confirmation(ConfirmationRequest::for_draft());
        info!("confirmation requested");
        return GateOutcome::Pending;
    };

    let payload = &response.payload;
    match payload.decision() {
        Ok(Decision::Reject { feedback }) => {
            info!(approve = %payload.approve, "draft rejected");
            GateOutcome::Rejected(feedback)
        }
        Err(e) => {
            warn!(
                title = %payload.title,
                space_key = %payload.space_key,
                "approval without publish target"
            );
            GateOutcome::Error(validation_message(e))
        }
        Ok(Decision::Approve { target }) => {
            info!(space_key = %target.space_key, title = %target.title, "draft approved");
            match publisher.publish(&target, draft).await {
                Ok(page) => {
                    info!(page_id = %page.page_id, url = %page.url, "publish succeeded");
                    GateOutcome::Approved(page.success_message())
                }
                Err(e) => {
                    warn!(error = %e, "publish failed");
                    GateOutcome::Error(failure_message(&e))
                }
            }
        }
    }
}

/// [`request_or_resolve`] encoded as the JSON tool result.
pub async fn ask_human_approval(
    ctx: &mut dyn ToolContext,
    publisher: &dyn PagePublisher,
    draft: &str,
) -> String {
    request_or_resolve(ctx, publisher, draft)
        .await
        .into_tool_result()
        .to_json_string()
}

fn validation_message(error: WikiScribeError) -> String {
    match error {
        WikiScribeError::Validation { message } => message,
        other => other.to_string(),
    }
}
