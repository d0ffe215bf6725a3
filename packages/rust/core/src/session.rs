//! Persisted review cycles: the host side of the approval handshake.
//!
//! Between the two gate invocations control returns to the caller; the
//! outstanding request, the reviewer's answer and the final result live in
//! the session store. A session is pinned to the hash of the draft it was
//! opened for. A review claims an answered session before acting on the
//! answer, so the page is written at most once per session.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use wikiscribe_shared::{
    ConfirmationPayload, ConfirmationRequest, ConfirmationResponse, PageTarget, Result,
    SessionId, ToolResult, WikiScribeError, draft_hash,
};
use wikiscribe_storage::{PublicationRecord, SessionStatus, Storage};
use wikiscribe_wiki::UpsertedPage;

use crate::gate::{GateOutcome, PagePublisher, ToolContext, request_or_resolve};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for long-running review steps.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the review step completes.
    fn done(&self, review: &Review);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _review: &Review) {}
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// Result of one `review` step.
#[derive(Debug, Clone)]
pub struct Review {
    pub session_id: SessionId,
    pub result: ToolResult,
    /// The outstanding request while the session is pending.
    pub request: Option<ConfirmationRequest>,
    /// The page written when the session was approved.
    pub published: Option<UpsertedPage>,
}

/// A [`ToolContext`] backed by a stored session.
struct SessionContext {
    confirmation: Option<ConfirmationResponse>,
    requested: Option<ConfirmationRequest>,
}

impl ToolContext for SessionContext {
    fn tool_confirmation(&self) -> Option<&ConfirmationResponse> {
        self.confirmation.as_ref()
    }

    fn request_confirmation(&mut self, request: ConfirmationRequest) {
        self.requested = Some(request);
    }
}

/// Wraps a publisher to keep hold of the page it wrote.
struct CapturingPublisher<'a> {
    inner: &'a dyn PagePublisher,
    published: Mutex<Option<UpsertedPage>>,
}

#[async_trait]
impl<'a> PagePublisher for CapturingPublisher<'a> {
    async fn publish(&self, target: &PageTarget, draft: &str) -> Result<UpsertedPage> {
        let page = self.inner.publish(target, draft).await?;
        if let Ok(mut slot) = self.published.lock() {
            *slot = Some(page.clone());
        }
        Ok(page)
    }
}

/// Run the gate for `draft`.
///
/// Without `session` a new cycle is opened and its request registered. With
/// `session` the stored cycle is resumed: still pending if nobody answered,
/// otherwise resolved and frozen.
#[instrument(skip_all, fields(session = ?session.map(|s| s.to_string())))]
pub async fn review_draft(
    storage: &Storage,
    publisher: &dyn PagePublisher,
    draft: &str,
    session: Option<&SessionId>,
    progress: &dyn ProgressReporter,
) -> Result<Review> {
    let hash = draft_hash(draft);

    let (session_id, confirmation) = match session {
        None => (SessionId::new(), None),
        Some(id) => {
            let record = storage
                .get_session(id)
                .await?
                .ok_or_else(|| WikiScribeError::session(format!("session {id} not found")))?;
            if record.status.is_terminal() {
                return Err(WikiScribeError::session(format!(
                    "session {id} is already {}",
                    record.status.as_str()
                )));
            }
            if record.status == SessionStatus::Resolving {
                return Err(WikiScribeError::session(format!(
                    "session {id} is being resolved by another review"
                )));
            }
            if record.draft_hash != hash {
                return Err(WikiScribeError::session(format!(
                    "draft changed since session {id} was opened"
                )));
            }
            (id.clone(), record.response)
        }
    };

    if confirmation.is_some() {
        storage.begin_resolution(&session_id).await?;
        progress.phase("Publishing draft");
    }

    let mut ctx = SessionContext {
        confirmation,
        requested: None,
    };
    let capturing = CapturingPublisher {
        inner: publisher,
        published: Mutex::new(None),
    };
    let outcome = request_or_resolve(&mut ctx, &capturing, draft).await;
    let published = capturing.published.into_inner().ok().flatten();

    if let Some(request) = &ctx.requested {
        match session {
            None => storage.insert_session(&session_id, &hash, request).await?,
            Some(id) => storage.register_request(id, request).await?,
        }
        info!(%session_id, "session awaiting confirmation");
    }

    let terminal = match &outcome {
        GateOutcome::Pending => None,
        GateOutcome::Approved(_) => Some(SessionStatus::Approved),
        GateOutcome::Rejected(_) => Some(SessionStatus::Rejected),
        GateOutcome::Error(_) => Some(SessionStatus::Failed),
    };
    let result = outcome.into_tool_result();

    if let Some(page) = &published {
        storage
            .insert_publication(&PublicationRecord {
                session_id: session_id.to_string(),
                space_key: page.space_key.clone(),
                title: page.title.clone(),
                page_id: page.page_id.clone(),
                url: page.url.clone(),
            })
            .await?;
    }

    if let Some(status) = terminal {
        storage.complete_session(&session_id, status, &result).await?;
        info!(%session_id, status = status.as_str(), "session resolved");
    }

    let review = Review {
        session_id,
        result,
        request: ctx.requested,
        published,
    };
    progress.done(&review);
    Ok(review)
}

/// Record the reviewer's answer on a pending session.
#[instrument(skip(storage, payload))]
pub async fn record_response(
    storage: &Storage,
    session: &SessionId,
    payload: ConfirmationPayload,
) -> Result<()> {
    let response = ConfirmationResponse { payload };
    if response.payload.is_approval() {
        if let Err(e) = response.payload.decision() {
            warn!(error = %e, "approval recorded without publish target");
        }
    }
    storage.record_response(session, &response).await?;
    info!(approve = %response.payload.approve, "response recorded");
    Ok(())
}
