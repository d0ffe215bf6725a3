//! Core domain types for the WikiScribe approval/publish cycle.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, WikiScribeError};

/// Hint shown to the reviewer alongside every confirmation request.
pub const APPROVAL_HINT: &str = "Please review the draft and select APPROVE or REJECT.";

/// The literal `approve` value that triggers publishing (after trim + case-fold).
pub const APPROVE_TOKEN: &str = "APPROVE";

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one confirmation cycle (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new time-sortable session identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Confirmation payload
// ---------------------------------------------------------------------------

/// The confirmation payload exchanged with the reviewer.
///
/// Requests carry it with every field empty (the schema); responses carry it
/// populated. Absent fields deserialize as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPayload {
    /// `APPROVE` to publish; anything else rejects.
    #[serde(default)]
    pub approve: String,
    /// Target page title (required on approval).
    #[serde(default)]
    pub title: String,
    /// Target space key (required on approval).
    #[serde(default)]
    pub space_key: String,
    /// Free-text feedback (meaningful on rejection).
    #[serde(default)]
    pub feedback: String,
}

/// Where an approved draft is published. Both fields are trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTarget {
    pub space_key: String,
    pub title: String,
}

/// The reviewer's decision, validated from a [`ConfirmationPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve { target: PageTarget },
    Reject { feedback: String },
}

impl ConfirmationPayload {
    /// Whether `approve` equals `APPROVE` once trimmed and upper-cased.
    pub fn is_approval(&self) -> bool {
        self.approve.trim().to_uppercase() == APPROVE_TOKEN
    }

    /// Interpret the payload.
    ///
    /// Rejections keep the feedback verbatim. Approvals without a space key
    /// or title are a validation error.
    pub fn decision(&self) -> Result<Decision> {
        if !self.is_approval() {
            return Ok(Decision::Reject {
                feedback: self.feedback.clone(),
            });
        }

        let space_key = self.space_key.trim();
        let title = self.title.trim();
        if space_key.is_empty() || title.is_empty() {
            return Err(WikiScribeError::validation(
                "Missing space_key or title for publishing.",
            ));
        }

        Ok(Decision::Approve {
            target: PageTarget {
                space_key: space_key.to_string(),
                title: title.to_string(),
            },
        })
    }
}

/// A pending human-decision record: hint plus the empty payload schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub hint: String,
    pub payload: ConfirmationPayload,
}

impl ConfirmationRequest {
    /// The request registered for every draft review. Always identical.
    pub fn for_draft() -> Self {
        Self {
            hint: APPROVAL_HINT.to_string(),
            payload: ConfirmationPayload::default(),
        }
    }
}

/// The reviewer's answer to a [`ConfirmationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub payload: ConfirmationPayload,
}

// ---------------------------------------------------------------------------
// Tool result (boundary contract with the agent runtime)
// ---------------------------------------------------------------------------

/// Status discriminator of a [`ToolResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Success,
    Error,
    Rejected,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
            Self::Rejected => "rejected",
        }
    }
}

/// What a tool hands back to the calling agent, always as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub message: String,
}

impl ToolResult {
    pub fn new(status: ToolStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Encode as the JSON text the agent runtime expects.
    pub fn to_json_string(&self) -> String {
        // Two string fields: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"status":"{}","message":""}}"#,
                self.status.as_str()
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// SHA-256 of the draft text, hex-encoded. Used to pin a draft to its session.
pub fn draft_hash(draft: &str) -> String {
    let digest = Sha256::digest(draft.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
