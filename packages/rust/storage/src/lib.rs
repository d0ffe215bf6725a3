//! libSQL session store for confirmation cycles.
//!
//! The [`Storage`] struct wraps a local libSQL database that persists each
//! confirmation handshake between the two gate invocations: the registered
//! request, the reviewer's response, and the final tool result. Pages
//! published by approved sessions are logged alongside.
//!
//! **Lifecycle:** `pending` → `resolving` → `approved` | `rejected` | `failed`.
//! Only pending sessions accept a response. A review claims an answered
//! session by moving it to `resolving` before acting on the answer, so at
//! most one review ever resolves it.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use wikiscribe_shared::{
    ConfirmationRequest, ConfirmationResponse, Result, SessionId, ToolResult, WikiScribeError,
};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Persisted state of a confirmation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    /// Claimed by a review that is acting on the recorded answer.
    Resolving,
    Approved,
    Rejected,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Failed)
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = WikiScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolving" => Ok(Self::Resolving),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            other => Err(WikiScribeError::Storage(format!(
                "unknown session status '{other}'"
            ))),
        }
    }
}

/// A stored confirmation session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    /// SHA-256 of the draft the request was registered for.
    pub draft_hash: String,
    pub status: SessionStatus,
    pub request: ConfirmationRequest,
    pub response: Option<ConfirmationResponse>,
    pub result: Option<ToolResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether resuming this session would publish: it is still pending and
    /// the recorded answer is an approval.
    pub fn awaits_publish(&self) -> bool {
        self.status == SessionStatus::Pending
            && self
                .response
                .as_ref()
                .is_some_and(|r| r.payload.is_approval())
    }
}

/// A page published by an approved session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationRecord {
    pub session_id: String,
    pub space_key: String,
    pub title: String,
    pub page_id: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> WikiScribeError {
    WikiScribeError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WikiScribeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for listing sessions).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        WikiScribeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(WikiScribeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session operations
    // -----------------------------------------------------------------------

    /// Insert a new pending session with its registered request.
    pub async fn insert_session(
        &self,
        id: &SessionId,
        draft_hash: &str,
        request: &ConfirmationRequest,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let request_json = serde_json::to_string(request).map_err(storage_err)?;
        self.conn
            .execute(
                "INSERT INTO sessions (id, draft_hash, status, request_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    draft_hash,
                    SessionStatus::Pending.as_str(),
                    request_json,
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Re-register the request of a pending session (idempotent).
    pub async fn register_request(&self, id: &SessionId, request: &ConfirmationRequest) -> Result<()> {
        self.check_writable()?;
        let request_json = serde_json::to_string(request).map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE sessions SET request_json = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![request_json, now.as_str(), id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        self.expect_pending_change(id, changed).await
    }

    /// Record the reviewer's response on a pending session.
    pub async fn record_response(
        &self,
        id: &SessionId,
        response: &ConfirmationResponse,
    ) -> Result<()> {
        self.check_writable()?;
        let response_json = serde_json::to_string(response).map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE sessions SET response_json = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![response_json, now.as_str(), id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        self.expect_pending_change(id, changed).await
    }

    /// Claim an answered pending session for resolution.
    ///
    /// Fails if the session has no recorded answer or is no longer pending,
    /// including when another review claimed it first.
    pub async fn begin_resolution(&self, id: &SessionId) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE sessions SET status = 'resolving', updated_at = ?1
                 WHERE id = ?2 AND status = 'pending' AND response_json IS NOT NULL",
                params![now.as_str(), id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        if changed > 0 {
            return Ok(());
        }
        match self.get_session(id).await? {
            Some(session) if session.status == SessionStatus::Pending => Err(
                WikiScribeError::session(format!("session {id} has no recorded response")),
            ),
            _ => self.expect_pending_change(id, 0).await,
        }
    }

    /// Move a pending or claimed session to a terminal status with its final result.
    pub async fn complete_session(
        &self,
        id: &SessionId,
        status: SessionStatus,
        result: &ToolResult,
    ) -> Result<()> {
        self.check_writable()?;
        if !status.is_terminal() {
            return Err(WikiScribeError::session(
                "a session can only be completed with a terminal status",
            ));
        }
        let result_json = serde_json::to_string(result).map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE sessions SET status = ?1, result_json = ?2, updated_at = ?3
                 WHERE id = ?4 AND status IN ('pending', 'resolving')",
                params![status.as_str(), result_json, now.as_str(), id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        self.expect_pending_change(id, changed).await
    }

    /// Get a session by ID.
    pub async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, draft_hash, status, request_json, response_json, result_json, created_at, updated_at
                 FROM sessions WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_session(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List all sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, draft_hash, status, request_json, response_json, result_json, created_at, updated_at
                 FROM sessions ORDER BY id DESC",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_session(&row)?);
        }
        Ok(results)
    }

    /// Turn a zero-row update into a not-found or already-resolved error.
    async fn expect_pending_change(&self, id: &SessionId, changed: u64) -> Result<()> {
        if changed > 0 {
            return Ok(());
        }
        match self.get_session(id).await? {
            None => Err(WikiScribeError::session(format!("session {id} not found"))),
            Some(session) => Err(WikiScribeError::session(format!(
                "session {id} is already {}",
                session.status.as_str()
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Publication log
    // -----------------------------------------------------------------------

    /// Log a page published by a session.
    pub async fn insert_publication(&self, publication: &PublicationRecord) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO publications (id, session_id, space_key, title, page_id, url, published_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    publication.session_id.as_str(),
                    publication.space_key.as_str(),
                    publication.title.as_str(),
                    publication.page_id.as_str(),
                    publication.url.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Publications of a session, oldest first.
    pub async fn list_publications(&self, session_id: &SessionId) -> Result<Vec<PublicationRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT session_id, space_key, title, page_id, url
                 FROM publications WHERE session_id = ?1 ORDER BY id",
                params![session_id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(PublicationRecord {
                session_id: row.get::<String>(0).map_err(storage_err)?,
                space_key: row.get::<String>(1).map_err(storage_err)?,
                title: row.get::<String>(2).map_err(storage_err)?,
                page_id: row.get::<String>(3).map_err(storage_err)?,
                url: row.get::<String>(4).map_err(storage_err)?,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WikiScribeError::Storage(format!("invalid date: {e}")))
}

fn parse_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| WikiScribeError::Storage(format!("invalid stored JSON: {e}")))
}

/// Convert a database row to a [`SessionRecord`].
fn row_to_session(row: &libsql::Row) -> Result<SessionRecord> {
    let id: String = row.get(0).map_err(storage_err)?;
    let status: String = row.get(2).map_err(storage_err)?;
    let request_json: String = row.get(3).map_err(storage_err)?;
    let created_at: String = row.get(6).map_err(storage_err)?;
    let updated_at: String = row.get(7).map_err(storage_err)?;

    Ok(SessionRecord {
        id: id
            .parse()
            .map_err(|e| WikiScribeError::Storage(format!("invalid session id: {e}")))?,
        draft_hash: row.get::<String>(1).map_err(storage_err)?,
        status: status.parse()?,
        request: parse_json(&request_json)?,
        response: row
            .get::<String>(4)
            .ok()
            .map(|s| parse_json(&s))
            .transpose()?,
        result: row
            .get::<String>(5)
            .ok()
            .map(|s| parse_json(&s))
            .transpose()?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikiscribe_shared::{ConfirmationPayload, ToolStatus};

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ws_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn approval() -> ConfirmationResponse {
        ConfirmationResponse {
            payload: ConfirmationPayload {
                approve: "APPROVE".into(),
                title: "Doc1".into(),
                space_key: "ENG".into(),
                feedback: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ws_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let storage = test_storage().await;
        let id = SessionId::new();
        let request = ConfirmationRequest::for_draft();

        storage.insert_session(&id, "abc123", &request).await.unwrap();
        let session = storage.get_session(&id).await.unwrap().expect("session");
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.request, request);
        assert_eq!(session.draft_hash, "abc123");
        assert!(session.response.is_none());

        storage.register_request(&id, &request).await.unwrap();
        storage.record_response(&id, &approval()).await.unwrap();
        let session = storage.get_session(&id).await.unwrap().unwrap();
        assert_eq!(session.response, Some(approval()));

        let result = ToolResult::new(ToolStatus::Success, "published");
        storage
            .complete_session(&id, SessionStatus::Approved, &result)
            .await
            .unwrap();
        let session = storage.get_session(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Approved);
        assert_eq!(session.result, Some(result));
    }

    #[tokio::test]
    async fn resolved_sessions_are_frozen() {
        let storage = test_storage().await;
        let id = SessionId::new();
        storage
            .insert_session(&id, "h", &ConfirmationRequest::for_draft())
            .await
            .unwrap();
        storage
            .complete_session(
                &id,
                SessionStatus::Rejected,
                &ToolResult::new(ToolStatus::Rejected, "no"),
            )
            .await
            .unwrap();

        let err = storage.record_response(&id, &approval()).await.unwrap_err();
        assert!(err.to_string().contains("already rejected"));

        let err = storage
            .complete_session(&id, SessionStatus::Approved, &ToolResult::new(ToolStatus::Success, "x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already rejected"));
    }

    #[tokio::test]
    async fn resolution_claim_is_exclusive() {
        let storage = test_storage().await;
        let id = SessionId::new();
        storage
            .insert_session(&id, "h", &ConfirmationRequest::for_draft())
            .await
            .unwrap();

        let err = storage.begin_resolution(&id).await.unwrap_err();
        assert!(err.to_string().contains("no recorded response"));

        storage.record_response(&id, &approval()).await.unwrap();
        storage.begin_resolution(&id).await.unwrap();
        let session = storage.get_session(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Resolving);
        assert!(!session.awaits_publish());

        let err = storage.begin_resolution(&id).await.unwrap_err();
        assert!(err.to_string().contains("already resolving"));
        let err = storage.record_response(&id, &approval()).await.unwrap_err();
        assert!(err.to_string().contains("already resolving"));

        storage
            .complete_session(&id, SessionStatus::Approved, &ToolResult::new(ToolStatus::Success, "ok"))
            .await
            .unwrap();
        let session = storage.get_session(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Approved);
    }

    #[tokio::test]
    async fn awaits_publish_only_for_pending_approvals() {
        let storage = test_storage().await;
        let id = SessionId::new();
        storage
            .insert_session(&id, "h", &ConfirmationRequest::for_draft())
            .await
            .unwrap();
        let session = storage.get_session(&id).await.unwrap().unwrap();
        assert!(!session.awaits_publish());

        storage.record_response(&id, &approval()).await.unwrap();
        let session = storage.get_session(&id).await.unwrap().unwrap();
        assert!(session.awaits_publish());

        storage
            .complete_session(&id, SessionStatus::Approved, &ToolResult::new(ToolStatus::Success, "ok"))
            .await
            .unwrap();
        let session = storage.get_session(&id).await.unwrap().unwrap();
        assert!(!session.awaits_publish());
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let storage = test_storage().await;
        let err = storage
            .record_response(&SessionId::new(), &approval())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn pending_is_not_a_completion_status() {
        let storage = test_storage().await;
        let id = SessionId::new();
        storage
            .insert_session(&id, "h", &ConfirmationRequest::for_draft())
            .await
            .unwrap();
        for status in [SessionStatus::Pending, SessionStatus::Resolving] {
            let result = storage
                .complete_session(&id, status, &ToolResult::new(ToolStatus::Pending, "x"))
                .await;
            assert!(result.is_err());
        }
    }

    #[tokio::test]
    async fn list_sessions_newest_first() {
        let storage = test_storage().await;
        let first = SessionId::new();
        let second = SessionId::new();
        for id in [&first, &second] {
            storage
                .insert_session(id, "h", &ConfirmationRequest::for_draft())
                .await
                .unwrap();
        }
        let sessions = storage.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, second);
        assert_eq!(sessions[1].id, first);
    }

    #[tokio::test]
    async fn publication_log() {
        let storage = test_storage().await;
        let id = SessionId::new();
        storage
            .insert_session(&id, "h", &ConfirmationRequest::for_draft())
            .await
            .unwrap();

        let publication = PublicationRecord {
            session_id: id.to_string(),
            space_key: "ENG".into(),
            title: "Doc1".into(),
            page_id: "1001".into(),
            url: "https://acme.atlassian.net/wiki/spaces/ENG/pages/1001".into(),
        };
        storage.insert_publication(&publication).await.unwrap();

        let logged = storage.list_publications(&id).await.unwrap();
        assert_eq!(logged, vec![publication]);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ws_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_session(&SessionId::new(), "h", &ConfirmationRequest::for_draft())
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_sessions().await.unwrap().len(), 1);
        let result = ro
            .insert_session(&SessionId::new(), "h", &ConfirmationRequest::for_draft())
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
