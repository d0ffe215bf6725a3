//! SQL migration definitions for the WikiScribe session database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: sessions, publications",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per confirmation cycle
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY,
    draft_hash    TEXT NOT NULL,
    status        TEXT NOT NULL,
    request_json  TEXT NOT NULL,
    response_json TEXT,
    result_json   TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

-- Pages published by approved sessions
CREATE TABLE IF NOT EXISTS publications (
    id           TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    space_key    TEXT NOT NULL,
    title        TEXT NOT NULL,
    page_id      TEXT NOT NULL,
    url          TEXT NOT NULL,
    published_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_publications_session ON publications(session_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
