//! Shared types, error model, and configuration for WikiScribe.
//!
//! This crate is the foundation depended on by all other WikiScribe crates.
//! It provides:
//! - [`WikiScribeError`]: the unified error type
//! - Domain types ([`ConfirmationPayload`], [`Decision`], [`ToolResult`], [`SessionId`])
//! - Configuration ([`AppConfig`], credential resolution, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConfluenceConfig, ConfluenceCredentials, DiagramConfig, HttpConfig,
    SessionsConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_credentials, sessions_db_path,
};
pub use error::{Result, WikiScribeError};
pub use types::{
    APPROVAL_HINT, APPROVE_TOKEN, ConfirmationPayload, ConfirmationRequest,
    ConfirmationResponse, Decision, PageTarget, SessionId, ToolResult, ToolStatus, draft_hash,
};
