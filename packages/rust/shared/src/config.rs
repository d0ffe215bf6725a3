//! Application configuration for WikiScribe.
//!
//! User config lives at `~/.wikiscribe/wikiscribe.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it only names the env vars that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WikiScribeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "wikiscribe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".wikiscribe";

/// Default session database file name, placed in the config directory.
const SESSIONS_DB_NAME: &str = "sessions.db";

// ---------------------------------------------------------------------------
// Config structs (matching wikiscribe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Confluence connection settings.
    #[serde(default)]
    pub confluence: ConfluenceConfig,

    /// Diagram rendering and link shortening.
    #[serde(default)]
    pub diagrams: DiagramConfig,

    /// Outbound HTTP settings shared by all clients.
    #[serde(default)]
    pub http: HttpConfig,

    /// Confirmation session persistence.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// `[confluence]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// Site root, e.g. `https://acme.atlassian.net`.
    #[serde(default)]
    pub domain: String,

    /// Name of the env var holding the account email.
    #[serde(default = "default_email_env")]
    pub email_env: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            email_env: default_email_env(),
            api_token_env: default_api_token_env(),
        }
    }
}

fn default_email_env() -> String {
    "CONFLUENCE_EMAIL".into()
}
fn default_api_token_env() -> String {
    "CONFLUENCE_API_KEY".into()
}

/// `[diagrams]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramConfig {
    /// Diagram render service; images are served from `<render_host>/mermaid/png/...`.
    #[serde(default = "default_render_host")]
    pub render_host: String,

    /// Link shortener exposing `GET /api-create.php?url=...`.
    #[serde(default = "default_shortener_host")]
    pub shortener_host: String,

    /// Whether to shorten diagram URLs before embedding them.
    #[serde(default = "default_true")]
    pub shorten: bool,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            render_host: default_render_host(),
            shortener_host: default_shortener_host(),
            shorten: true,
        }
    }
}

fn default_render_host() -> String {
    "https://kroki.io".into()
}
fn default_shortener_host() -> String {
    "https://tinyurl.com".into()
}
fn default_true() -> bool {
    true
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// `[sessions]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Session database path. Defaults to `~/.wikiscribe/sessions.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Credentials (runtime, resolved from config + environment)
// ---------------------------------------------------------------------------

/// Resolved Confluence credentials.
#[derive(Clone)]
pub struct ConfluenceCredentials {
    /// Site root without a trailing slash.
    pub domain: String,
    /// Account email used for basic auth.
    pub email: String,
    /// API token used for basic auth.
    pub api_token: String,
}

impl std::fmt::Debug for ConfluenceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceCredentials")
            .field("domain", &self.domain)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Resolve Confluence credentials from the config and the named env vars.
pub fn resolve_credentials(config: &AppConfig) -> Result<ConfluenceCredentials> {
    let domain = config.confluence.domain.trim().trim_end_matches('/');
    if domain.is_empty() {
        return Err(WikiScribeError::config(
            "confluence.domain is not set. Run `wikiscribe config init` and edit the file.",
        ));
    }
    url::Url::parse(domain)
        .map_err(|e| WikiScribeError::config(format!("invalid confluence.domain '{domain}': {e}")))?;

    let email = read_env(&config.confluence.email_env)?;
    let api_token = read_env(&config.confluence.api_token_env)?;

    Ok(ConfluenceCredentials {
        domain: domain.to_string(),
        email,
        api_token,
    })
}

fn read_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(WikiScribeError::config(format!(
            "Confluence credential not found. Set the {var_name} environment variable."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.wikiscribe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WikiScribeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.wikiscribe/wikiscribe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the session database path: the configured one, or the default under the config dir.
pub fn sessions_db_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.sessions.db_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join(SESSIONS_DB_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WikiScribeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        WikiScribeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| WikiScribeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| WikiScribeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| WikiScribeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("render_host"));
        assert!(toml_str.contains("CONFLUENCE_API_KEY"));
        assert!(!toml_str.contains("db_path"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[confluence]
domain = "https://acme.atlassian.net"

[http]
timeout_secs = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.confluence.domain, "https://acme.atlassian.net");
        assert_eq!(config.confluence.email_env, "CONFLUENCE_EMAIL");
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.diagrams.render_host, "https://kroki.io");
        assert_eq!(config.diagrams.shortener_host, "https://tinyurl.com");
        assert!(config.diagrams.shorten);
    }

    #[test]
    fn sessions_path_prefers_configured_value() {
        let mut config = AppConfig::default();
        config.sessions.db_path = Some("/tmp/ws-sessions.db".into());
        assert_eq!(
            sessions_db_path(&config).unwrap(),
            PathBuf::from("/tmp/ws-sessions.db")
        );
    }

    #[test]
    fn credentials_require_domain() {
        let config = AppConfig::default();
        let err = resolve_credentials(&config).unwrap_err();
        assert!(err.to_string().contains("confluence.domain"));
    }

    #[test]
    fn credentials_require_env_vars() {
        let mut config = AppConfig::default();
        config.confluence.domain = "https://acme.atlassian.net/".into();
        // Use unique env var names to avoid interfering with other tests
        config.confluence.email_env = "WS_TEST_NONEXISTENT_EMAIL_12345".into();
        config.confluence.api_token_env = "WS_TEST_NONEXISTENT_TOKEN_12345".into();
        let err = resolve_credentials(&config).unwrap_err();
        assert!(err.to_string().contains("WS_TEST_NONEXISTENT_EMAIL_12345"));
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let creds = ConfluenceCredentials {
            domain: "https://acme.atlassian.net".into(),
            email: "dev@acme.test".into(),
            api_token: "super-secret".into(),
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
