//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use wikiscribe_core::{PagePublisher, ProgressReporter, Review, record_response, review_draft};
use wikiscribe_markdown::{DiagramPublisher, find_diagram_blocks};
use wikiscribe_shared::{
    AppConfig, ConfirmationPayload, PageTarget, SessionId, WikiScribeError, init_config,
    load_config, resolve_credentials, sessions_db_path,
};
use wikiscribe_storage::Storage;
use wikiscribe_wiki::{ConfluenceClient, UpsertedPage, WikiPublisher};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// WikiScribe: publish reviewed Markdown drafts to Confluence.
#[derive(Parser)]
#[command(
    name = "wikiscribe",
    version,
    about = "Publish Markdown drafts to Confluence after explicit human approval.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Open a draft for review, or resolve an existing review session.
    Review {
        /// Path to the Markdown draft.
        draft: PathBuf,

        /// Session to resume (omit to open a new one).
        #[arg(long)]
        session: Option<String>,
    },

    /// Record the reviewer's answer on a pending session.
    Respond {
        /// Session to answer.
        #[arg(long)]
        session: String,

        /// APPROVE to publish; anything else rejects.
        #[arg(long)]
        approve: String,

        /// Target page title (required to publish).
        #[arg(long, default_value = "")]
        title: String,

        /// Target space key (required to publish).
        #[arg(long, default_value = "")]
        space_key: String,

        /// Feedback for the author.
        #[arg(long, default_value = "")]
        feedback: String,
    },

    /// Print the wiki markup a draft would be published as (dry run).
    Render {
        /// Path to the Markdown draft.
        draft: PathBuf,

        /// Shorten diagram URLs through the configured shortener.
        #[arg(long)]
        shorten: bool,
    },

    /// List review sessions and their status.
    Sessions,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "wikiscribe=info",
        1 => "wikiscribe=debug",
        _ => "wikiscribe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr; stdout carries tool results and markup.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Review { draft, session } => cmd_review(&draft, session.as_deref()).await,
        Command::Respond {
            session,
            approve,
            title,
            space_key,
            feedback,
        } => {
            let payload = ConfirmationPayload {
                approve,
                title,
                space_key,
                feedback,
            };
            cmd_respond(&session, payload).await
        }
        Command::Render { draft, shorten } => cmd_render(&draft, shorten).await,
        Command::Sessions => cmd_sessions().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// review / respond
// ---------------------------------------------------------------------------

fn read_draft(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read draft {}", path.display()))
}

fn parse_session(id: &str) -> Result<SessionId> {
    id.parse()
        .map_err(|e| eyre!("invalid session id '{id}': {e}"))
}

fn build_publisher(config: &AppConfig) -> Result<WikiPublisher<ConfluenceClient>> {
    let credentials = resolve_credentials(config)?;
    let timeout = Duration::from_secs(config.http.timeout_secs);
    let client = ConfluenceClient::new(&credentials, timeout)?;
    let diagrams = DiagramPublisher::from_config(&config.diagrams, &config.http)?;
    Ok(WikiPublisher::new(client, diagrams))
}

/// Stands in for the wiki when no approval is waiting to be published.
struct Unconfigured;

#[async_trait]
impl PagePublisher for Unconfigured {
    async fn publish(&self, _target: &PageTarget, _draft: &str) -> wikiscribe_shared::Result<UpsertedPage> {
        Err(WikiScribeError::config("Confluence credentials were not loaded"))
    }
}

async fn cmd_review(draft_path: &Path, session: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let draft = read_draft(draft_path)?;
    let storage = Storage::open(&sessions_db_path(&config)?).await?;
    let session = session.map(parse_session).transpose()?;

    // Credentials are only needed when this call can publish. Finished or
    // claimed sessions fall through to the session error from `review_draft`.
    let mut awaiting_publish = false;
    if let Some(id) = &session {
        if let Some(record) = storage.get_session(id).await? {
            awaiting_publish = record.awaits_publish();
        }
    }

    let wiki;
    let publisher: &dyn PagePublisher = if awaiting_publish {
        wiki = build_publisher(&config)?;
        &wiki
    } else {
        &Unconfigured
    };

    info!(draft = %draft_path.display(), "reviewing draft");
    let progress = CliProgress::new();
    let review = review_draft(&storage, publisher, &draft, session.as_ref(), &progress).await;
    progress.spinner.finish_and_clear();
    let review = review?;

    println!("{}", review.result.to_json_string());
    if let Some(request) = &review.request {
        eprintln!();
        eprintln!("  Confirmation requested (session {})", review.session_id);
        eprintln!("  {}", request.hint);
        eprintln!(
            "  Answer with: wikiscribe respond --session {} --approve APPROVE --space-key <KEY> --title <TITLE>",
            review.session_id
        );
        eprintln!(
            "  Then run:    wikiscribe review {} --session {}",
            draft_path.display(),
            review.session_id
        );
        eprintln!();
        eprintln!("{}", serde_json::to_string_pretty(request)?);
    }
    Ok(())
}

async fn cmd_respond(session: &str, payload: ConfirmationPayload) -> Result<()> {
    let config = load_config()?;
    let id = parse_session(session)?;
    let storage = Storage::open(&sessions_db_path(&config)?).await?;

    record_response(&storage, &id, payload).await?;
    println!("Response recorded for session {id}.");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _review: &Review) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// render / sessions / config
// ---------------------------------------------------------------------------

async fn cmd_render(draft_path: &Path, shorten: bool) -> Result<()> {
    let config = load_config()?;
    let draft = read_draft(draft_path)?;

    let blocks = find_diagram_blocks(&draft);
    info!(diagrams = blocks.len(), "rendering draft");
    for block in &blocks {
        tracing::debug!(start = block.range.start, end = block.range.end, "diagram block");
    }

    let markup = if shorten {
        let mut diagrams = config.diagrams.clone();
        diagrams.shorten = true;
        DiagramPublisher::from_config(&diagrams, &config.http)?
            .embed_diagrams(&draft)
            .await
    } else {
        DiagramPublisher::new(config.diagrams.render_host.clone()).render_preview(&draft)
    };

    println!("{markup}");
    Ok(())
}

async fn cmd_sessions() -> Result<()> {
    let config = load_config()?;
    let db_path = sessions_db_path(&config)?;
    if !db_path.exists() {
        println!("No review sessions yet.");
        return Ok(());
    }

    let storage = Storage::open_readonly(&db_path).await?;
    let sessions = storage.list_sessions().await?;
    if sessions.is_empty() {
        println!("No review sessions yet.");
        return Ok(());
    }

    println!("{:<38} {:<9} {:<22} TARGET", "SESSION", "STATUS", "UPDATED");
    for session in sessions {
        let target = session
            .response
            .as_ref()
            .filter(|r| r.payload.is_approval())
            .map(|r| format!("{}/{}", r.payload.space_key.trim(), r.payload.title.trim()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<9} {:<22} {target}",
            session.id.to_string(),
            session.status.as_str(),
            session.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    match resolve_credentials(&config) {
        Ok(credentials) => println!("# credentials: {credentials:?}"),
        Err(e) => println!("# credentials: {e}"),
    }
    Ok(())
}
