//! Diagram embedding and Markdown-to-wiki rendering.
//!
//! Rewrites fenced `mermaid` blocks in a draft into hosted image references,
//! then renders the whole draft to the XHTML markup the wiki stores.
//! Image tags are injected *before* rendering, so they pass through the
//! renderer as raw HTML.

mod diagram;
mod shortener;

use std::time::Duration;

use pulldown_cmark::{Options, Parser, html};
use tracing::{debug, instrument, warn};

use wikiscribe_shared::{DiagramConfig, HttpConfig, Result};

pub use diagram::{
    DIAGRAM_ALT_TEXT, DiagramBlock, diagram_url, encode_diagram, find_diagram_blocks, image_tag,
};
pub use shortener::{LinkShortener, ShortenedUrl};

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Converts drafts into wiki markup with diagrams embedded as images.
#[derive(Debug, Clone)]
pub struct DiagramPublisher {
    render_host: String,
    shortener: Option<LinkShortener>,
}

impl DiagramPublisher {
    /// Create a publisher for `render_host` without link shortening.
    pub fn new(render_host: impl Into<String>) -> Self {
        Self {
            render_host: render_host.into(),
            shortener: None,
        }
    }

    /// Shorten diagram URLs through `shortener` before embedding them.
    #[must_use]
    pub fn with_shortener(mut self, shortener: LinkShortener) -> Self {
        self.shortener = Some(shortener);
        self
    }

    /// Build a publisher from the `[diagrams]` and `[http]` config sections.
    pub fn from_config(diagrams: &DiagramConfig, http: &HttpConfig) -> Result<Self> {
        let publisher = Self::new(diagrams.render_host.clone());
        if !diagrams.shorten {
            return Ok(publisher);
        }
        let shortener = LinkShortener::new(
            &diagrams.shortener_host,
            Duration::from_secs(http.timeout_secs),
        )?;
        Ok(publisher.with_shortener(shortener))
    }

    /// Replace every diagram block with a hosted image, then render to markup.
    ///
    /// Never fails: a block whose URL cannot be encoded gets an empty `src`,
    /// and shortening failures fall back to the long URL.
    #[instrument(skip_all, fields(len = markdown.len()))]
    pub async fn embed_diagrams(&self, markdown: &str) -> String {
        let blocks = find_diagram_blocks(markdown);
        let mut tags = Vec::with_capacity(blocks.len());

        for block in &blocks {
            let url = self.block_url(block);
            let url = match (&self.shortener, url.is_empty()) {
                (Some(shortener), false) => shortener.shorten(&url).await.into_url(),
                _ => url,
            };
            tags.push(diagram::block_replacement(&url));
        }

        debug!(diagrams = blocks.len(), "diagram blocks replaced");
        render_markdown(&diagram::splice_blocks(markdown, &blocks, &tags))
    }

    /// Like [`embed_diagrams`](Self::embed_diagrams) but never contacts the
    /// shortener. Used for dry runs.
    pub fn render_preview(&self, markdown: &str) -> String {
        let blocks = find_diagram_blocks(markdown);
        let tags: Vec<String> = blocks
            .iter()
            .map(|block| diagram::block_replacement(&self.block_url(block)))
            .collect();
        render_markdown(&diagram::splice_blocks(markdown, &blocks, &tags))
    }

    fn block_url(&self, block: &DiagramBlock) -> String {
        diagram_url(&self.render_host, &block.source).unwrap_or_else(|e| {
            warn!(error = %e, start = block.range.start, "diagram encoding failed, embedding empty image");
            String::new()
        })
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render Markdown to HTML/XHTML markup.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
