//! Wiki page upsert: create or update a Confluence page from a Markdown draft.
//!
//! This crate provides:
//! - [`WikiApi`]: the three remote operations the upsert needs
//! - [`ConfluenceClient`]: the REST implementation
//! - [`WikiPublisher`]: embeds diagrams, renders, then creates or updates

mod confluence;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use wikiscribe_markdown::DiagramPublisher;
use wikiscribe_shared::Result;

pub use confluence::ConfluenceClient;

/// Body representation required by Confluence for page content.
pub const STORAGE_REPRESENTATION: &str = "storage";

/// Prefix of a successful upsert message.
pub const SUCCESS_GLYPH: &str = "✅";

/// Prefix of a failed upsert message.
pub const FAILURE_GLYPH: &str = "❌";

// ---------------------------------------------------------------------------
// Remote API seam
// ---------------------------------------------------------------------------

/// A page as known to the wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    /// Server-assigned identifier.
    pub id: String,
    pub title: String,
    /// Current version number; updates must send `version + 1`.
    pub version: u64,
}

/// The wiki operations used by [`WikiPublisher`].
#[async_trait]
pub trait WikiApi: Send + Sync {
    /// Find a page by space and exact title.
    async fn get_page_by_title(&self, space_key: &str, title: &str) -> Result<Option<RemotePage>>;

    /// Create a page whose body is in storage representation.
    async fn create_page(&self, space_key: &str, title: &str, body: &str) -> Result<RemotePage>;

    /// Replace the body of an existing page.
    async fn update_page(&self, page: &RemotePage, title: &str, body: &str) -> Result<RemotePage>;

    /// Human-facing URL of a page.
    fn browse_url(&self, space_key: &str, page_id: &str) -> String;
}

// ---------------------------------------------------------------------------
// Upsert
// ---------------------------------------------------------------------------

/// Whether an upsert created a new page or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

impl UpsertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertedPage {
    pub page_id: String,
    pub space_key: String,
    pub title: String,
    pub url: String,
    pub action: UpsertAction,
}

impl UpsertedPage {
    /// The success line reported back to the agent and the reviewer.
    pub fn success_message(&self) -> String {
        format!(
            "{SUCCESS_GLYPH} Success! Page '{}' {}. URL: {}",
            self.title,
            self.action.as_str(),
            self.url
        )
    }
}

/// The failure line for an upsert error.
pub fn failure_message(error: &impl std::fmt::Display) -> String {
    format!("{FAILURE_GLYPH} Error publishing to Confluence: {error}")
}

/// Publishes drafts to a wiki, embedding diagrams on the way.
pub struct WikiPublisher<W> {
    api: W,
    diagrams: DiagramPublisher,
}

impl<W: WikiApi> WikiPublisher<W> {
    pub fn new(api: W, diagrams: DiagramPublisher) -> Self {
        Self { api, diagrams }
    }

    pub fn api(&self) -> &W {
        &self.api
    }

    /// Render `content` and create or update the page `(space_key, title)`.
    #[instrument(skip(self, content), fields(content_len = content.len()))]
    pub async fn try_upsert_page(
        &self,
        space_key: &str,
        title: &str,
        content: &str,
    ) -> Result<UpsertedPage> {
        let body = self.diagrams.embed_diagrams(content).await;

        let (page, action) = match self.api.get_page_by_title(space_key, title).await? {
            Some(existing) => (
                self.api.update_page(&existing, title, &body).await?,
                UpsertAction::Updated,
            ),
            None => (
                self.api.create_page(space_key, title, &body).await?,
                UpsertAction::Created,
            ),
        };

        let upserted = UpsertedPage {
            url: self.api.browse_url(space_key, &page.id),
            page_id: page.id,
            space_key: space_key.to_string(),
            title: title.to_string(),
            action,
        };
        info!(page_id = %upserted.page_id, action = action.as_str(), "page published");
        Ok(upserted)
    }

    /// Message-returning form of [`try_upsert_page`](Self::try_upsert_page):
    /// never errors, the outcome is in the glyph-prefixed text.
    pub async fn upsert_page(&self, space_key: &str, title: &str, content: &str) -> String {
        match self.try_upsert_page(space_key, title, content).await {
            Ok(page) => page.success_message(),
            Err(e) => {
                warn!(error = %e, space_key, title, "publish failed");
                failure_message(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};
    use wikiscribe_shared::ConfluenceCredentials;

    fn publisher_for(server: &MockServer) -> WikiPublisher<ConfluenceClient> {
        let creds = ConfluenceCredentials {
            domain: server.uri(),
            email: "dev@acme.test".into(),
            api_token: "token".into(),
        };
        let client = ConfluenceClient::new(&creds, Duration::from_secs(2)).unwrap();
        WikiPublisher::new(client, DiagramPublisher::new("https://kroki.io"))
    }

    async fn mount_lookup(server: &MockServer, results: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": results
            })))
            .mount(server)
            .await;
    }

    fn storage_value(request: &Request) -> String {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        body["body"]["storage"]["value"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn creates_missing_page_with_rendered_body() {
        let server = MockServer::start().await;
        mount_lookup(&server, serde_json::json!([])).await;
        Mock::given(method("POST"))
            .and(path("/wiki/rest/api/content"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1001", "title": "Doc1", "version": {"number": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = publisher_for(&server);
        let draft = "# Title\n\n```mermaid\nA-->B\n```\n\nBody text.";
        let page = publisher.try_upsert_page("ENG", "Doc1", draft).await.unwrap();

        assert_eq!(page.action, UpsertAction::Created);
        assert_eq!(page.url, format!("{}/wiki/spaces/ENG/pages/1001", server.uri()));

        let requests = server.received_requests().await.unwrap();
        let post = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
        let value = storage_value(post);
        assert_eq!(value.matches("<img").count(), 1);
        assert!(value.contains("<p>Body text.</p>"));
        assert!(value.contains("<h1>Title</h1>"));
    }

    #[tokio::test]
    async fn updates_existing_page() {
        let server = MockServer::start().await;
        mount_lookup(
            &server,
            serde_json::json!([{"id": "77", "title": "Doc1", "version": {"number": 2}}]),
        )
        .await;
        Mock::given(method("PUT"))
            .and(path("/wiki/rest/api/content/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "77", "title": "Doc1", "version": {"number": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let message = publisher_for(&server).upsert_page("ENG", "Doc1", "text").await;
        assert!(message.starts_with(SUCCESS_GLYPH));
        assert!(message.contains("Page 'Doc1' updated"));
        assert!(message.ends_with("/wiki/spaces/ENG/pages/77"));
    }

    #[tokio::test]
    async fn failure_becomes_prefixed_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let message = publisher_for(&server).upsert_page("ENG", "Doc1", "text").await;
        assert!(message.starts_with("❌ Error publishing to Confluence:"));
        assert!(message.contains("401"));
    }

    #[test]
    fn success_message_format() {
        let page = UpsertedPage {
            page_id: "5".into(),
            space_key: "ENG".into(),
            title: "Doc1".into(),
            url: "https://acme.atlassian.net/wiki/spaces/ENG/pages/5".into(),
            action: UpsertAction::Created,
        };
        assert_eq!(
            page.success_message(),
            "✅ Success! Page 'Doc1' created. URL: https://acme.atlassian.net/wiki/spaces/ENG/pages/5"
        );
    }
}
