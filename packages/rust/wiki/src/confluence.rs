//! Confluence Cloud REST client (`/wiki/rest/api/content`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use wikiscribe_shared::{ConfluenceCredentials, Result, WikiScribeError};

use crate::{RemotePage, STORAGE_REPRESENTATION, WikiApi};

/// User-Agent string for wiki requests.
const USER_AGENT: &str = concat!("WikiScribe/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body carried into [`WikiScribeError::Wiki`].
const MAX_ERROR_BODY_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ContentList {
    #[serde(default)]
    results: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    id: String,
    title: String,
    #[serde(default)]
    version: Option<ContentVersion>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentVersion {
    number: u64,
}

#[derive(Debug, Serialize)]
struct SpaceRef<'a> {
    key: &'a str,
}

#[derive(Debug, Serialize)]
struct StorageValue<'a> {
    value: &'a str,
    representation: &'static str,
}

#[derive(Debug, Serialize)]
struct Body<'a> {
    storage: StorageValue<'a>,
}

#[derive(Debug, Serialize)]
struct CreateContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    space: SpaceRef<'a>,
    body: Body<'a>,
}

#[derive(Debug, Serialize)]
struct UpdateContent<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    body: Body<'a>,
    version: ContentVersion,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl From<Content> for RemotePage {
    fn from(content: Content) -> Self {
        Self {
            id: content.id,
            title: content.title,
            version: content.version.map(|v| v.number).unwrap_or(1),
        }
    }
}

fn storage_body(body: &str) -> Body<'_> {
    Body {
        storage: StorageValue {
            value: body,
            representation: STORAGE_REPRESENTATION,
        },
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Confluence client authenticated with an account email and API token.
#[derive(Clone)]
pub struct ConfluenceClient {
    client: Client,
    domain: String,
    email: String,
    api_token: String,
}

impl std::fmt::Debug for ConfluenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceClient")
            .field("domain", &self.domain)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl ConfluenceClient {
    /// Create a client with a bounded per-request timeout.
    pub fn new(credentials: &ConfluenceCredentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| WikiScribeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            domain: credentials.domain.trim_end_matches('/').to_string(),
            email: credentials.email.clone(),
            api_token: credentials.api_token.clone(),
        })
    }

    fn content_url(&self) -> String {
        format!("{}/wiki/rest/api/content", self.domain)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.email, Some(&self.api_token))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| WikiScribeError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.message)
            .unwrap_or(text);
        Err(WikiScribeError::Wiki {
            status: status.as_u16(),
            message: message.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }

    async fn read_content(response: Response) -> Result<Content> {
        response
            .json::<Content>()
            .await
            .map_err(|e| WikiScribeError::Network(format!("invalid content response: {e}")))
    }
}

#[async_trait]
impl WikiApi for ConfluenceClient {
    #[instrument(skip(self))]
    async fn get_page_by_title(&self, space_key: &str, title: &str) -> Result<Option<RemotePage>> {
        let request = self.client.get(self.content_url()).query(&[
            ("spaceKey", space_key),
            ("title", title),
            ("expand", "version"),
        ]);
        let list = self
            .send(request)
            .await?
            .json::<ContentList>()
            .await
            .map_err(|e| WikiScribeError::Network(format!("invalid content list: {e}")))?;

        let page = list.results.into_iter().next().map(RemotePage::from);
        debug!(found = page.is_some(), "page lookup complete");
        Ok(page)
    }

    #[instrument(skip(self, body), fields(body_len = body.len()))]
    async fn create_page(&self, space_key: &str, title: &str, body: &str) -> Result<RemotePage> {
        let payload = CreateContent {
            kind: "page",
            title,
            space: SpaceRef { key: space_key },
            body: storage_body(body),
        };
        let response = self
            .send(self.client.post(self.content_url()).json(&payload))
            .await?;
        Ok(Self::read_content(response).await?.into())
    }

    #[instrument(skip(self, body), fields(page_id = %page.id, body_len = body.len()))]
    async fn update_page(&self, page: &RemotePage, title: &str, body: &str) -> Result<RemotePage> {
        let payload = UpdateContent {
            id: &page.id,
            kind: "page",
            title,
            body: storage_body(body),
            version: ContentVersion {
                number: page.version + 1,
            },
        };
        let url = format!("{}/{}", self.content_url(), page.id);
        let response = self.send(self.client.put(url).json(&payload)).await?;
        Ok(Self::read_content(response).await?.into())
    }

    fn browse_url(&self, space_key: &str, page_id: &str) -> String {
        format!("{}/wiki/spaces/{space_key}/pages/{page_id}", self.domain)
    }
}
