use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";

/// Failures of a single opensearch request. All of them are transient from
/// the pipeline's point of view and lead to a retry.
#[derive(Debug, thiserror::Error)]
pub enum WikipediaError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("search failed: status {0}")]
    Status(u16),

    #[error("response is not JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Source of raw opensearch bodies.
/// Implemented by `WikipediaClient` for production; mock implementations used in tests.
pub trait SearchClient {
    fn search(&self, term: &str) -> impl Future<Output = Result<Value, WikipediaError>> + Send;
}

#[derive(Clone)]
pub struct WikipediaClient {
    http: Client,
    endpoint: Url,
}

impl WikipediaClient {
    pub fn new(http: Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn query_url(&self, term: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("action", "opensearch")
            .append_pair("search", term)
            .append_pair("format", "json");
        url
    }
}

impl SearchClient for WikipediaClient {
    async fn search(&self, term: &str) -> Result<Value, WikipediaError> {
        let response = self
            .http
            .get(self.query_url(term))
            .header("User-Agent", crate::USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, term, "opensearch request rejected");
            return Err(WikipediaError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let body = serde_json::from_str(&text)?;
        debug!(term, bytes = text.len(), "opensearch response received");
        Ok(body)
    }
}
