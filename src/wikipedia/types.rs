use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Error code Wikipedia answers with when there is nothing to search for.
pub const NO_SEARCH_CODE: &str = "nosearch";

/// One entry of the dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub title: String,
    pub url: String,
}

/// Body of an `action=opensearch` response.
///
/// Successful responses are a positional array
/// `[term, [title, ...], [description, ...], [url, ...]]`; failures are an
/// object with an `error` member.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OpenSearchResponse {
    Error {
        error: ApiError,
    },
    Results(String, Vec<String>, Vec<String>, Vec<String>),
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub info: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("unexpected opensearch response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Wikipedia API error ({code}): {info}")]
    Api { code: String, info: String },
}

impl OpenSearchResponse {
    pub fn into_results(self) -> Result<Vec<ResultItem>, ResponseError> {
        match self {
            OpenSearchResponse::Error { error } if error.code == NO_SEARCH_CODE => Ok(Vec::new()),
            OpenSearchResponse::Error { error } => Err(ResponseError::Api {
                info: error.info.unwrap_or_else(|| "no details".to_string()),
                code: error.code,
            }),
            OpenSearchResponse::Results(term, titles, _, urls) => {
                if titles.len() != urls.len() {
                    warn!(
                        %term,
                        titles = titles.len(),
                        urls = urls.len(),
                        "title/url count mismatch, truncating to the shorter list"
                    );
                }
                Ok(titles
                    .into_iter()
                    .zip(urls)
                    .map(|(title, url)| ResultItem { title, url })
                    .collect())
            }
        }
    }
}

/// Maps a decoded response body to the list shown in the dropdown.
pub fn format_results(body: Value) -> Result<Vec<ResultItem>, ResponseError> {
    serde_json::from_value::<OpenSearchResponse>(body)?.into_results()
}
