//! Wikipedia opensearch: the HTTP client and the mapping of its bodies to result items.

pub mod client;
pub mod types;

pub use client::{SearchClient, WikipediaClient};
pub use types::{ResponseError, ResultItem, format_results};
