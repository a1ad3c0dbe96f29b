use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::wikipedia::SearchClient;

/// Issues `term` until a response arrives, sleeping `delay` between attempts.
///
/// There is no attempt cap: the loop ends on success or when the returned
/// future is dropped.
pub(crate) async fn query_with_retry<C>(client: &C, term: &str, delay: Duration) -> Value
where
    C: SearchClient + ?Sized,
{
    let mut attempt: u32 = 1;
    loop {
        match client.search(term).await {
            Ok(body) => {
                if attempt > 1 {
                    debug!(term, attempt, "query succeeded after retry");
                }
                return body;
            }
            Err(e) => {
                warn!(
                    term,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "query failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
