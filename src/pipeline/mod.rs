//! The search box's query pipeline.
//!
//! Field edits flow through debounce, "distinct until changed", a switch to
//! the newest query (with unbounded fixed-delay retry), and finally the
//! mapping to result items published on a `watch` channel.

mod debounce;
mod dedupe;
mod retry;

pub(crate) use retry::query_with_retry;

use std::future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use crate::wikipedia::{ResponseError, ResultItem, SearchClient, format_results};
use debounce::Debouncer;
use dedupe::DistinctUntilChanged;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Quiet period the field must stay unchanged before a query is issued.
    pub debounce: Duration,
    /// Pause between a failed attempt and its reissue.
    pub retry_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// What the dropdown shows. Written only by the pipeline task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    /// Term the current results belong to; `None` until the first response.
    pub term: Option<String>,
    pub results: Vec<ResultItem>,
    pub has_results: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("results for [{term}] could not be read: {source}")]
    Response {
        term: String,
        #[source]
        source: ResponseError,
    },

    #[error("search pipeline has stopped")]
    Closed,

    #[error("search pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

type InFlight = BoxFuture<'static, (String, Value)>;

/// Handle to a running pipeline. Dropping it tears the pipeline down.
pub struct QueryPipeline {
    input: mpsc::UnboundedSender<String>,
    state: watch::Receiver<SearchState>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), PipelineError>>,
    teardown: DropGuard,
}

impl QueryPipeline {
    pub fn spawn<C>(client: C, settings: PipelineSettings) -> Self
    where
        C: SearchClient + Send + Sync + 'static,
    {
        let (input, input_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SearchState::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(
            Arc::new(client),
            settings,
            input_rx,
            state_tx,
            cancel.clone(),
        ));

        Self {
            input,
            state,
            teardown: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    /// Feeds the field's new value into the pipeline.
    pub fn push(&self, term: impl Into<String>) -> Result<(), PipelineError> {
        self.input
            .send(term.into())
            .map_err(|_| PipelineError::Closed)
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.clone()
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    /// Stops all pending work: the quiet timer, the in-flight query and any retry wait.
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        info!("tearing down search pipeline");
        self.cancel.cancel();
        self.task.await?
    }

    /// Closes the input, lets a pending term through immediately and waits
    /// for its query to settle.
    pub async fn finish(self) -> Result<(), PipelineError> {
        let Self {
            input,
            task,
            teardown,
            ..
        } = self;
        drop(input);
        let outcome = task.await;
        drop(teardown);
        outcome?
    }
}

async fn run<C>(
    client: Arc<C>,
    settings: PipelineSettings,
    mut input: mpsc::UnboundedReceiver<String>,
    state: watch::Sender<SearchState>,
    cancel: CancellationToken,
) -> Result<(), PipelineError>
where
    C: SearchClient + Send + Sync + 'static,
{
    info!(
        debounce_ms = settings.debounce.as_millis() as u64,
        retry_delay_ms = settings.retry_delay.as_millis() as u64,
        "search pipeline started"
    );

    let mut debouncer = Debouncer::new(settings.debounce);
    let mut distinct = DistinctUntilChanged::default();
    let mut in_flight: Option<InFlight> = None;
    let mut input_open = true;

    loop {
        if !input_open && debouncer.is_idle() && in_flight.is_none() {
            break;
        }

        let deadline = debouncer.deadline();
        let emitted = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("search pipeline cancelled");
                break;
            }

            received = input.recv(), if input_open => match received {
                Some(term) => {
                    debouncer.push(term);
                    None
                }
                None => {
                    input_open = false;
                    debouncer.take()
                }
            },

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                debouncer.take()
            }

            (term, body) = settle(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                let results = format_results(body).map_err(|source| PipelineError::Response {
                    term: term.clone(),
                    source,
                })?;
                info!(term = %term, count = results.len(), "results received");
                state.send_replace(SearchState {
                    has_results: !results.is_empty(),
                    term: Some(term),
                    results,
                });
                None
            }
        };

        let Some(term) = emitted else { continue };
        if !distinct.admit(&term) {
            debug!(term = %term, "term unchanged, keeping current query");
            continue;
        }

        info!(term = %term, "querying");
        let client = Arc::clone(&client);
        let delay = settings.retry_delay;
        // Replacing the previous future discards its result.
        in_flight = Some(
            async move {
                let body = query_with_retry(client.as_ref(), &term, delay).await;
                (term, body)
            }
            .boxed(),
        );
    }

    info!("search pipeline stopped");
    Ok(())
}

async fn settle(in_flight: &mut Option<InFlight>) -> (String, Value) {
    match in_flight {
        Some(query) => query.await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::wikipedia::client::WikipediaError;

    const LATENCY: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct Script {
        calls: Mutex<Vec<(String, Instant)>>,
        latency: Mutex<HashMap<String, Duration>>,
        bodies: Mutex<HashMap<String, Value>>,
        failures_left: Mutex<u32>,
    }

    #[derive(Clone, Default)]
    struct MockSearch(Arc<Script>);

    impl MockSearch {
        fn with_latency(self, term: &str, latency: Duration) -> Self {
            self.0.latency.lock().unwrap().insert(term.into(), latency);
            self
        }

        fn with_body(self, term: &str, body: Value) -> Self {
            self.0.bodies.lock().unwrap().insert(term.into(), body);
            self
        }

        fn failing(self, times: u32) -> Self {
            *self.0.failures_left.lock().unwrap() = times;
            self
        }

        fn terms(&self) -> Vec<String> {
            self.0.calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.0.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
        }
    }

    impl SearchClient for MockSearch {
        async fn search(&self, term: &str) -> Result<Value, WikipediaError> {
            self.0
                .calls
                .lock()
                .unwrap()
                .push((term.to_string(), Instant::now()));
            let latency = self
                .0
                .latency
                .lock()
                .unwrap()
                .get(term)
                .copied()
                .unwrap_or(LATENCY);
            tokio::time::sleep(latency).await;

            {
                let mut left = self.0.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(WikipediaError::Status(503));
                }
            }

            let body = self.0.bodies.lock().unwrap().get(term).cloned();
            Ok(body.unwrap_or_else(|| {
                json!([term, [format!("{term} title")], [""], [format!("/wiki/{term}")]])
            }))
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings::default()
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn state_starts_empty() {
        let pipeline = QueryPipeline::spawn(MockSearch::default(), settings());
        assert_eq!(pipeline.state(), SearchState::default());
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_terms_issue_only_final_query() {
        let mock = MockSearch::default();
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        for term in ["c", "ca", "cat"] {
            pipeline.push(term).unwrap();
            wait(300).await;
        }
        let last_push = Instant::now() - Duration::from_millis(300);
        wait(3000).await;

        assert_eq!(mock.terms(), vec!["cat"]);
        assert_eq!(
            mock.call_times()[0] - last_push,
            Duration::from_millis(2000)
        );

        let state = pipeline.state();
        assert_eq!(state.term.as_deref(), Some("cat"));
        assert_eq!(
            state.results,
            vec![ResultItem {
                title: "cat title".into(),
                url: "/wiki/cat".into(),
            }]
        );
        assert!(state.has_results);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn identical_consecutive_terms_query_once() {
        let mock = MockSearch::default();
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        for term in ["cat", "cat", "dog", "cat"] {
            pipeline.push(term).unwrap();
            wait(3000).await;
        }

        assert_eq!(mock.terms(), vec!["cat", "dog", "cat"]);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_term_keeps_in_flight_query() {
        let mock = MockSearch::default().with_latency("cat", Duration::from_secs(3));
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        pipeline.push("cat").unwrap();
        wait(2100).await;
        pipeline.push("cat").unwrap();
        wait(5000).await;

        assert_eq!(mock.terms(), vec!["cat"]);
        assert_eq!(pipeline.state().term.as_deref(), Some("cat"));
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn newer_term_discards_stale_result() {
        let mock = MockSearch::default().with_latency("slow", Duration::from_secs(5));
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        let mut rx = pipeline.subscribe();
        let published = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                seen.push(rx.borrow_and_update().term.clone());
            }
            seen
        });

        pipeline.push("slow").unwrap();
        wait(2100).await;
        pipeline.push("fast").unwrap();
        wait(10_000).await;

        assert_eq!(mock.terms(), vec!["slow", "fast"]);
        assert_eq!(pipeline.state().term.as_deref(), Some("fast"));

        pipeline.shutdown().await.unwrap();
        let seen = published.await.unwrap();
        assert_eq!(seen, vec![Some("fast".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_query_is_reissued_every_retry_delay() {
        let mock = MockSearch::default().failing(3);
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        pipeline.push("cat").unwrap();
        wait(20_000).await;

        assert_eq!(mock.terms(), vec!["cat", "cat", "cat", "cat"]);
        for pair in mock.call_times().windows(2) {
            assert_eq!(pair[1] - pair[0], LATENCY + DEFAULT_RETRY_DELAY);
        }
        assert!(pipeline.state().has_results);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn retries_keep_previous_results_visible() {
        let mock = MockSearch::default();
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        pipeline.push("cat").unwrap();
        wait(3000).await;
        *mock.0.failures_left.lock().unwrap() = u32::MAX;
        pipeline.push("dog").unwrap();
        wait(15_000).await;

        let state = pipeline.state();
        assert_eq!(state.term.as_deref(), Some("cat"));
        assert!(state.has_results);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn nosearch_response_hides_dropdown() {
        let mock = MockSearch::default().with_body("", json!({"error": {"code": "nosearch"}}));
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        pipeline.push("cat").unwrap();
        wait(3000).await;
        assert!(pipeline.state().has_results);

        pipeline.push("").unwrap();
        wait(3000).await;

        let state = pipeline.state();
        assert_eq!(state.term.as_deref(), Some(""));
        assert!(state.results.is_empty());
        assert!(!state.has_results);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_response_stops_pipeline() {
        let mock = MockSearch::default().with_body("bad", json!({"unexpected": true}));
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        pipeline.push("bad").unwrap();
        wait(3000).await;

        assert!(matches!(pipeline.push("cat"), Err(PipelineError::Closed)));
        match pipeline.finish().await {
            Err(PipelineError::Response { term, source }) => {
                assert_eq!(term, "bad");
                assert!(matches!(source, ResponseError::Malformed(_)));
            }
            other => panic!("expected Response error, got: {other:?}"),
        }
        assert_eq!(mock.terms(), vec!["bad"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_pending_retries() {
        let mock = MockSearch::default().failing(u32::MAX);
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        pipeline.push("cat").unwrap();
        wait(10_000).await;
        let attempts = mock.terms().len();
        assert!(attempts >= 2);

        pipeline.shutdown().await.unwrap();
        wait(30_000).await;
        assert_eq!(mock.terms().len(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_term() {
        let mock = MockSearch::default();
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        pipeline.push("cat").unwrap();
        wait(500).await;
        pipeline.shutdown().await.unwrap();
        wait(5000).await;

        assert!(mock.terms().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_tears_down() {
        let mock = MockSearch::default().failing(u32::MAX);
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());

        pipeline.push("cat").unwrap();
        wait(10_000).await;
        drop(pipeline);
        wait(100).await;
        let attempts = mock.terms().len();

        wait(30_000).await;
        assert_eq!(mock.terms().len(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_flushes_pending_term_without_waiting() {
        let mock = MockSearch::default();
        let pipeline = QueryPipeline::spawn(mock.clone(), settings());
        let rx = pipeline.subscribe();
        let start = Instant::now();

        pipeline.push("cat").unwrap();
        pipeline.finish().await.unwrap();

        assert_eq!(mock.terms(), vec!["cat"]);
        assert_eq!(mock.call_times()[0], start);
        assert_eq!(rx.borrow().term.as_deref(), Some("cat"));
    }
}
