use tokio::time::{Duration, Instant};

/// Holds the latest input until it has been left alone for the quiet period.
#[derive(Debug)]
pub(super) struct Debouncer {
    quiet: Duration,
    pending: Option<(String, Instant)>,
}

impl Debouncer {
    pub(super) fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    /// Replaces any pending value and restarts the quiet period.
    pub(super) fn push(&mut self, term: String) {
        self.pending = Some((term, Instant::now() + self.quiet));
    }

    pub(super) fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    pub(super) fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Releases the pending value without waiting for its deadline.
    pub(super) fn take(&mut self) -> Option<String> {
        self.pending.take().map(|(term, _)| term)
    }
}
