/// Lets a term through only when it differs from the one let through before it.
#[derive(Debug, Default)]
pub(super) struct DistinctUntilChanged {
    last: Option<String>,
}

impl DistinctUntilChanged {
    pub(super) fn admit(&mut self, term: &str) -> bool {
        if self.last.as_deref() == Some(term) {
            return false;
        }
        self.last = Some(term.to_string());
        true
    }
}
