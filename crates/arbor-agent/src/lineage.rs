use serde_json::{json, Value};

/// Records the first and most-recently-observed branch identifiers across a
/// run. Written by the dispatcher and poller, read once when the run
/// concludes to annotate the final report. Only ever touched from the single
/// control thread, so no locking.
#[derive(Debug, Clone, Default)]
pub struct LineageTracker {
    start: Option<String>,
    latest: Option<String>,
}

impl LineageTracker {
    /// Creates a tracker, optionally seeded with an externally supplied
    /// starting identifier.
    pub fn new(start: Option<String>) -> Self {
        Self {
            latest: start.clone(),
            start,
        }
    }

    /// No-op for empty identifiers; otherwise `latest` always moves and
    /// `start` is set only on the first non-empty observation.
    pub fn record(&mut self, branch_id: &str) {
        if branch_id.is_empty() {
            return;
        }
        if self.start.is_none() {
            self.start = Some(branch_id.to_string());
        }
        self.latest = Some(branch_id.to_string());
    }

    pub fn start_branch_id(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn latest_branch_id(&self) -> Option<&str> {
        self.latest.as_deref()
    }

    /// Snapshot with absent values as explicit JSON nulls, never empty
    /// strings.
    pub fn as_json(&self) -> Value {
        json!({
            "start_branch_id": self.start,
            "latest_branch_id": self.latest,
        })
    }
}
