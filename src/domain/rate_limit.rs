use serde::{Deserialize, Serialize};

/// Snapshot of a source's call budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Calls left in the current window.
    pub remaining: u32,
    /// Seconds until the window resets.
    pub reset_secs: u32,
    /// Calls one fetch cycle is expected to make.
    pub calls_per_fetch: u32,
}

impl RateLimit {
    pub fn new(remaining: u32, reset_secs: u32, calls_per_fetch: u32) -> Self {
        Self {
            remaining,
            reset_secs,
            calls_per_fetch,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
