use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, DATE};
use tracing::{debug, warn};

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Rate-limit state learned from Reddit response headers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitTracker {
    remaining: u32,
    reset_secs: u32,
    updated_at: Option<DateTime<Utc>>,
}

impl RateLimitTracker {
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_secs(&self) -> u32 {
        self.reset_secs
    }

    /// Apply the headers of a response.
    ///
    /// Responses that were generated before the last applied one are ignored,
    /// so concurrent requests finishing out of order cannot roll the budget
    /// back. Returns whether the state changed.
    pub fn apply(&mut self, headers: &HeaderMap) -> bool {
        let date = response_date(headers);

        if let (Some(date), Some(last)) = (date, self.updated_at) {
            if date < last {
                debug!(%date, %last, "Ignoring rate limit from older response");
                return false;
            }
        }

        let remaining = header_number(headers, REMAINING_HEADER);
        let reset = header_number(headers, RESET_HEADER);

        let (Some(remaining), Some(reset)) = (remaining, reset) else {
            warn!(
                remaining = ?headers.get(REMAINING_HEADER),
                reset = ?headers.get(RESET_HEADER),
                "Missing or malformed rate limit headers, keeping previous values"
            );
            return false;
        };

        self.remaining = remaining;
        self.reset_secs = reset;
        self.updated_at = date.or(self.updated_at);
        debug!(remaining, reset, "Rate limit updated");
        true
    }
}

/// `Date` header of a response, if present and parseable.
pub fn response_date(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get(DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Reddit sends these as decimal text, e.g. `"598.0"`. Fractions are dropped.
fn header_number(headers: &HeaderMap, name: &str) -> Option<u32> {
    let value: f64 = headers.get(name)?.to_str().ok()?.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.min(u32::MAX as f64) as u32)
}
