use std::time::Duration;

use crate::domain::RateLimit;

/// Time to wait before polling a source again.
///
/// Spreads the calls left in the window evenly over the time left in it,
/// scaled by how many calls one fetch cycle makes, and rounds up to whole
/// seconds. An exhausted budget waits out the full reset window. The result
/// is never shorter than `minimum`.
pub fn compute_interval(rate_limit: &RateLimit, minimum: Duration) -> Duration {
    let interval = if rate_limit.is_exhausted() {
        Duration::from_secs(u64::from(rate_limit.reset_secs))
    } else if rate_limit.calls_per_fetch > 0 {
        let fetches_left = f64::from(rate_limit.remaining) / f64::from(rate_limit.calls_per_fetch);
        let secs = (f64::from(rate_limit.reset_secs) / fetches_left).ceil();
        Duration::from_secs(secs as u64)
    } else {
        Duration::ZERO
    };

    interval.max(minimum)
}
