//! Rate-limit aware polling of registered sources.
//!
//! The scheduler keeps every idle source in a priority queue keyed by the
//! earliest time it may be polled again. A single loop pops due sources and
//! spawns one fetch cycle per source; the cycle pushes its results into the
//! [`PostFeed`] and puts the source back in the queue with a fresh deadline
//! derived from the source's rate limit. A source is out of the queue while
//! its cycle runs, so cycles for the same source never overlap.

mod interval;

pub use interval::compute_interval;

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::{PostwatchError, Result};
use crate::domain::{Item, RateLimit};
use crate::feed::PostFeed;
use crate::source::Source;

/// Hard lower bound for `minimum_interval_ms`.
pub const MINIMUM_INTERVAL_FLOOR_MS: u64 = 100;

const IDLE_NO_SOURCES: Duration = Duration::from_millis(500);
const IDLE_NOT_DUE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Shortest wait between two polls of one source (default: 500)
    pub minimum_interval_ms: u64,
    /// Feed depth at which a warning is logged (default: 100)
    pub feed_warning_threshold: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            minimum_interval_ms: 500,
            feed_warning_threshold: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn minimum_interval(&self) -> Duration {
        Duration::from_millis(self.minimum_interval_ms.max(MINIMUM_INTERVAL_FLOOR_MS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Waiting in the queue for its next poll.
    Idle,
    /// A fetch cycle is in flight.
    Dispatched,
}

struct Registration {
    source: Arc<dyn Source>,
    state: SourceState,
    rate_limit: RateLimit,
}

#[derive(Debug, PartialEq, Eq)]
struct QueueEntry {
    next_poll: Instant,
    seq: u64,
    id: String,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.next_poll
            .cmp(&other.next_poll)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

enum NextPoll {
    Empty,
    NotDue,
    Due(String, Arc<dyn Source>),
}

#[derive(Default)]
struct Registry {
    sources: HashMap<String, Registration>,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    next_seq: u64,
}

impl Registry {
    fn push(&mut self, id: String, next_poll: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(QueueEntry { next_poll, seq, id }));
    }

    fn pop_due(&mut self, now: Instant) -> NextPoll {
        let Some(Reverse(head)) = self.queue.peek() else {
            return NextPoll::Empty;
        };
        if head.next_poll > now {
            return NextPoll::NotDue;
        }

        let Some(Reverse(entry)) = self.queue.pop() else {
            return NextPoll::Empty;
        };
        match self.sources.get_mut(&entry.id) {
            Some(registration) => {
                registration.state = SourceState::Dispatched;
                NextPoll::Due(entry.id, registration.source.clone())
            }
            None => NextPoll::NotDue,
        }
    }

    fn complete(&mut self, id: String, rate_limit: RateLimit, next_poll: Instant) {
        if let Some(registration) = self.sources.get_mut(&id) {
            registration.state = SourceState::Idle;
            registration.rate_limit = rate_limit;
            self.push(id, next_poll);
        }
    }
}

/// Polls sources no faster than their rate limits allow.
///
/// Cloning is cheap; clones share the same registry and feed.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<Mutex<Registry>>,
    feed: Arc<PostFeed>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(feed: Arc<PostFeed>, config: SchedulerConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            feed,
            config,
        }
    }

    // Every critical section is a handful of map and heap operations with no
    // early exits, so the registry stays consistent even if a holder panicked.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a source, due for polling immediately.
    pub fn register_source(&self, source: Arc<dyn Source>) -> Result<()> {
        let id = source.id().to_string();
        let mut registry = self.registry();

        if registry.sources.contains_key(&id) {
            return Err(PostwatchError::DuplicateSource(id));
        }

        let rate_limit = source.rate_limit();
        registry.sources.insert(
            id.clone(),
            Registration {
                source,
                state: SourceState::Idle,
                rate_limit,
            },
        );
        registry.push(id.clone(), Instant::now());
        info!(source = %id, "Registered source");

        Ok(())
    }

    pub fn source_count(&self) -> usize {
        self.registry().sources.len()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.registry().sources.contains_key(id)
    }

    pub fn source_state(&self, id: &str) -> Option<SourceState> {
        self.registry().sources.get(id).map(|r| r.state)
    }

    /// Rate limit recorded at the end of the source's last fetch cycle.
    pub fn last_rate_limit(&self, id: &str) -> Option<RateLimit> {
        self.registry().sources.get(id).map(|r| r.rate_limit)
    }

    /// Run the scheduling loop until `cancel` fires.
    ///
    /// Fetch cycles run as separate tasks. On cancellation no new cycles are
    /// started and the loop waits for the in-flight ones to wind down.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(sources = self.source_count(), "Scheduler started");
        let mut in_flight = JoinSet::new();

        while !cancel.is_cancelled() {
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("Fetch cycle task failed: {}", e);
                }
            }

            let next = self.registry().pop_due(Instant::now());
            let wait = match next {
                NextPoll::Empty => IDLE_NO_SOURCES,
                NextPoll::NotDue => IDLE_NOT_DUE,
                NextPoll::Due(id, source) => {
                    info!(source = %id, "Fetching posts from source");
                    let scheduler = self.clone();
                    let cancel = cancel.clone();
                    in_flight.spawn(async move {
                        scheduler.fetch_cycle(id, source, cancel).await;
                    });
                    continue;
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {}
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Fetch cycle task failed: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    /// Run one cycle for a source and put it back in the queue.
    ///
    /// A panic anywhere in the cycle re-queues the source with the rate limit
    /// recorded after its previous cycle.
    async fn fetch_cycle(&self, id: String, source: Arc<dyn Source>, cancel: CancellationToken) {
        let cycle = AssertUnwindSafe(self.poll_source(&id, source.as_ref(), &cancel)).catch_unwind();

        let rate_limit = match cycle.await {
            Ok(Some(rate_limit)) => rate_limit,
            Ok(None) => {
                debug!(source = %id, "Fetch cycle cancelled, discarding results");
                return;
            }
            Err(_) => {
                error!(source = %id, "Fetch cycle panicked, re-queueing with last known rate limit");
                if cancel.is_cancelled() {
                    return;
                }
                match self.last_rate_limit(&id) {
                    Some(rate_limit) => rate_limit,
                    None => return,
                }
            }
        };

        let interval = compute_interval(&rate_limit, self.config.minimum_interval());
        debug!(
            source = %id,
            remaining = rate_limit.remaining,
            reset_secs = rate_limit.reset_secs,
            calls_per_fetch = rate_limit.calls_per_fetch,
            ?interval,
            "Calculated interval for source"
        );

        self.registry()
            .complete(id, rate_limit, Instant::now() + interval);
    }

    /// Fetch tracked and new posts, feed them, and return the source's rate
    /// limit afterwards. `None` when cancelled.
    async fn poll_source(
        &self,
        id: &str,
        source: &dyn Source,
        cancel: &CancellationToken,
    ) -> Option<RateLimit> {
        let tracked = source.tracked_ids();

        let refresh = async {
            if tracked.is_empty() {
                Ok(Vec::new())
            } else {
                source.fetch_specific(&tracked, cancel).await
            }
        };

        let (refreshed, fetched) = tokio::select! {
            _ = cancel.cancelled() => return None,
            outcome = async { tokio::join!(refresh, source.fetch_next(cancel)) } => outcome,
        };
        if cancel.is_cancelled() {
            return None;
        }

        let mut items = absorb(id, "tracked posts", refreshed);
        items.extend(absorb(id, "new posts", fetched));

        let fetched = items.len();
        let deepest = self.feed_items(source, items);
        debug!(source = %id, fetched, "Fed posts from source");
        if fetched > 0 && deepest >= self.config.feed_warning_threshold {
            warn!(
                source = %id,
                depth = deepest,
                threshold = self.config.feed_warning_threshold,
                "Feed depth above warning threshold"
            );
        }

        Some(source.rate_limit())
    }

    /// Track and enqueue `items`, returning the deepest feed depth reached.
    fn feed_items(&self, source: &dyn Source, items: Vec<Item>) -> usize {
        let mut deepest = 0;
        for item in items {
            source.track_id(item.id());
            self.feed.enqueue(item);
            deepest = deepest.max(self.feed.count());
        }
        deepest
    }
}

fn absorb(id: &str, what: &str, result: Result<Vec<Item>>) -> Vec<Item> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!(source = %id, "Failed to fetch {}: {}", what, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{post, MockSource};

    fn scheduler(feed: Arc<PostFeed>) -> Scheduler {
        Scheduler::new(feed, SchedulerConfig::default())
    }

    /// Run the scheduler for `window` of (paused) time, then cancel and wait.
    async fn run_for(scheduler: &Scheduler, window: Duration) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });
        sleep(window).await;
        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_minimum_interval_has_hard_floor() {
        let config = SchedulerConfig {
            minimum_interval_ms: 10,
            ..Default::default()
        };
        assert_eq!(config.minimum_interval(), Duration::from_millis(100));
        assert_eq!(
            SchedulerConfig::default().minimum_interval(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_queue_orders_by_deadline_then_registration() {
        let now = Instant::now();
        let mut registry = Registry::default();
        registry.push("late".into(), now + Duration::from_secs(5));
        registry.push("first".into(), now);
        registry.push("second".into(), now);

        let order: Vec<_> = std::iter::from_fn(|| registry.queue.pop())
            .map(|Reverse(e)| e.id)
            .collect();
        assert_eq!(order, vec!["first", "second", "late"]);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let source = Arc::new(MockSource::new("test", RateLimit::new(60, 60, 1)));

        scheduler.register_source(source.clone()).unwrap();
        let err = scheduler.register_source(source).unwrap_err();

        assert!(matches!(err, PostwatchError::DuplicateSource(id) if id == "test"));
        assert_eq!(scheduler.source_count(), 1);
        assert!(scheduler.is_registered("test"));
        assert_eq!(scheduler.source_state("test"), Some(SourceState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_can_start_and_stop_without_sources() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        run_for(&scheduler, Duration::from_secs(2)).await;
        assert_eq!(scheduler.source_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_with_remaining() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let source = Arc::new(MockSource::new("test", RateLimit::new(60, 60, 1)));
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_millis(2500)).await;

        // 1s interval over a 2.5s window: ceil(2.5 / 1) = 3, give or take one.
        let calls = source.next_calls();
        assert!((2..=4).contains(&calls), "unexpected call count {}", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_without_remaining() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let source = Arc::new(MockSource::new("test", RateLimit::new(0, 60, 1)));
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_secs(2)).await;

        assert_eq!(source.next_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_source_polls_once_per_reset_window() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let source = Arc::new(MockSource::new("test", RateLimit::new(0, 60, 1)));
        scheduler.register_source(source.clone()).unwrap();

        // Polls at 0s, 60s and 120s.
        run_for(&scheduler, Duration::from_secs(150)).await;

        assert_eq!(source.next_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_cost_source_is_clamped_to_minimum_interval() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let source = Arc::new(MockSource::new("test", RateLimit::new(10, 60, 0)));
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_millis(2200)).await;

        // 500ms floor over 2.2s: ceil(2.2 / 0.5) = 5, give or take one.
        let calls = source.next_calls();
        assert!((4..=6).contains(&calls), "unexpected call count {}", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_uses_rate_limit_after_fetch() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        // Plenty of budget at registration, exhausted by the first fetch.
        let source = Arc::new(
            MockSource::new("test", RateLimit::new(600, 60, 1))
                .with_rate_limit_after_fetch(RateLimit::new(0, 30, 1)),
        );
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_secs(20)).await;

        assert_eq!(source.next_calls(), 1);
        assert_eq!(
            scheduler.last_rate_limit("test"),
            Some(RateLimit::new(0, 30, 1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_cycle_feeds_and_tracks_items() {
        let feed = Arc::new(PostFeed::new());
        let scheduler = scheduler(feed.clone());
        let source = Arc::new(
            MockSource::new("test", RateLimit::new(60, 60, 1))
                .with_batch(vec![post("a", "alice", 1), post("b", "bob", 2)]),
        );
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_millis(1500)).await;

        assert_eq!(feed.count(), 2);
        assert_eq!(source.tracked_ids(), vec!["a", "b"]);

        // The second cycle refreshed what the first one found.
        let refreshes = source.specific_calls();
        assert!(!refreshes.is_empty());
        assert_eq!(refreshes[0], vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_skips_refresh_without_tracked_ids() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let source = Arc::new(MockSource::new("test", RateLimit::new(0, 60, 1)));
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_secs(1)).await;

        assert_eq!(source.next_calls(), 1);
        assert!(source.specific_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_source_is_requeued() {
        let feed = Arc::new(PostFeed::new());
        let scheduler = scheduler(feed.clone());
        let source = Arc::new(MockSource::new("test", RateLimit::new(60, 60, 1)).failing());
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_millis(2500)).await;

        assert!(source.next_calls() >= 2);
        assert!(feed.is_empty());
        assert!(source.tracked_ids().is_empty());
        assert_eq!(scheduler.source_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_source_is_requeued() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let source = Arc::new(MockSource::new("test", RateLimit::new(60, 60, 1)).panicking());
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_millis(2500)).await;

        assert!(source.next_calls() >= 2);
        assert_eq!(scheduler.source_state("test"), Some(SourceState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_panicking_while_tracking_is_requeued() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let source = Arc::new(
            MockSource::new("test", RateLimit::new(60, 60, 1))
                .with_batch(vec![post("a", "alice", 1)])
                .panicking_on_track(),
        );
        scheduler.register_source(source.clone()).unwrap();

        run_for(&scheduler, Duration::from_secs(10)).await;

        assert!(source.next_calls() >= 5);
        assert_eq!(scheduler.source_state("test"), Some(SourceState::Idle));
        assert_eq!(scheduler.last_rate_limit("test"), Some(RateLimit::new(60, 60, 1)));
    }

    #[test]
    fn test_feed_depth_ignores_updates_to_buffered_posts() {
        let feed = Arc::new(PostFeed::new());
        let scheduler = scheduler(feed.clone());
        let source = MockSource::new("test", RateLimit::default());

        let buffered: Vec<Item> = (0..99).map(|i| post(&i.to_string(), "alice", i)).collect();
        assert_eq!(scheduler.feed_items(&source, buffered), 99);

        let again = vec![post("42", "alice", 1000)];
        assert_eq!(scheduler.feed_items(&source, again), 99);
        assert_eq!(feed.count(), 99);

        assert_eq!(scheduler.feed_items(&source, vec![post("new", "bob", 0)]), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_does_not_block_others() {
        let scheduler = scheduler(Arc::new(PostFeed::new()));
        let slow = Arc::new(
            MockSource::new("slow", RateLimit::new(60, 60, 1)).with_delay(Duration::from_secs(10)),
        );
        let fast = Arc::new(MockSource::new("fast", RateLimit::new(60, 60, 1)));
        scheduler.register_source(slow.clone()).unwrap();
        scheduler.register_source(fast.clone()).unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });

        sleep(Duration::from_millis(3500)).await;
        assert_eq!(scheduler.source_state("slow"), Some(SourceState::Dispatched));
        // Never dispatched twice while its first cycle is still running.
        assert_eq!(slow.next_calls(), 1);
        assert!(fast.next_calls() >= 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_in_flight_results() {
        let feed = Arc::new(PostFeed::new());
        let scheduler = scheduler(feed.clone());
        let source = Arc::new(
            MockSource::new("slow", RateLimit::new(60, 60, 1))
                .with_delay(Duration::from_secs(30))
                .with_batch(vec![post("a", "alice", 1)]),
        );
        scheduler.register_source(source.clone()).unwrap();

        let started = Instant::now();
        run_for(&scheduler, Duration::from_secs(1)).await;

        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(source.next_calls(), 1);
        assert!(feed.is_empty());
        assert!(source.tracked_ids().is_empty());
    }
}
