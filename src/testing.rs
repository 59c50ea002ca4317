//! Test doubles shared by the unit tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::app::{PostwatchError, Result};
use crate::domain::{Item, RateLimit};
use crate::source::Source;

pub fn post(id: &str, author: &str, score: i64) -> Item {
    Item::new(
        id,
        author,
        format!("post {}", id),
        format!("https://example.com/{}", id),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
    .with_score(score)
}

fn unavailable() -> PostwatchError {
    PostwatchError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "source unavailable",
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
    PanicOnTrack,
}

/// Scripted source: serves queued batches, records calls and reports a fixed
/// rate limit (optionally switching to another one after the first fetch).
pub struct MockSource {
    id: String,
    rate_limit: Mutex<RateLimit>,
    rate_limit_after_fetch: Option<RateLimit>,
    batches: Mutex<VecDeque<Vec<Item>>>,
    behaviour: Behaviour,
    delay: Duration,
    next_calls: AtomicUsize,
    specific_calls: Mutex<Vec<Vec<String>>>,
    tracked: Mutex<BTreeSet<String>>,
}

impl MockSource {
    pub fn new(id: &str, rate_limit: RateLimit) -> Self {
        Self {
            id: id.to_string(),
            rate_limit: Mutex::new(rate_limit),
            rate_limit_after_fetch: None,
            batches: Mutex::new(VecDeque::new()),
            behaviour: Behaviour::Succeed,
            delay: Duration::ZERO,
            next_calls: AtomicUsize::new(0),
            specific_calls: Mutex::new(Vec::new()),
            tracked: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_batch(self, batch: Vec<Item>) -> Self {
        self.batches.lock().unwrap().push_back(batch);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_rate_limit_after_fetch(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit_after_fetch = Some(rate_limit);
        self
    }

    pub fn failing(mut self) -> Self {
        self.behaviour = Behaviour::Fail;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    /// Fetches succeed, but `track_id` panics.
    pub fn panicking_on_track(mut self) -> Self {
        self.behaviour = Behaviour::PanicOnTrack;
        self
    }

    pub fn next_calls(&self) -> usize {
        self.next_calls.load(Ordering::SeqCst)
    }

    pub fn specific_calls(&self) -> Vec<Vec<String>> {
        self.specific_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_next(&self, _cancel: &CancellationToken) -> Result<Vec<Item>> {
        self.next_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(after) = self.rate_limit_after_fetch {
            *self.rate_limit.lock().unwrap() = after;
        }

        match self.behaviour {
            Behaviour::Succeed | Behaviour::PanicOnTrack => {
                Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
            }
            Behaviour::Fail => Err(unavailable()),
            Behaviour::Panic => panic!("source exploded"),
        }
    }

    async fn fetch_specific(
        &self,
        ids: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Vec<Item>> {
        self.specific_calls.lock().unwrap().push(ids.to_vec());
        if matches!(self.behaviour, Behaviour::Fail | Behaviour::Panic) {
            return Err(unavailable());
        }
        Ok(Vec::new())
    }

    fn track_id(&self, id: &str) {
        if self.behaviour == Behaviour::PanicOnTrack {
            panic!("cannot track {}", id);
        }
        self.tracked.lock().unwrap().insert(id.to_string());
    }

    fn tracked_ids(&self) -> Vec<String> {
        self.tracked.lock().unwrap().iter().cloned().collect()
    }

    fn rate_limit(&self) -> RateLimit {
        *self.rate_limit.lock().unwrap()
    }
}
