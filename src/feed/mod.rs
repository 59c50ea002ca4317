//! Deduplicating post queue between the scheduler and the consumer.
//!
//! Each post id is buffered at most once. A post that arrives again before
//! it has been dequeued replaces the buffered copy only when it came from a
//! strictly later fetch, and keeps its original place in line.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::domain::Item;

#[derive(Debug, Default)]
struct FeedState {
    order: VecDeque<String>,
    posts: HashMap<String, Item>,
}

/// FIFO of posts keyed by id, safe to share between tasks.
#[derive(Debug, Default)]
pub struct PostFeed {
    state: Mutex<FeedState>,
}

impl PostFeed {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map and the order out
    // of step, so a poisoned lock is still usable.
    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffer `item` and return the queue length observed before the call.
    pub fn enqueue(&self, item: Item) -> usize {
        let mut state = self.state();
        let count = state.order.len();

        if let Some(buffered) = state.posts.get_mut(item.id()) {
            if item.is_newer_than(buffered) {
                debug!(
                    post_id = item.id(),
                    url = item.url(),
                    score = item.score(),
                    "Updated buffered post"
                );
                *buffered = item;
            }
            return count;
        }

        trace!(
            post_id = item.id(),
            author = item.author(),
            title = item.title(),
            score = item.score(),
            "Enqueued post"
        );
        state.order.push_back(item.id().to_string());
        state.posts.insert(item.id().to_string(), item);

        count
    }

    /// Pop the oldest buffered post, if any.
    pub fn dequeue(&self) -> Option<Item> {
        let mut state = self.state();
        let id = state.order.pop_front()?;
        state.posts.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.state().order.is_empty()
    }

    pub fn count(&self) -> usize {
        self.state().order.len()
    }
}
