//! Drains the feed into the store.
//!
//! Posts the store has not seen are inserted whole. For posts it already
//! holds only the score is refreshed; the stored title, author and url stay
//! as first recorded.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::app::Result;
use crate::domain::Item;
use crate::feed::PostFeed;
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Sleep when the feed is empty, in milliseconds (default: 500)
    pub idle_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { idle_ms: 500 }
    }
}

impl ConsumerConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

/// What [`Consumer::process`] did with a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    Inserted,
    ScoreUpdated,
}

pub struct Consumer<S: Store + Send + Sync + 'static> {
    feed: Arc<PostFeed>,
    store: Arc<S>,
    config: ConsumerConfig,
}

impl<S: Store + Send + Sync + 'static> Consumer<S> {
    pub fn new(feed: Arc<PostFeed>, store: Arc<S>, config: ConsumerConfig) -> Self {
        Self {
            feed,
            store,
            config,
        }
    }

    /// Run the drain loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Consumer started");

        while !cancel.is_cancelled() {
            let Some(item) = self.feed.dequeue() else {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.config.idle()) => {}
                }
                continue;
            };

            let id = item.id().to_string();
            if let Err(e) = self.process(item) {
                error!(post_id = %id, "Failed to store post: {}", e);
            }

            // Let other tasks on this worker run between posts.
            tokio::task::yield_now().await;
        }

        info!("Consumer stopped");
    }

    /// Store a single post.
    pub fn process(&self, item: Item) -> Result<Consumed> {
        info!(post_id = item.id(), "Consumed post");

        if self.store.exists(item.id())? {
            self.store.set_post_score(item.id(), item.score())?;
            return Ok(Consumed::ScoreUpdated);
        }

        info!(
            post_id = item.id(),
            author = item.author(),
            title = item.title(),
            url = item.url(),
            score = item.score(),
            created = %item.created(),
            "Storing post"
        );
        self.store.insert(item)?;
        Ok(Consumed::Inserted)
    }
}
