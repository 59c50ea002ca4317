//! Post sources polled by the scheduler.
//!
//! A source owns its own transport, authentication and pagination. The
//! scheduler only sees fetched [`Item`]s, the ids the source wants refreshed,
//! and the source's current [`RateLimit`].

pub mod reddit;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::app::Result;
use crate::domain::{Item, RateLimit};

pub use reddit::RedditSource;

#[async_trait]
pub trait Source: Send + Sync {
    /// Unique id used to register the source with the scheduler.
    fn id(&self) -> &str;

    /// Fetch the next page of new posts.
    async fn fetch_next(&self, cancel: &CancellationToken) -> Result<Vec<Item>>;

    /// Fetch fresh copies of specific posts.
    async fn fetch_specific(&self, ids: &[String], cancel: &CancellationToken)
        -> Result<Vec<Item>>;

    /// Ask the source to keep refreshing this post.
    fn track_id(&self, id: &str);

    fn tracked_ids(&self) -> Vec<String>;

    /// Rate-limit state as of the most recent response.
    fn rate_limit(&self) -> RateLimit;
}
