use std::sync::Arc;

use tracing::{info, warn};

use crate::app::error::Result;
use crate::config::Config;
use crate::feed::PostFeed;
use crate::scheduler::Scheduler;
use crate::source::RedditSource;
use crate::store::MemoryStore;

/// Shared pipeline components built from a [`Config`].
pub struct AppContext {
    pub config: Config,
    pub feed: Arc<PostFeed>,
    pub store: Arc<MemoryStore>,
    pub scheduler: Scheduler,
}

impl AppContext {
    /// Build the pipeline and register every source the configuration enables.
    pub fn new(config: Config) -> Result<Self> {
        let ctx = Self::without_sources(config);

        if ctx.config.reddit.credentials().is_some() {
            let reddit = RedditSource::new(&ctx.config.reddit)?;
            info!(subreddits = ?reddit.subreddits(), "Reddit source enabled");
            ctx.scheduler.register_source(Arc::new(reddit))?;
        } else {
            warn!("Reddit credentials not configured, no sources registered");
        }

        Ok(ctx)
    }

    /// Build the pipeline with an empty scheduler.
    pub fn without_sources(config: Config) -> Self {
        let feed = Arc::new(PostFeed::new());
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(feed.clone(), config.scheduler.clone());

        Self {
            config,
            feed,
            store,
            scheduler,
        }
    }
}
