//! Periodic statistics snapshot written as JSON.
//!
//! The writer only reads from the store. Each tick replaces the whole file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::Result;
use crate::domain::Item;
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Whether the writer runs at all (default: true)
    pub enabled: bool,
    /// Output file (default: statistics.json)
    pub filename: PathBuf,
    /// Time between snapshots in milliseconds (default: 5000)
    pub interval_ms: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filename: PathBuf::from("statistics.json"),
            interval_ms: 5000,
        }
    }
}

impl StatisticsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPostCount {
    pub user_name: String,
    pub post_count: usize,
}

/// One snapshot. Only `total_posts` is present while the store is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_with_most_posts: Option<UserPostCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_posts_per_user: Option<usize>,
    pub total_posts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_upvoted_post: Option<Item>,
}

impl Statistics {
    pub fn collect<S: Store>(store: &S) -> Result<Self> {
        let counts = store.get_post_counts_by_user()?;

        if counts.is_empty() {
            return Ok(Self {
                user_with_most_posts: None,
                average_posts_per_user: None,
                total_posts: 0,
                most_upvoted_post: None,
            });
        }

        let total_posts: usize = counts.values().sum();
        // Ties go to the alphabetically first user so snapshots are stable.
        let user_with_most_posts = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(user, count)| UserPostCount {
                user_name: user.clone(),
                post_count: *count,
            });

        Ok(Self {
            user_with_most_posts,
            average_posts_per_user: Some(total_posts / counts.len()),
            total_posts,
            most_upvoted_post: store.get_top_posts(1)?.into_iter().next(),
        })
    }
}

pub struct StatisticsWriter<S: Store + Send + Sync + 'static> {
    store: Arc<S>,
    config: StatisticsConfig,
}

impl<S: Store + Send + Sync + 'static> StatisticsWriter<S> {
    pub fn new(store: Arc<S>, config: StatisticsConfig) -> Self {
        Self { store, config }
    }

    /// Collect and write one snapshot.
    pub async fn write_once(&self) -> Result<Statistics> {
        let stats = Statistics::collect(self.store.as_ref())?;
        let json = serde_json::to_vec_pretty(&stats)?;
        tokio::fs::write(&self.config.filename, json).await?;
        debug!(
            path = %self.config.filename.display(),
            total_posts = stats.total_posts,
            "Wrote statistics"
        );
        Ok(stats)
    }

    /// Write a snapshot every interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            path = %self.config.filename.display(),
            interval_ms = self.config.interval_ms,
            "Statistics writer started"
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.write_once().await {
                error!("Failed to write statistics: {}", e);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.config.interval()) => {}
            }
        }

        info!("Statistics writer stopped");
    }
}
