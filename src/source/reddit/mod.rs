//! Reddit adapter: polls `/r/{sub}/new` for each subscribed subreddit and
//! refreshes tracked posts through `/by_id`.

mod auth;
mod listing;
mod ratelimit;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::app::{PostwatchError, Result};
use crate::domain::{Item, RateLimit};
use crate::source::Source;

pub use auth::TokenProvider;
use listing::{PostListing, RedditPost};
pub use ratelimit::RateLimitTracker;

pub const SOURCE_ID: &str = "reddit";

const API_BASE: &str = "https://oauth.reddit.com/";
const AUTH_BASE: &str = "https://www.reddit.com/";
const PAGE_LIMIT: &str = "100";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub subreddits: Vec<String>,
    pub posts_per_specific_request: usize,
    /// Posts created up to this many seconds before startup count as new.
    pub lookback_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            subreddits: Vec::new(),
            posts_per_specific_request: 100,
            lookback_secs: None,
            user_agent: format!("postwatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RedditConfig {
    /// Client id and secret, when both are set and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().filter(|s| !s.is_empty())?;
        let secret = self.client_secret.as_deref().filter(|s| !s.is_empty())?;
        Some((id, secret))
    }
}

/// Paging position in a subreddit's `new` listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Cursor {
    before: Option<String>,
    count: usize,
}

impl Cursor {
    fn advance(&mut self, newest: &str, page_len: usize) {
        self.before = Some(newest.to_string());
        self.count += page_len;
    }
}

pub struct RedditSource {
    client: Client,
    api_base: Url,
    tokens: TokenProvider,
    posts_per_request: usize,
    start_time: DateTime<Utc>,
    subreddits: Mutex<BTreeMap<String, Cursor>>,
    tracked: Mutex<BTreeSet<String>>,
    rate_limit: Mutex<RateLimitTracker>,
}

impl RedditSource {
    pub fn new(config: &RedditConfig) -> Result<Self> {
        let (client_id, client_secret) = config.credentials().ok_or_else(|| {
            PostwatchError::Config("reddit client_id and client_secret are required".into())
        })?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        let tokens = TokenProvider::new(
            client.clone(),
            &Url::parse(AUTH_BASE)?,
            client_id.to_string(),
            client_secret.to_string(),
        )?;

        let mut start_time = Utc::now();
        if let Some(lookback) = config.lookback_secs {
            start_time -= chrono::Duration::seconds(lookback.min(u32::MAX as u64) as i64);
            info!(lookback, %start_time, "Posts created after the start time count as new");
        }

        let source = Self {
            client,
            api_base: Url::parse(API_BASE)?,
            tokens,
            posts_per_request: config.posts_per_specific_request.max(1),
            start_time,
            subreddits: Mutex::new(BTreeMap::new()),
            tracked: Mutex::new(BTreeSet::new()),
            rate_limit: Mutex::new(RateLimitTracker::default()),
        };

        for name in &config.subreddits {
            source.subscribe(name);
        }

        Ok(source)
    }

    /// Start watching a subreddit. Returns false for invalid or repeated names.
    pub fn subscribe(&self, name: &str) -> bool {
        let Some(normalized) = normalize_subreddit(name) else {
            warn!(name, "Ignoring invalid subreddit name");
            return false;
        };

        let mut subreddits = lock(&self.subreddits);
        if subreddits.contains_key(&normalized) {
            warn!(subreddit = %normalized, "Already subscribed");
            return false;
        }

        info!(subreddit = %normalized, "Subscribed");
        subreddits.insert(normalized, Cursor::default());
        true
    }

    pub fn subreddits(&self) -> Vec<String> {
        lock(&self.subreddits).keys().cloned().collect()
    }

    fn calls_per_fetch(&self) -> u32 {
        let subreddits = lock(&self.subreddits).len();
        let tracked = lock(&self.tracked).len();
        let batches = tracked.div_ceil(self.posts_per_request);
        u32::try_from(subreddits + batches).unwrap_or(u32::MAX)
    }

    async fn fetch_subreddit(&self, name: &str, cancel: &CancellationToken) -> Result<Vec<Item>> {
        let Some(cursor) = lock(&self.subreddits).get(name).cloned() else {
            error!(subreddit = name, "Fetch requested for a subreddit that is not subscribed");
            return Ok(Vec::new());
        };

        info!(subreddit = name, "Getting new posts");
        debug!(before = ?cursor.before, count = cursor.count, "Request parameters");

        let mut query = vec![("limit", PAGE_LIMIT.to_string()), ("count", cursor.count.to_string())];
        if let Some(before) = &cursor.before {
            query.push(("before", before.clone()));
        }

        let url = self.api_base.join(&format!("r/{}/new", name))?;
        let (posts, fetch_time) = self.get_listing(url, &query, cancel).await?;
        let page_len = posts.len();

        let posts = select_new_posts(posts, self.start_time);
        let Some(newest) = posts.first() else {
            info!(subreddit = name, "No new posts");
            return Ok(Vec::new());
        };

        if let Some(cursor) = lock(&self.subreddits).get_mut(name) {
            cursor.advance(&newest.name, page_len);
        }

        Ok(posts.into_iter().map(|p| p.into_item(fetch_time)).collect())
    }

    async fn fetch_batch(&self, ids: &[String], cancel: &CancellationToken) -> Result<Vec<Item>> {
        let url = self.api_base.join(&format!("by_id/{}", ids.join(",")))?;
        let (posts, fetch_time) = self.get_listing(url, &[], cancel).await?;
        Ok(posts.into_iter().map(|p| p.into_item(fetch_time)).collect())
    }

    async fn get_listing(
        &self,
        url: Url,
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<(Vec<RedditPost>, DateTime<Utc>)> {
        tokio::select! {
            _ = cancel.cancelled() => Err(PostwatchError::Cancelled),
            result = self.request_listing(url, query) => result,
        }
    }

    async fn request_listing(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<(Vec<RedditPost>, DateTime<Utc>)> {
        let token = self.tokens.access_token().await?;

        trace!(%url, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        lock(&self.rate_limit).apply(response.headers());
        let fetch_time = ratelimit::response_date(response.headers()).unwrap_or_else(Utc::now);
        trace!(%fetch_time, "Response received");

        response.error_for_status_ref()?;
        let listing: PostListing = response.json().await?;

        Ok((listing.into_posts(), fetch_time))
    }
}

#[async_trait]
impl Source for RedditSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch_next(&self, cancel: &CancellationToken) -> Result<Vec<Item>> {
        let names = self.subreddits();
        let results = join_all(names.iter().map(|name| self.fetch_subreddit(name, cancel))).await;

        let mut items = Vec::new();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(posts) => items.extend(posts),
                Err(PostwatchError::Cancelled) => return Err(PostwatchError::Cancelled),
                Err(e) => error!(subreddit = %name, error = %e, "Failed to get new posts"),
            }
        }

        Ok(items)
    }

    async fn fetch_specific(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Item>> {
        let batches: Vec<&[String]> = ids.chunks(self.posts_per_request).collect();
        info!(posts = ids.len(), batches = batches.len(), "Getting tracked posts");

        let results = join_all(batches.iter().map(|batch| self.fetch_batch(batch, cancel))).await;

        let mut items = Vec::new();
        for result in results {
            match result {
                Ok(posts) => items.extend(posts),
                Err(PostwatchError::Cancelled) => return Err(PostwatchError::Cancelled),
                Err(e) => error!(error = %e, "Failed to get tracked posts"),
            }
        }

        Ok(items)
    }

    fn track_id(&self, id: &str) {
        if lock(&self.tracked).insert(id.to_string()) {
            trace!(id, "Tracking post");
        }
    }

    fn tracked_ids(&self) -> Vec<String> {
        lock(&self.tracked).iter().cloned().collect()
    }

    fn rate_limit(&self) -> RateLimit {
        let tracker = *lock(&self.rate_limit);
        RateLimit::new(tracker.remaining(), tracker.reset_secs(), self.calls_per_fetch())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `"/r/Rust/"`, `"r/Rust"` and `"Rust"` all become `"Rust"`.
pub fn normalize_subreddit(name: &str) -> Option<String> {
    let name = name.trim().trim_start_matches('/');
    let name = name.strip_prefix("r/").unwrap_or(name).trim_end_matches('/');
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| name.to_string())
}

/// Posts created after `start`, newest first.
fn select_new_posts(posts: Vec<RedditPost>, start: DateTime<Utc>) -> Vec<RedditPost> {
    let start = start.timestamp() as f64;
    let mut posts: Vec<RedditPost> = posts.into_iter().filter(|p| p.created_utc > start).collect();
    posts.sort_by(|a, b| b.created_utc.total_cmp(&a.created_utc));
    posts
}
