use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single post fetched from a source.
///
/// Everything except `score` is fixed once the item is built. Sources stamp
/// `fetch_time` with the time their response was produced so that the feed can
/// tell which of two copies of the same post is the more recent one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: String,
    author: String,
    title: String,
    url: String,
    created: DateTime<Utc>,
    fetch_time: DateTime<Utc>,
    score: i64,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            title: title.into(),
            url: url.into(),
            created,
            fetch_time: Utc::now(),
            score: 0,
        }
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    pub fn with_fetch_time(mut self, fetch_time: DateTime<Utc>) -> Self {
        self.fetch_time = fetch_time;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn fetch_time(&self) -> DateTime<Utc> {
        self.fetch_time
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    /// The only in-place mutation an item supports.
    pub fn set_score(&mut self, score: i64) {
        self.score = score;
    }

    /// True when `self` came from a strictly later fetch than `other`.
    pub fn is_newer_than(&self, other: &Item) -> bool {
        self.fetch_time > other.fetch_time
    }
}
