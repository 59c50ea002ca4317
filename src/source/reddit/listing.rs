//! Reddit JSON wire types. Nothing outside this adapter sees them.

use chrono::{DateTime, TimeZone, Utc};
use html_escape::decode_html_entities;
use serde::Deserialize;

use crate::domain::Item;

pub const WEB_BASE: &str = "https://www.reddit.com";

/// `{"kind": "...", "data": {...}}` envelope. The kind is not needed.
#[derive(Debug, Deserialize)]
pub struct Thing<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct Listing<T> {
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    /// Fullname, e.g. `t3_1abcd`.
    pub name: String,
    pub author: String,
    pub title: String,
    pub permalink: String,
    pub ups: i64,
    pub created_utc: f64,
}

impl RedditPost {
    pub fn created(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.created_utc as i64, 0)
            .single()
            .unwrap_or_default()
    }

    pub fn into_item(self, fetch_time: DateTime<Utc>) -> Item {
        let created = self.created();
        Item::new(
            self.name,
            self.author,
            decode_html_entities(&self.title).to_string(),
            format!("{}{}", WEB_BASE, self.permalink),
            created,
        )
        .with_score(self.ups)
        .with_fetch_time(fetch_time)
    }
}

pub type PostListing = Thing<Listing<RedditPost>>;

impl PostListing {
    pub fn into_posts(self) -> Vec<RedditPost> {
        self.data.children.into_iter().map(|t| t.data).collect()
    }
}
