//! # postwatch
//!
//! Polls rate-limited post sources (Reddit) and keeps a live, queryable store
//! of what they publish.
//!
//! ## Architecture
//!
//! ```text
//! Source → Scheduler → PostFeed → Consumer → Store → StatisticsWriter
//! ```
//!
//! The [`scheduler`] dispatches each source no faster than its rate limit
//! allows. Fetched posts land in the deduplicating [`feed`], and the
//! [`consumer`] drains that into the [`store`], inserting new posts and
//! refreshing the score of known ones.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write ~/.config/postwatch/config.toml, then add credentials and subreddits
//! postwatch init-config
//!
//! # Run until ctrl-c
//! postwatch run
//!
//! # Run for ten minutes
//! postwatch run --duration 10m
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together feed, store and
/// scheduler, and registers the configured sources.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// TOML configuration, loaded from `~/.config/postwatch/config.toml`.
pub mod config;

/// Drains the feed into the store.
pub mod consumer;

/// Runs the pipeline tasks until a signal or the run duration.
pub mod daemon;

/// Console and hourly file logging setup.
pub mod logging;

/// Core domain models.
///
/// - [`Item`](domain::Item): a post with its score and fetch time
/// - [`RateLimit`](domain::RateLimit): a source's remaining request budget
pub mod domain;

/// Deduplicating FIFO between the scheduler and the consumer.
pub mod feed;

/// Rate-limit aware polling of sources.
pub mod scheduler;

/// The [`Source`](source::Source) trait and its Reddit implementation.
pub mod source;

/// Periodic statistics snapshot written as JSON.
pub mod stats;

/// Post persistence.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`MemoryStore`](store::MemoryStore): in-memory implementation
pub mod store;

#[cfg(test)]
mod testing;
