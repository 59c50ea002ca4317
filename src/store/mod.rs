pub mod memory;

use std::collections::HashMap;

use crate::app::Result;
use crate::domain::Item;

pub use memory::MemoryStore;

/// Number of posts returned by the top-post queries when the caller has no preference.
pub const DEFAULT_TOP_COUNT: usize = 10;

/// Keyed post storage with ranking queries.
///
/// Ranking queries order by score descending and break ties by insertion
/// order, earliest first.
pub trait Store {
    // Mutation
    fn insert(&self, item: Item) -> Result<()>;
    fn delete(&self, id: &str) -> Result<bool>;
    fn clear(&self) -> Result<()>;
    fn set_post_score(&self, id: &str, score: i64) -> Result<()>;

    // Queries
    fn exists(&self, id: &str) -> Result<bool>;
    fn get_all_posts(&self) -> Result<Vec<Item>>;
    fn get_all_posts_by_user(&self, author: &str) -> Result<Vec<Item>>;
    fn get_top_posts(&self, count: usize) -> Result<Vec<Item>>;
    fn get_top_posts_by_user(&self, author: &str, count: usize) -> Result<Vec<Item>>;
    fn get_post_counts_by_user(&self) -> Result<HashMap<String, usize>>;
}
