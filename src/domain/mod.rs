pub mod item;
pub mod rate_limit;

pub use item::Item;
pub use rate_limit::RateLimit;
