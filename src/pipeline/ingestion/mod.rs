// Pipeline ingestion: paged contact stores, caching and rate limiting

pub mod cache;
pub mod rate_limiter;
pub mod store;

pub use cache::TtlCache;
pub use rate_limiter::{Limits, RateLimiter};
pub use store::{fetch_all, CachedContactStore, ContactStore, InMemoryContactStore, JsonFileContactStore};
