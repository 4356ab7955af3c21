//! Memoization of context bundles keyed by request content.

mod memory;
mod response;

pub use memory::MemoryCacheStore;
pub use response::{CacheConfig, InvalidationScope, ResponseCache};
