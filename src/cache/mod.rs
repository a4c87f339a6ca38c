//! Edge caching: store abstraction, freshness policy, and serve protocol.

pub mod edge;
pub mod policy;
pub mod store;

pub use edge::{CacheState, EdgeCache, Served, StoredResponse};
pub use policy::{CachePolicy, Freshness};
pub use store::{CacheStore, MemoryStore};
