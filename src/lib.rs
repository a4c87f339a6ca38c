//! Octofeed: an edge-cached aggregation service for a GitHub user's public
//! activity.
//!
//! The library fetches the user's public events feed page by page, filters
//! out activity in forked repositories, enriches trimmed pull-request
//! payloads, and normalises everything into a deduplicated, newest-first
//! feed. A stale-while-revalidate cache with lease-based stampede control
//! sits between the pipeline and the HTTP surface, so readers get a fast
//! answer even while upstream is slow, rate limited, or down.

pub mod activity;
pub mod cache;
pub mod config;
pub mod github;
pub mod server;
pub mod telemetry;

pub use activity::{ActivityItem, ActivityResponse, Aggregator, AggregatorOptions};
pub use cache::{CachePolicy, CacheState, EdgeCache, MemoryStore};
pub use config::{ConfigError, OctofeedConfig};
pub use github::{GitHubError, GitHubErrorKind, UpstreamClient, UpstreamClientConfig};
pub use server::{AppState, router};
