//! Event normalisation and feed aggregation.
//!
//! Raw events from the upstream feed are enriched (fork status,
//! pull-request detail), normalised into [`ActivityItem`]s, deduplicated by
//! permalink, and sorted newest-first into an [`ActivityResponse`].

pub mod aggregate;
pub mod models;
pub mod normalise;
pub mod resolve;

pub use aggregate::{Aggregator, AggregatorOptions};
pub use models::{
    ActivityActor, ActivityItem, ActivityKind, ActivityRepo, ActivityResponse, ReviewState,
    summarise,
};
pub use normalise::normalise;
pub use resolve::{ForkResolver, PullRequestResolver, resolver_limiter};
