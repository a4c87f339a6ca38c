//! Tracing initialisation.
//!
//! One structured subscriber on stderr, filtered through `RUST_LOG` with a
//! quiet default. Kept out of the library path so embedders can install
//! their own subscriber.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops rather than panics,
/// which keeps test binaries that initialise eagerly from tripping over
/// each other.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("octofeed=info"));

    let _already_set = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
