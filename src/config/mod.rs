//! Application configuration loaded from CLI, environment, and files.
//!
//! One struct merges values from command-line arguments, environment
//! variables, and configuration files through ortho-config's layered
//! approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in application defaults
//! 2. **Configuration file** – `.octofeed.toml` in current directory, home
//!    directory, or XDG config directory
//! 3. **Environment variables** – `OCTOFEED_USERNAME`, `OCTOFEED_TOKEN`, or
//!    legacy `GITHUB_TOKEN`
//! 4. **Command-line arguments** – `--username`/`-u` and friends
//!
//! # Configuration File
//!
//! Place `.octofeed.toml` in the current directory, home directory, or XDG
//! config directory with:
//!
//! ```toml
//! username = "octocat"
//! token = "ghp_example"
//! bind_address = "127.0.0.1:8080"
//! max_age_seconds = 60
//! stale_while_revalidate_seconds = 300
//! ```

use std::env;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::AggregatorOptions;
use crate::cache::CachePolicy;
use crate::github::GITHUB_API_BASE;

/// Configuration failures surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No username was provided by any configuration source.
    #[error("a GitHub username is required (use --username or -u, or OCTOFEED_USERNAME)")]
    MissingUsername,

    /// A provided value failed validation.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What was wrong with the value.
        message: String,
    },
}

/// Service configuration supporting CLI, environment, and file sources.
///
/// # Environment Variables
///
/// - `OCTOFEED_USERNAME` or `--username`: GitHub user whose feed is served
/// - `OCTOFEED_TOKEN`, `GITHUB_TOKEN`, or `--token`: Authentication token
/// - `OCTOFEED_BIND_ADDRESS` or `--bind-address`: Listen address
/// - `OCTOFEED_API_BASE` or `--api-base`: Upstream API base URL
///
/// # Example
///
/// ```no_run
/// use octofeed::OctofeedConfig;
/// use ortho_config::OrthoConfig;
///
/// let config = OctofeedConfig::load().expect("failed to load configuration");
/// let username = config.require_username().expect("username required");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "OCTOFEED",
    discovery(
        dotfile_name = ".octofeed.toml",
        config_file_name = "octofeed.toml",
        app_name = "octofeed"
    )
)]
pub struct OctofeedConfig {
    /// GitHub user whose public activity is aggregated and served.
    ///
    /// Can be provided via:
    /// - CLI: `--username <NAME>` or `-u <NAME>`
    /// - Environment: `OCTOFEED_USERNAME`
    /// - Config file: `username = "..."`
    #[ortho_config(cli_short = 'u')]
    pub username: Option<String>,

    /// Personal access token for GitHub API authentication.
    ///
    /// Optional: the public events endpoint works unauthenticated, at a far
    /// lower rate limit.
    ///
    /// Can be provided via:
    /// - CLI: `--token <TOKEN>` or `-t <TOKEN>`
    /// - Environment: `OCTOFEED_TOKEN` or `GITHUB_TOKEN` (legacy)
    /// - Config file: `token = "..."`
    #[ortho_config(cli_short = 't')]
    pub token: Option<String>,

    /// Socket address the HTTP server listens on.
    #[ortho_config()]
    pub bind_address: String,

    /// Upstream API base URL. Overridden in tests; the default is the
    /// public GitHub API.
    #[ortho_config()]
    pub api_base: String,

    /// Page budget per full aggregation run.
    #[ortho_config()]
    pub max_pages: u32,

    /// Events requested per page.
    #[ortho_config()]
    pub per_page: u32,

    /// Item cap for the full feed.
    #[ortho_config()]
    pub feed_limit: usize,

    /// Item cap for the preview endpoint.
    #[ortho_config()]
    pub preview_limit: usize,

    /// Seconds a cached response is served without revalidation.
    #[ortho_config()]
    pub max_age_seconds: u64,

    /// Additional seconds a stale response is served while a background
    /// refresh runs.
    #[ortho_config()]
    pub stale_while_revalidate_seconds: u64,

    /// Bound on concurrent enrichment lookups per run.
    #[ortho_config()]
    pub resolver_concurrency: usize,

    /// Per-call upstream timeout in seconds.
    #[ortho_config()]
    pub upstream_timeout_seconds: u64,
}

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

impl Default for OctofeedConfig {
    fn default() -> Self {
        Self {
            username: None,
            token: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_owned(),
            api_base: GITHUB_API_BASE.to_owned(),
            max_pages: crate::github::events::DEFAULT_MAX_PAGES,
            per_page: crate::github::events::DEFAULT_PER_PAGE,
            feed_limit: 30,
            preview_limit: 10,
            max_age_seconds: 60,
            stale_while_revalidate_seconds: 300,
            resolver_concurrency: crate::activity::resolve::DEFAULT_RESOLVER_CONCURRENCY,
            upstream_timeout_seconds: crate::github::client::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl OctofeedConfig {
    /// Returns the configured username or an error if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingUsername`] when no source provides one.
    pub fn require_username(&self) -> Result<&str, ConfigError> {
        self.username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or(ConfigError::MissingUsername)
    }

    /// Resolves the token from configuration or the legacy `GITHUB_TOKEN`
    /// environment variable. `None` means unauthenticated access.
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| env::var("GITHUB_TOKEN").ok())
    }

    /// Cache freshness windows derived from the configured seconds.
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            max_age: Duration::from_secs(self.max_age_seconds),
            stale_while_revalidate: Duration::from_secs(self.stale_while_revalidate_seconds),
        }
    }

    /// Aggregation tuning derived from the configured limits.
    #[must_use]
    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            max_pages: self.max_pages,
            per_page: self.per_page,
            limit: self.feed_limit,
            preview_limit: self.preview_limit,
        }
    }

    /// Validates cross-field constraints not expressible per field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero page or item budgets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.per_page == 0 || self.max_pages == 0 {
            return Err(ConfigError::Invalid {
                message: "per_page and max_pages must be at least 1".to_owned(),
            });
        }
        if self.feed_limit == 0 || self.preview_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "feed_limit and preview_limit must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}
