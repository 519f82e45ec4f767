//! Configuration types for compiling and running searches.

use std::time::Duration;

use labsearch::ConfigurationError;
use serde::Deserialize;

use crate::chunk::{DEFAULT_IN_CHUNK_SIZE, MAX_IN_VALUES};
use crate::policy::SubqueryPolicy;

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Configuration for the search executor.
///
/// # Example
///
/// ```rust
/// use labsearch_executor::{CacheConfig, SearchConfig, SubqueryPolicy};
///
/// let config = SearchConfig::builder()
///     .with_page_size(50)
///     .with_in_chunk_size(1_000)
///     .with_cache(CacheConfig::default())
///     .with_subquery_policy(SubqueryPolicy::TopLevelOrFlagged)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_size, 50);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Rows per page when the search does not ask for a size.
    pub page_size: usize,
    /// Values per membership chunk, at most [`MAX_IN_VALUES`].
    pub in_chunk_size: usize,
    /// Compiled-query cache (None = caching disabled).
    pub cache: Option<CacheConfig>,
    /// Rule deciding when a path opens a new sub-query.
    pub subquery_policy: SubqueryPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            in_chunk_size: DEFAULT_IN_CHUNK_SIZE,
            cache: None,
            subquery_policy: SubqueryPolicy::default(),
        }
    }
}

impl SearchConfig {
    /// Creates a new builder for SearchConfig.
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    /// Parses a configuration from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let config: SearchConfig = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.in_chunk_size == 0 || self.in_chunk_size > MAX_IN_VALUES {
            return Err(ConfigurationError::InvalidConfig(format!(
                "in_chunk_size must be between 1 and {}, got {}",
                MAX_IN_VALUES, self.in_chunk_size
            )));
        }
        if self.page_size == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for SearchConfig.
#[derive(Debug, Clone, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Sets the default page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Sets the membership chunk size.
    pub fn with_in_chunk_size(mut self, in_chunk_size: usize) -> Self {
        self.config.in_chunk_size = in_chunk_size;
        self
    }

    /// Enables caching of compiled queries.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = Some(cache);
        self
    }

    /// Sets the sub-query policy.
    pub fn with_subquery_policy(mut self, policy: SubqueryPolicy) -> Self {
        self.config.subquery_policy = policy;
        self
    }

    /// Builds and validates the SearchConfig.
    pub fn build(self) -> Result<SearchConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the compiled-query cache.
///
/// # Example
///
/// ```rust
/// use labsearch_executor::CacheConfig;
/// use std::time::Duration;
///
/// let cache = CacheConfig {
///     max_entries: 500,
///     ttl: Duration::from_secs(600),
/// };
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached plans.
    pub max_entries: usize,
    /// Time-to-live for cached plans, in seconds when deserialized.
    #[serde(deserialize_with = "deserialize_secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(300),
        }
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
