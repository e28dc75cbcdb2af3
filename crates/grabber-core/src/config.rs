//! Provider client configuration

use crate::model::Location;
use serde::{Deserialize, Serialize};

/// Default timeout for provider API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Largest page size both GitHub and GitLab accept
pub const MAX_PER_PAGE: u32 = 100;

/// Settings shared by every provider client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub location: Location,
    /// API root; the provider's public endpoint when unset
    pub api_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    pub per_page: u32,
    /// Number of commits hydrated concurrently during `grab_commits`
    pub concurrency: usize,
    pub user_agent: String,
    /// Issue-linkage patterns; the built-in set is used when empty
    pub issue_patterns: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            location: Location::GitHub,
            api_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: 10,
            per_page: MAX_PER_PAGE,
            concurrency: 4,
            user_agent: "grabber".to_string(),
            issue_patterns: Vec::new(),
        }
    }
}

impl ProviderConfig {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Configured API root, falling back to `default`
    pub fn api_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.api_url.as_deref().unwrap_or(default)
    }

    /// Page size clamped to what providers accept
    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// Hydration concurrency, at least one
    pub fn hydration_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}
