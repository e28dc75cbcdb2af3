//! CLI configuration file

use anyhow::{Context, Result};
use grabber_core::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/grabber/config.toml";
pub const DEFAULT_SIGNING_KEY_ENV: &str = "GRABBER_SIGNING_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabberConfig {
    pub provider: ProviderConfig,
    pub webhook: WebhookConfig,
}

/// Where hook deliveries go and how their secrets are keyed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub callback_base_url: Option<String>,
    /// Environment variable holding the signing key; the key itself never lives in the file
    pub signing_key_env: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            callback_base_url: None,
            signing_key_env: DEFAULT_SIGNING_KEY_ENV.to_string(),
        }
    }
}

impl GrabberConfig {
    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing default file yields the defaults; an explicitly named file must exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let explicit = path.is_some();
        let path = PathBuf::from(shellexpand::tilde(path.unwrap_or(DEFAULT_CONFIG_PATH)).to_string());

        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        debug!(path = %path.display(), location = %config.provider.location, "Loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grabber_core::Location;

    #[test]
    fn test_parse_full_file() {
        let config: GrabberConfig = toml::from_str(
            r#"
            [provider]
            location = "gitlab"
            api_url = "https://gitlab.example.com/api/v4"
            concurrency = 8
            issue_patterns = ["JIRA-\\d+"]

            [webhook]
            callback_base_url = "https://hooks.example.com"
            signing_key_env = "MY_KEY"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.location, Location::GitLab);
        assert_eq!(config.provider.concurrency, 8);
        assert_eq!(config.provider.per_page, 100);
        assert_eq!(config.provider.issue_patterns, vec!["JIRA-\\d+"]);
        assert_eq!(config.webhook.signing_key_env, "MY_KEY");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: GrabberConfig = toml::from_str("").unwrap();
        assert_eq!(config.provider.location, Location::GitHub);
        assert_eq!(config.webhook.callback_base_url, None);
        assert_eq!(config.webhook.signing_key_env, DEFAULT_SIGNING_KEY_ENV);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(GrabberConfig::load(Some("/nonexistent/grabber.toml")).is_err());
    }
}
