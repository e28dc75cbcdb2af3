//! Provider client construction

use crate::config::GrabberConfig;
use anyhow::{bail, Context, Result};
use grabber_core::{
    Account, CallbackUrlResolver, ClientServices, CommitFilter, Error, GitClient,
    HmacSecretDeriver, HookSecretDeriver, Location, ProviderConfig, Repository, RouteResolver,
};
use grabber_github::GitHubClient;
use grabber_gitlab::GitLabClient;
use secrecy::SecretString;
use std::sync::Arc;

/// Stands in for hook collaborators that were not configured, so read-only
/// commands work without a signing key or callback URL
struct Unconfigured(String);

impl HookSecretDeriver for Unconfigured {
    fn derive(&self, _repository_id: &str) -> grabber_core::Result<SecretString> {
        Err(Error::Config(self.0.clone()))
    }
}

impl CallbackUrlResolver for Unconfigured {
    fn webhook_url(&self, _repository_id: &str) -> grabber_core::Result<String> {
        Err(Error::Config(self.0.clone()))
    }
}

pub fn build_services(config: &GrabberConfig) -> Result<ClientServices> {
    let filter = CommitFilter::from_patterns(&config.provider.issue_patterns)
        .context("Invalid issue_patterns")?;

    let key_env = &config.webhook.signing_key_env;
    let secrets: Arc<dyn HookSecretDeriver> = match std::env::var(key_env) {
        Ok(key) if !key.is_empty() => Arc::new(HmacSecretDeriver::new(SecretString::new(key))?),
        _ => Arc::new(Unconfigured(format!("Webhook signing key not set (export {})", key_env))),
    };

    let callbacks: Arc<dyn CallbackUrlResolver> = match &config.webhook.callback_base_url {
        Some(base) => Arc::new(RouteResolver::new(base)?),
        None => Arc::new(Unconfigured(
            "webhook.callback_base_url is not configured".to_string(),
        )),
    };

    Ok(ClientServices::new(filter, secrets, callbacks))
}

/// Client for `config.location`
pub fn create_client(
    token: &str,
    config: &ProviderConfig,
    services: ClientServices,
) -> Result<Box<dyn GitClient>> {
    let account = Account::new(config.location, token);
    let client: Box<dyn GitClient> = match config.location {
        Location::GitHub => Box::new(GitHubClient::new(account, config, services)?),
        Location::GitLab => Box::new(GitLabClient::new(account, config, services)?),
        Location::Bitbucket => bail!("Bitbucket is not supported yet"),
    };
    Ok(client)
}

/// Parse `owner/name`; the owner keeps any nested group path
pub fn parse_repository(arg: &str, location: Location) -> Result<Repository> {
    match arg.rsplit_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
            Ok(Repository::new(owner, name, location))
        }
        _ => bail!("Repository must be given as owner/name, got '{}'", arg),
    }
}
