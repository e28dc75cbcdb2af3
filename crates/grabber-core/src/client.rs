//! Git client abstraction
//!
//! Provides the common trait every hosting provider implements, plus the
//! collaborators injected into each provider client.

use crate::error::{Error, Result};
use crate::filter::CommitFilter;
use crate::hooks::{CallbackUrlResolver, HookSecretDeriver};
use crate::model::{
    Branch, Commit, Diff, Location, PullRequest, PullRequestRequest, Repository,
    WebhookRegistration,
};
use async_trait::async_trait;
use futures::stream::{BoxStream, TryStreamExt};
use reqwest::header::HeaderMap;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

/// Access token and provider tag supplied by the tenant/account layer
pub struct Account {
    pub location: Location,
    pub access_token: SecretString,
}

impl Account {
    pub fn new(location: Location, access_token: impl Into<String>) -> Self {
        Self {
            location,
            access_token: SecretString::new(access_token.into()),
        }
    }
}

/// Provider-independent collaborators shared by all clients
#[derive(Clone)]
pub struct ClientServices {
    pub filter: Arc<CommitFilter>,
    pub secrets: Arc<dyn HookSecretDeriver>,
    pub callbacks: Arc<dyn CallbackUrlResolver>,
}

impl ClientServices {
    pub fn new(
        filter: CommitFilter,
        secrets: Arc<dyn HookSecretDeriver>,
        callbacks: Arc<dyn CallbackUrlResolver>,
    ) -> Self {
        Self {
            filter: Arc::new(filter),
            secrets,
            callbacks,
        }
    }
}

/// Trait that all hosting providers must implement
///
/// Read operations (`grab_*`, the streams) never mutate remote state. Only
/// `make_pull_request`, `make_branch` and the hook lifecycle do.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Provider tag stamped on every repository this client returns
    fn location(&self) -> Location;

    /// Check the attached token against the provider
    async fn authenticate(&self) -> Result<bool>;

    /// Repositories visible to the authenticated principal, page by page
    fn repositories(&self) -> BoxStream<'_, Result<Repository>>;

    async fn grab_repositories(&self) -> Result<Vec<Repository>> {
        self.repositories().try_collect().await
    }

    async fn grab_branches(&self, repository: &Repository) -> Result<Vec<Branch>>;

    /// Issue-linked commits reachable from `branch`, each with detail and patch
    ///
    /// Output follows the provider's list order.
    fn commits<'a>(
        &'a self,
        repository: &'a Repository,
        branch: &'a str,
    ) -> BoxStream<'a, Result<Commit>>;

    async fn grab_commits(&self, repository: &Repository, branch: &str) -> Result<Vec<Commit>> {
        self.commits(repository, branch).try_collect().await
    }

    /// The commit `sha` if it exists and is issue-linked, else an empty list
    async fn grab_commit(&self, repository: &Repository, sha: &str) -> Result<Vec<Commit>>;

    async fn grab_commit_patch(&self, sha: &str, repository: &Repository) -> Result<Diff>;

    async fn make_pull_request(
        &self,
        repository: &Repository,
        request: &PullRequestRequest,
    ) -> Result<PullRequest>;

    /// Create branch `title` at `source_branch.ref`, returning its name
    async fn make_branch(
        &self,
        repository: &Repository,
        source_branch: &Branch,
        title: &str,
    ) -> Result<String>;

    /// Unified diff between two commits
    async fn grab_diff(
        &self,
        repository: &Repository,
        first_commit: &str,
        second_commit: &str,
    ) -> Result<String>;

    /// Register push and pull/merge-request deliveries for `repository`
    async fn create_repository_hook(&self, repository: &Repository) -> Result<WebhookRegistration> {
        let registration = self.create_repository_hook_request(repository).await?;
        info!(
            location = %self.location(),
            repository = %repository.full_name,
            hook_id = %registration.id,
            "Repository hook created"
        );
        Ok(registration)
    }

    /// Remove a hook; one that is already gone counts as removed
    async fn delete_repository_hook(&self, id: &str, repository: &Repository) -> Result<()> {
        match self.delete_repository_hook_request(id, repository).await {
            Ok(()) => {
                info!(
                    location = %self.location(),
                    repository = %repository.full_name,
                    hook_id = %id,
                    "Repository hook removed"
                );
                Ok(())
            }
            Err(Error::NotFound(message)) => {
                warn!(
                    repository = %repository.full_name,
                    hook_id = %id,
                    reason = %message,
                    "Repository hook already removed"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Provider call behind [`create_repository_hook`](Self::create_repository_hook)
    async fn create_repository_hook_request(
        &self,
        repository: &Repository,
    ) -> Result<WebhookRegistration>;

    /// Provider call behind [`delete_repository_hook`](Self::delete_repository_hook)
    async fn delete_repository_hook_request(&self, id: &str, repository: &Repository) -> Result<()>;

    /// Check an inbound delivery against the repository's derived secret
    fn verify_hook_delivery(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        secret: &SecretString,
    ) -> Result<()>;
}
