//! GitHub REST API client

use crate::mapping;
use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use grabber_core::hooks::verify_hmac_signature;
use grabber_core::transport::error_stream;
use grabber_core::{
    Account, AuthScheme, Branch, ClientServices, Commit, Diff, DocumentExt, Error, GitClient,
    HttpTransport, Location, ProviderConfig, PullRequest, PullRequestRequest, RateLimitState,
    Repository, Result, WebhookRegistration,
};
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";
const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const HOOK_EVENTS: [&str; 2] = ["push", "pull_request"];

/// GitHub client bound to one access token
pub struct GitHubClient {
    transport: HttpTransport,
    services: ClientServices,
    concurrency: usize,
}

/// GitHub answers an unknown commit SHA with 422 rather than 404
fn refine_commit_lookup(err: Error) -> Error {
    match err {
        Error::Conflict(message) if message.contains("No commit found") => Error::NotFound(message),
        other => other,
    }
}

impl GitHubClient {
    /// Create a client for `account`, which must be tagged as GitHub
    pub fn new(account: Account, config: &ProviderConfig, services: ClientServices) -> Result<Self> {
        if account.location != Location::GitHub {
            return Err(Error::Config(format!(
                "GitHub client cannot serve a {} account",
                account.location
            )));
        }

        let transport = HttpTransport::new(
            config,
            DEFAULT_API_URL,
            account.access_token,
            AuthScheme::Bearer,
            JSON_MEDIA_TYPE,
        )?;

        Ok(Self {
            transport,
            services,
            concurrency: config.hydration_concurrency(),
        })
    }

    /// Rate-limit headroom as last reported by GitHub
    pub fn rate_limit(&self) -> &RateLimitState {
        self.transport.rate_limit()
    }

    async fn commit_detail(&self, owner: &str, name: &str, sha: &str) -> Result<Value> {
        let url = self
            .transport
            .endpoint(&["repos", owner, name, "commits", sha])?;
        self.transport.get_json(url).await.map_err(refine_commit_lookup)
    }

    /// Detail and patch for one listed commit
    ///
    /// Only auth and rate-limit failures propagate; anything else degrades
    /// this commit alone.
    async fn hydrate(&self, repository: &Repository, item: Value) -> Result<Commit> {
        let (owner, name) = repository.coordinates()?;
        let sha = item.str_at("sha").unwrap_or_default();

        let detail = match self.commit_detail(owner, name, &sha).await {
            Ok(detail) => Some(detail),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(repository = %repository.full_name, sha = %sha, error = %e, "Commit detail unavailable, using list entry");
                None
            }
        };

        let patch = self.patch_or_empty(&sha, repository).await?;

        Ok(mapping::commit(&sha, detail.as_ref().unwrap_or(&item), patch))
    }

    async fn patch_or_empty(&self, sha: &str, repository: &Repository) -> Result<String> {
        match self.grab_commit_patch(sha, repository).await {
            Ok(diff) => Ok(diff.patch),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(repository = %repository.full_name, sha = %sha, error = %e, "Commit patch unavailable");
                Ok(String::new())
            }
        }
    }
}

#[async_trait]
impl GitClient for GitHubClient {
    fn location(&self) -> Location {
        Location::GitHub
    }

    async fn authenticate(&self) -> Result<bool> {
        let user = self.transport.get_json(self.transport.endpoint(&["user"])?).await?;
        debug!(login = ?user.str_at("login"), "Authenticated with GitHub");
        Ok(true)
    }

    fn repositories(&self) -> BoxStream<'_, Result<Repository>> {
        match self.transport.endpoint(&["user", "repos"]) {
            Ok(url) => self
                .transport
                .paginate(url)
                .map_ok(|doc| mapping::repository(&doc))
                .boxed(),
            Err(e) => error_stream(e),
        }
    }

    async fn grab_branches(&self, repository: &Repository) -> Result<Vec<Branch>> {
        let (owner, name) = repository.coordinates()?;
        let url = self.transport.endpoint(&["repos", owner, name, "branches"])?;

        self.transport
            .paginate(url)
            .map_ok(|doc| mapping::branch(&doc))
            .try_collect()
            .await
    }

    fn commits<'a>(
        &'a self,
        repository: &'a Repository,
        branch: &'a str,
    ) -> BoxStream<'a, Result<Commit>> {
        let url = repository.coordinates().and_then(|(owner, name)| {
            self.transport.endpoint_with_query(
                &["repos", owner, name, "commits"],
                &[("sha", branch)],
            )
        });
        let url = match url {
            Ok(url) => url,
            Err(e) => return error_stream(e),
        };

        let filter = self.services.filter.clone();
        self.transport
            .paginate(url)
            .try_filter(move |item| {
                let relevant = filter.is_relevant(&mapping::commit_message(item));
                if !relevant {
                    trace!(sha = ?item.str_at("sha"), "Skipping commit without issue reference");
                }
                future::ready(relevant)
            })
            .map_ok(move |item| self.hydrate(repository, item))
            .try_buffered(self.concurrency)
            .boxed()
    }

    async fn grab_commit(&self, repository: &Repository, sha: &str) -> Result<Vec<Commit>> {
        let (owner, name) = repository.coordinates()?;

        // The detail endpoint is complete, so a single fetch serves both the
        // filter and the record.
        let detail = match self.commit_detail(owner, name, sha).await {
            Ok(detail) => detail,
            Err(Error::NotFound(_)) => {
                debug!(repository = %repository.full_name, sha = %sha, "Commit not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if !self.services.filter.is_relevant(&mapping::commit_message(&detail)) {
            trace!(sha = %sha, "Skipping commit without issue reference");
            return Ok(Vec::new());
        }

        let sha = detail.str_at("sha").unwrap_or_else(|| sha.to_string());
        let patch = self.patch_or_empty(&sha, repository).await?;

        Ok(vec![mapping::commit(&sha, &detail, patch)])
    }

    async fn grab_commit_patch(&self, sha: &str, repository: &Repository) -> Result<Diff> {
        let (owner, name) = repository.coordinates()?;
        let url = self
            .transport
            .endpoint(&["repos", owner, name, "commits", sha])?;

        let patch = self
            .transport
            .get_text(url, DIFF_MEDIA_TYPE)
            .await
            .map_err(refine_commit_lookup)?;
        Ok(Diff::new(patch))
    }

    async fn make_pull_request(
        &self,
        repository: &Repository,
        request: &PullRequestRequest,
    ) -> Result<PullRequest> {
        let (owner, name) = repository.coordinates()?;
        let url = self.transport.endpoint(&["repos", owner, name, "pulls"])?;

        let response = self
            .transport
            .post_json(
                url,
                &json!({
                    "title": request.title,
                    "head": request.source_branch,
                    "base": request.target_branch,
                }),
            )
            .await?;

        let pr = mapping::pull_request(response);
        info!(repository = %repository.full_name, number = ?pr.number, "Pull request created");
        Ok(pr)
    }

    async fn make_branch(
        &self,
        repository: &Repository,
        source_branch: &Branch,
        title: &str,
    ) -> Result<String> {
        let (owner, name) = repository.coordinates()?;
        let url = self
            .transport
            .endpoint(&["repos", owner, name, "git", "refs"])?;

        self.transport
            .post_json(
                url,
                &json!({
                    "ref": format!("refs/heads/{}", title),
                    "sha": source_branch.ref_sha,
                }),
            )
            .await?;

        info!(repository = %repository.full_name, branch = %title, from = %source_branch.ref_sha, "Branch created");
        Ok(title.to_string())
    }

    async fn grab_diff(
        &self,
        repository: &Repository,
        first_commit: &str,
        second_commit: &str,
    ) -> Result<String> {
        let (owner, name) = repository.coordinates()?;
        let range = format!("{}...{}", first_commit, second_commit);
        let url = self
            .transport
            .endpoint(&["repos", owner, name, "compare", &range])?;

        self.transport.get_text(url, DIFF_MEDIA_TYPE).await
    }

    async fn create_repository_hook_request(
        &self,
        repository: &Repository,
    ) -> Result<WebhookRegistration> {
        let (owner, name) = repository.coordinates()?;
        let repository_id = repository.internal_id()?;
        let callback_url = self.services.callbacks.webhook_url(repository_id)?;
        let secret = self.services.secrets.derive(repository_id)?;

        let url = self.transport.endpoint(&["repos", owner, name, "hooks"])?;
        let response = self
            .transport
            .post_json(
                url,
                &json!({
                    "name": "web",
                    "events": HOOK_EVENTS,
                    "active": true,
                    "config": {
                        "url": callback_url,
                        "content_type": "json",
                        "secret": secret.expose_secret(),
                        "insecure_ssl": "0",
                    },
                }),
            )
            .await?;

        Ok(mapping::hook(&response, repository_id, &callback_url, &HOOK_EVENTS))
    }

    async fn delete_repository_hook_request(&self, id: &str, repository: &Repository) -> Result<()> {
        let (owner, name) = repository.coordinates()?;
        let url = self
            .transport
            .endpoint(&["repos", owner, name, "hooks", id])?;
        self.transport.delete(url).await
    }

    fn verify_hook_delivery(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        secret: &SecretString,
    ) -> Result<()> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::InvalidSignature(format!("missing {} header", SIGNATURE_HEADER)))?;

        verify_hmac_signature(secret, body, signature)
    }
}
