//! GitLab REST API (v4) client

use crate::mapping;
use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use grabber_core::hooks::verify_shared_token;
use grabber_core::transport::error_stream;
use grabber_core::{
    Account, AuthScheme, Branch, ClientServices, Commit, Diff, DocumentExt, Error, GitClient,
    HttpTransport, Location, ProviderConfig, PullRequest, PullRequestRequest, RateLimitState,
    Repository, Result, WebhookRegistration,
};
use reqwest::header::HeaderMap;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";

const JSON_MEDIA_TYPE: &str = "application/json";
const TOKEN_HEADER: &str = "X-Gitlab-Token";

/// GitLab client bound to one personal or OAuth access token
pub struct GitLabClient {
    transport: HttpTransport,
    services: ClientServices,
    concurrency: usize,
}

/// GitLab reports some duplicates as a plain 400
fn refine(err: Error) -> Error {
    match err {
        Error::Transport(message) if message.starts_with("400") => {
            let lower = message.to_lowercase();
            if lower.contains("already exists") || lower.contains("has already been taken") {
                Error::Conflict(message)
            } else {
                Error::Transport(message)
            }
        }
        other => other,
    }
}

impl GitLabClient {
    /// Create a client for `account`, which must be tagged as GitLab
    pub fn new(account: Account, config: &ProviderConfig, services: ClientServices) -> Result<Self> {
        if account.location != Location::GitLab {
            return Err(Error::Config(format!(
                "GitLab client cannot serve a {} account",
                account.location
            )));
        }

        let transport = HttpTransport::new(
            config,
            DEFAULT_API_URL,
            account.access_token,
            AuthScheme::PrivateToken,
            JSON_MEDIA_TYPE,
        )?;

        Ok(Self {
            transport,
            services,
            concurrency: config.hydration_concurrency(),
        })
    }

    pub fn rate_limit(&self) -> &RateLimitState {
        self.transport.rate_limit()
    }

    /// Project-scoped URL; the `owner/name` path is sent as one encoded id segment
    fn project_url(&self, repository: &Repository, rest: &[&str]) -> Result<Url> {
        self.project_url_with_query(repository, rest, &[])
    }

    fn project_url_with_query(
        &self,
        repository: &Repository,
        rest: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url> {
        let (owner, name) = repository.coordinates()?;
        let id = format!("{}/{}", owner, name);
        let mut segments = vec!["projects", id.as_str()];
        segments.extend_from_slice(rest);
        self.transport.endpoint_with_query(&segments, query)
    }

    async fn commit_detail(&self, repository: &Repository, sha: &str) -> Result<Value> {
        let url = self.project_url(repository, &["repository", "commits", sha])?;
        self.transport.get_json(url).await
    }

    async fn commit_diffs(&self, repository: &Repository, sha: &str) -> Result<Vec<Value>> {
        let url = self.project_url(repository, &["repository", "commits", sha, "diff"])?;
        self.transport.paginate(url).try_collect().await
    }

    /// Per-file diffs of one commit; only auth and rate-limit failures propagate
    async fn diffs_or_empty(&self, repository: &Repository, sha: &str) -> Result<Vec<Value>> {
        match self.commit_diffs(repository, sha).await {
            Ok(diffs) => Ok(diffs),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(repository = %repository.full_name, sha = %sha, error = %e, "Commit diff unavailable");
                Ok(Vec::new())
            }
        }
    }

    async fn hydrate(&self, repository: &Repository, item: Value) -> Result<Commit> {
        let sha = item.str_at("id").unwrap_or_default();

        let detail = match self.commit_detail(repository, &sha).await {
            Ok(detail) => Some(detail),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(repository = %repository.full_name, sha = %sha, error = %e, "Commit detail unavailable, using list entry");
                None
            }
        };

        let diffs = self.diffs_or_empty(repository, &sha).await?;

        Ok(mapping::commit(&sha, detail.as_ref().unwrap_or(&item), &diffs))
    }

    async fn existing_hook(&self, repository: &Repository, callback_url: &str) -> Result<Option<Value>> {
        let url = self.project_url(repository, &["hooks"])?;
        let mut hooks = self.transport.paginate(url);
        while let Some(hook) = hooks.try_next().await? {
            if hook.str_at("url").as_deref() == Some(callback_url) {
                return Ok(Some(hook));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl GitClient for GitLabClient {
    fn location(&self) -> Location {
        Location::GitLab
    }

    async fn authenticate(&self) -> Result<bool> {
        let user = self.transport.get_json(self.transport.endpoint(&["user"])?).await?;
        debug!(username = ?user.str_at("username"), "Authenticated with GitLab");
        Ok(true)
    }

    fn repositories(&self) -> BoxStream<'_, Result<Repository>> {
        match self
            .transport
            .endpoint_with_query(&["projects"], &[("membership", "true")])
        {
            Ok(url) => self
                .transport
                .paginate(url)
                .map_ok(|doc| mapping::repository(&doc))
                .boxed(),
            Err(e) => error_stream(e),
        }
    }

    async fn grab_branches(&self, repository: &Repository) -> Result<Vec<Branch>> {
        let url = self.project_url(repository, &["repository", "branches"])?;

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
        let url = match self.project_url_with_query(
            repository,
            &["repository", "commits"],
            &[("ref_name", branch)],
        ) {
            Ok(url) => url,
            Err(e) => return error_stream(e),
        };

        let filter = self.services.filter.clone();
        self.transport
            .paginate(url)
            .try_filter(move |item| {
                let relevant = filter.is_relevant(&mapping::commit_message(item));
                if !relevant {
                    trace!(sha = ?item.str_at("id"), "Skipping commit without issue reference");
                }
                future::ready(relevant)
            })
            .map_ok(move |item| self.hydrate(repository, item))
            .try_buffered(self.concurrency)
            .boxed()
    }

    async fn grab_commit(&self, repository: &Repository, sha: &str) -> Result<Vec<Commit>> {
        let detail = match self.commit_detail(repository, sha).await {
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

        let sha = detail.str_at("id").unwrap_or_else(|| sha.to_string());
        let diffs = self.diffs_or_empty(repository, &sha).await?;

        Ok(vec![mapping::commit(&sha, &detail, &diffs)])
    }

    async fn grab_commit_patch(&self, sha: &str, repository: &Repository) -> Result<Diff> {
        let diffs = self.commit_diffs(repository, sha).await?;
        Ok(Diff::new(mapping::unified_diff(&diffs)))
    }

    async fn make_pull_request(
        &self,
        repository: &Repository,
        request: &PullRequestRequest,
    ) -> Result<PullRequest> {
        let url = self.project_url(repository, &["merge_requests"])?;

        let response = self
            .transport
            .post_json(
                url,
                &json!({
                    "title": request.title,
                    "source_branch": request.source_branch,
                    "target_branch": request.target_branch,
                }),
            )
            .await
            .map_err(refine)?;

        let mr = mapping::merge_request(response);
        info!(repository = %repository.full_name, iid = ?mr.number, "Merge request created");
        Ok(mr)
    }

    async fn make_branch(
        &self,
        repository: &Repository,
        source_branch: &Branch,
        title: &str,
    ) -> Result<String> {
        let url = self.project_url(repository, &["repository", "branches"])?;

        self.transport
            .post_json(
                url,
                &json!({
                    "branch": title,
                    "ref": source_branch.ref_sha,
                }),
            )
            .await
            .map_err(refine)?;

        info!(repository = %repository.full_name, branch = %title, from = %source_branch.ref_sha, "Branch created");
        Ok(title.to_string())
    }

    async fn grab_diff(
        &self,
        repository: &Repository,
        first_commit: &str,
        second_commit: &str,
    ) -> Result<String> {
        let url = self.project_url_with_query(
            repository,
            &["repository", "compare"],
            &[("from", first_commit), ("to", second_commit)],
        )?;

        let comparison = self.transport.get_json(url).await?;
        let diffs: &[Value] = match comparison.at("diffs") {
            Some(Value::Array(diffs)) => diffs.as_slice(),
            _ => &[],
        };
        Ok(mapping::unified_diff(diffs))
    }

    async fn create_repository_hook_request(
        &self,
        repository: &Repository,
    ) -> Result<WebhookRegistration> {
        let repository_id = repository.internal_id()?;
        let callback_url = self.services.callbacks.webhook_url(repository_id)?;

        // GitLab accepts duplicate hooks for the same URL, so check first
        if self.existing_hook(repository, &callback_url).await?.is_some() {
            return Err(Error::Conflict(format!(
                "hook for {} already registered on {}",
                callback_url, repository.full_name
            )));
        }

        let secret = self.services.secrets.derive(repository_id)?;
        let url = self.project_url(repository, &["hooks"])?;
        let response = self
            .transport
            .post_json(
                url,
                &json!({
                    "url": callback_url,
                    "token": secret.expose_secret(),
                    "push_events": true,
                    "merge_requests_events": true,
                    "enable_ssl_verification": true,
                }),
            )
            .await
            .map_err(refine)?;

        Ok(mapping::hook(&response, repository_id, &callback_url))
    }

    async fn delete_repository_hook_request(&self, id: &str, repository: &Repository) -> Result<()> {
        let url = self.project_url(repository, &["hooks", id])?;
        self.transport.delete(url).await
    }

    fn verify_hook_delivery(
        &self,
        headers: &HeaderMap,
        _body: &[u8],
        secret: &SecretString,
    ) -> Result<()> {
        let token = headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::InvalidSignature(format!("missing {} header", TOKEN_HEADER)))?;

        verify_shared_token(secret, token)
    }
}
