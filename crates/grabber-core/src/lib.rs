//! Grabber Core - provider-independent Git hosting abstraction
//!
//! This crate provides what every provider client shares:
//! - Normalized domain model (repositories, branches, commits, hooks)
//! - The `GitClient` contract
//! - Issue-linkage commit filter
//! - HTTP transport with pagination and rate-limit tracking
//! - Webhook secret derivation and delivery verification

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod model;
pub mod rate_limit;
pub mod transport;

pub use client::{Account, ClientServices, GitClient};
pub use config::ProviderConfig;
pub use document::DocumentExt;
pub use error::{Error, Result};
pub use filter::{is_commit_issue, CommitFilter};
pub use hooks::{CallbackUrlResolver, HmacSecretDeriver, HookSecretDeriver, RouteResolver};
pub use model::{
    Branch, Commit, CommitAuthor, CommitFile, Diff, Location, PullRequest, PullRequestRequest,
    Repository, WebhookRegistration,
};
pub use rate_limit::RateLimitState;
pub use transport::{AuthScheme, HttpTransport};
