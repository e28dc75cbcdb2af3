//! Normalized domain model
//!
//! Every provider client maps its native documents into these records. They are
//! read-through projections: nothing here is cached or persisted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Hosting provider a record originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    Bitbucket,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" | "git_hub" | "github.com" => Ok(Self::GitHub),
            "gitlab" | "git_lab" | "gitlab.com" => Ok(Self::GitLab),
            "bitbucket" | "bitbucket.org" => Ok(Self::Bitbucket),
            _ => Err(format!("Unknown provider location: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Provider-native identifier
    pub id: String,
    pub name: String,
    pub full_name: String,
    pub url: String,
    pub description: Option<String>,
    /// Owner login (GitHub) or namespace path (GitLab)
    pub owner: String,
    pub owner_url: Option<String>,
    pub created_at: Option<String>,
    pub pushed_at: Option<String>,
    pub updated_at: Option<String>,
    pub location: Location,
    /// Identifier assigned by the caller's own storage, used for webhook secrets
    #[serde(default, rename = "_id", skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
}

impl Repository {
    /// Minimal repository addressed by owner and name
    pub fn new(owner: impl Into<String>, name: impl Into<String>, location: Location) -> Self {
        let owner = owner.into();
        let name = name.into();
        Self {
            id: String::new(),
            full_name: format!("{}/{}", owner, name),
            name,
            url: String::new(),
            description: None,
            owner,
            owner_url: None,
            created_at: None,
            pushed_at: None,
            updated_at: None,
            location,
            internal_id: None,
        }
    }

    pub fn with_internal_id(mut self, internal_id: impl Into<String>) -> Self {
        self.internal_id = Some(internal_id.into());
        self
    }

    /// Owner and name, both required to address the repository remotely
    pub fn coordinates(&self) -> Result<(&str, &str)> {
        if self.owner.trim().is_empty() || self.name.trim().is_empty() {
            return Err(Error::InvalidRepository(format!(
                "owner and name are required (got owner={:?}, name={:?})",
                self.owner, self.name
            )));
        }
        Ok((self.owner.as_str(), self.name.as_str()))
    }

    pub fn internal_id(&self) -> Result<&str> {
        self.internal_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::InvalidRepository(format!(
                    "{} has no internal identifier",
                    self.full_name
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    /// Commit the branch currently points to
    #[serde(rename = "ref")]
    pub ref_sha: String,
}

impl Branch {
    pub fn new(name: impl Into<String>, ref_sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ref_sha: ref_sha.into(),
        }
    }
}

/// Committer identity; providers often cannot resolve it to a registered user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitAuthor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFile {
    pub name: String,
    pub status: Option<String>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub contents_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub sha: String,
    pub comment: String,
    pub url: Option<String>,
    pub author: CommitAuthor,
    /// Provider-reported change statistics, passed through as-is
    pub stats: Option<serde_json::Value>,
    /// Unified diff, empty when retrieval failed
    pub patch: String,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub patch: String,
}

impl Diff {
    pub fn new(patch: impl Into<String>) -> Self {
        Self {
            patch: patch.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
}

impl PullRequestRequest {
    pub fn new(
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_branch: source_branch.into(),
            target_branch: target_branch.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: String,
    pub number: Option<u64>,
    pub url: Option<String>,
    /// Provider-native response document
    pub raw: serde_json::Value,
}

/// A provider webhook bound to one of the caller's repositories
///
/// The signing secret is write-only and never part of this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub id: String,
    pub name: Option<String>,
    pub events: Vec<String>,
    pub url: String,
    pub repository_id: String,
}
