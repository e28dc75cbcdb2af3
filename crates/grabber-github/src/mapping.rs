//! GitHub REST documents to domain records

use grabber_core::{
    Branch, Commit, CommitAuthor, CommitFile, DocumentExt, Location, PullRequest, Repository,
    WebhookRegistration,
};
use serde_json::Value;

pub(crate) fn repository(doc: &Value) -> Repository {
    Repository {
        id: doc.str_at("id").unwrap_or_default(),
        name: doc.str_at("name").unwrap_or_default(),
        full_name: doc.str_at("full_name").unwrap_or_default(),
        url: doc.str_at("html_url").unwrap_or_default(),
        description: doc.str_at("description"),
        owner: doc.str_at("owner.login").unwrap_or_default(),
        owner_url: doc.str_at("owner.html_url"),
        created_at: doc.str_at("created_at"),
        pushed_at: doc.str_at("pushed_at"),
        updated_at: doc.str_at("updated_at"),
        location: Location::GitHub,
        internal_id: None,
    }
}

pub(crate) fn branch(doc: &Value) -> Branch {
    Branch {
        name: doc.str_at("name").unwrap_or_default(),
        ref_sha: doc.str_at("commit.sha").unwrap_or_default(),
    }
}

pub(crate) fn commit_message(doc: &Value) -> String {
    doc.str_at("commit.message").unwrap_or_default()
}

/// Build a commit from a detail document, or a list item when the detail
/// fetch failed (list items carry no `stats` or `files`)
pub(crate) fn commit(sha: &str, doc: &Value, patch: String) -> Commit {
    Commit {
        sha: sha.to_string(),
        comment: commit_message(doc),
        url: doc.str_at("html_url"),
        author: CommitAuthor {
            id: doc.str_at("committer.id"),
            name: doc.str_at("commit.committer.name"),
            email: doc.str_at("commit.committer.email"),
            username: doc.str_at("committer.login"),
            avatar_url: doc.str_at("committer.avatar_url"),
            url: doc.str_at("committer.html_url"),
        },
        stats: doc.value_at("stats"),
        patch,
        timestamp: doc.str_at("commit.committer.date"),
        files: files(doc),
    }
}

fn files(doc: &Value) -> Vec<CommitFile> {
    match doc.at("files") {
        Some(Value::Array(files)) => files
            .iter()
            .map(|file| CommitFile {
                name: file.str_at("filename").unwrap_or_default(),
                status: file.str_at("status"),
                additions: file.u64_at("additions"),
                deletions: file.u64_at("deletions"),
                contents_url: file.str_at("contents_url"),
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn pull_request(doc: Value) -> PullRequest {
    PullRequest {
        id: doc.str_at("id").unwrap_or_default(),
        number: doc.u64_at("number"),
        url: doc.str_at("html_url"),
        raw: doc,
    }
}

/// Registration record; the callback URL we sent stands in if GitHub omits `config.url`
pub(crate) fn hook(
    doc: &Value,
    repository_id: &str,
    callback_url: &str,
    requested_events: &[&str],
) -> WebhookRegistration {
    let mut events = doc.strings_at("events");
    if events.is_empty() {
        events = requested_events.iter().map(|e| e.to_string()).collect();
    }

    WebhookRegistration {
        id: doc.str_at("id").unwrap_or_default(),
        name: doc.str_at("name"),
        events,
        url: doc
            .str_at("config.url")
            .unwrap_or_else(|| callback_url.to_string()),
        repository_id: repository_id.to_string(),
    }
}
