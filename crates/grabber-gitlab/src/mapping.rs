//! GitLab REST documents to domain records
//!
//! GitLab addresses a project by its full path, so `owner` carries the whole
//! namespace (`group/subgroup`) and `name` the project path slug.

use grabber_core::{
    Branch, Commit, CommitAuthor, CommitFile, DocumentExt, Location, PullRequest, Repository,
    WebhookRegistration,
};
use serde_json::Value;

pub(crate) fn repository(doc: &Value) -> Repository {
    let name = doc
        .str_at("path")
        .or_else(|| doc.str_at("name"))
        .unwrap_or_default();
    let activity = doc.str_at("last_activity_at");

    Repository {
        id: doc.str_at("id").unwrap_or_default(),
        name,
        full_name: doc.str_at("path_with_namespace").unwrap_or_default(),
        url: doc.str_at("web_url").unwrap_or_default(),
        description: doc.str_at("description"),
        owner: doc.str_at("namespace.full_path").unwrap_or_default(),
        owner_url: doc.str_at("namespace.web_url"),
        created_at: doc.str_at("created_at"),
        updated_at: doc.str_at("updated_at").or_else(|| activity.clone()),
        pushed_at: activity,
        location: Location::GitLab,
        internal_id: None,
    }
}

pub(crate) fn branch(doc: &Value) -> Branch {
    Branch {
        name: doc.str_at("name").unwrap_or_default(),
        ref_sha: doc.str_at("commit.id").unwrap_or_default(),
    }
}

pub(crate) fn commit_message(doc: &Value) -> String {
    doc.str_at("message").unwrap_or_default()
}

/// GitLab does not resolve committers to users, so only name and email are known
pub(crate) fn commit(sha: &str, doc: &Value, diffs: &[Value]) -> Commit {
    Commit {
        sha: sha.to_string(),
        comment: commit_message(doc),
        url: doc.str_at("web_url"),
        author: CommitAuthor {
            name: doc.str_at("committer_name"),
            email: doc.str_at("committer_email"),
            ..CommitAuthor::default()
        },
        stats: doc.value_at("stats"),
        patch: unified_diff(diffs),
        timestamp: doc.str_at("committed_date"),
        files: diffs.iter().map(file).collect(),
    }
}

fn file(diff: &Value) -> CommitFile {
    let flag = |key: &str| diff.at(key).and_then(Value::as_bool).unwrap_or(false);
    let status = if flag("new_file") {
        "added"
    } else if flag("deleted_file") {
        "removed"
    } else if flag("renamed_file") {
        "renamed"
    } else {
        "modified"
    };

    CommitFile {
        name: diff.str_at("new_path").unwrap_or_default(),
        status: Some(status.to_string()),
        additions: None,
        deletions: None,
        contents_url: None,
    }
}

/// Stitch GitLab's per-file diff documents into one unified diff
pub(crate) fn unified_diff(diffs: &[Value]) -> String {
    let mut out = String::new();

    for diff in diffs {
        let old_path = diff.str_at("old_path").unwrap_or_default();
        let new_path = diff.str_at("new_path").unwrap_or_else(|| old_path.clone());
        let is_new = diff.at("new_file").and_then(Value::as_bool).unwrap_or(false);
        let is_deleted = diff.at("deleted_file").and_then(Value::as_bool).unwrap_or(false);

        out.push_str(&format!("diff --git a/{} b/{}\n", old_path, new_path));
        if is_new {
            if let Some(mode) = diff.str_at("b_mode") {
                out.push_str(&format!("new file mode {}\n", mode));
            }
        }
        if is_deleted {
            if let Some(mode) = diff.str_at("a_mode") {
                out.push_str(&format!("deleted file mode {}\n", mode));
            }
        }

        let body = diff.str_at("diff").unwrap_or_default();
        if body.is_empty() {
            continue;
        }

        let from = if is_new { "/dev/null".to_string() } else { format!("a/{}", old_path) };
        let to = if is_deleted { "/dev/null".to_string() } else { format!("b/{}", new_path) };
        out.push_str(&format!("--- {}\n+++ {}\n", from, to));
        out.push_str(&body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}

pub(crate) fn merge_request(doc: Value) -> PullRequest {
    PullRequest {
        id: doc.str_at("id").unwrap_or_default(),
        number: doc.u64_at("iid"),
        url: doc.str_at("web_url"),
        raw: doc,
    }
}

pub(crate) fn hook(doc: &Value, repository_id: &str, callback_url: &str) -> WebhookRegistration {
    let mut events = Vec::new();
    if doc.at("push_events").and_then(Value::as_bool).unwrap_or(false) {
        events.push("push".to_string());
    }
    if doc
        .at("merge_requests_events")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        events.push("merge_request".to_string());
    }

    WebhookRegistration {
        id: doc.str_at("id").unwrap_or_default(),
        name: doc.str_at("name"),
        events,
        url: doc.str_at("url").unwrap_or_else(|| callback_url.to_string()),
        repository_id: repository_id.to_string(),
    }
}
