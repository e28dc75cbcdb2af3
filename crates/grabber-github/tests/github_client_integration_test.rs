//! Integration tests for the GitHub client against an in-process fake API

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use grabber_core::hooks::sign_payload;
use grabber_core::{
    Account, Branch, ClientServices, CommitFilter, Error, GitClient, HmacSecretDeriver,
    HookSecretDeriver, Location, ProviderConfig, PullRequestRequest, Repository, RouteResolver,
};
use grabber_github::GitHubClient;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOKEN: &str = "good-token";
const SIGNING_KEY: &str = "test-signing-key";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";

#[derive(Default)]
struct FakeGitHub {
    refs: Mutex<HashSet<String>>,
    hooks: Mutex<HashMap<u64, Value>>,
    next_hook_id: AtomicU64,
    detail_requests: AtomicUsize,
    patch_requests: AtomicUsize,
    compared: Mutex<Vec<String>>,
}

fn message_for(sha: &str) -> Option<&'static str> {
    match sha {
        "aaa111" => Some("Fix bug"),
        "abc123" => Some("Fix #42 bug"),
        "f1" => Some("Refs #1 first"),
        "f2" => Some("Refs #2 second"),
        "f3" => Some("Refs #3 third"),
        "t1" => Some("Fix #9 throttled"),
        "empty0" => Some("Merge #5 into main"),
        _ => None,
    }
}

fn commit_item(sha: &str) -> Value {
    json!({
        "sha": sha,
        "html_url": format!("https://github.com/acme/widgets/commit/{}", sha),
        "commit": {
            "message": message_for(sha).unwrap_or_default(),
            "committer": {
                "name": "Mona Lisa",
                "email": "mona@example.com",
                "date": "2024-03-01T12:00:00Z"
            }
        },
        "committer": {
            "id": 583231,
            "login": "octocat",
            "avatar_url": "https://avatars.githubusercontent.com/u/583231",
            "html_url": "https://github.com/octocat"
        }
    })
}

fn commit_detail(sha: &str) -> Value {
    let mut doc = commit_item(sha);
    doc["stats"] = json!({ "total": 2, "additions": 1, "deletions": 1 });
    doc["files"] = json!([{
        "filename": "src/lib.rs",
        "status": "modified",
        "additions": 1,
        "deletions": 1,
        "contents_url": "https://api.github.com/repos/acme/widgets/contents/src/lib.rs"
    }]);
    doc
}

fn diff_for(sha: &str) -> String {
    format!(
        "diff --git a/src/lib.rs b/src/lib.rs\n--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1 +1 @@\n-old {}\n+new {}\n",
        sha, sha
    )
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response()
}

fn validation_failed(message: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "message": "Validation Failed", "errors": [{ "message": message }] })),
    )
        .into_response()
}

async fn user(headers: HeaderMap) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if auth == format!("Bearer {}", TOKEN) {
        Json(json!({ "login": "octocat" })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Bad credentials" }))).into_response()
    }
}

async fn user_repos(Query(params): Query<HashMap<String, String>>, headers: HeaderMap) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let repo = |id: u64, owner: &str, name: &str| {
        json!({
            "id": id,
            "name": name,
            "full_name": format!("{}/{}", owner, name),
            "html_url": format!("https://github.com/{}/{}", owner, name),
            "description": "demo",
            "owner": { "login": owner, "html_url": format!("https://github.com/{}", owner) },
            "created_at": "2020-01-01T00:00:00Z",
            "pushed_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        })
    };

    match params.get("page").map(String::as_str) {
        Some("2") => Json(json!([repo(3, "octocat", "hello-world")])).into_response(),
        _ => {
            let link = format!(r#"<http://{}/user/repos?page=2>; rel="next""#, host);
            (
                [(header::LINK, link)],
                Json(json!([repo(1, "acme", "widgets"), repo(2, "acme", "gadgets")])),
            )
                .into_response()
        }
    }
}

async fn branches(Path((owner, name)): Path<(String, String)>) -> Response {
    if owner != "acme" || name != "widgets" {
        return not_found();
    }
    Json(json!([
        { "name": "main", "commit": { "sha": "abc123" } },
        { "name": "dev", "commit": { "sha": "def456" } }
    ]))
    .into_response()
}

async fn list_commits(
    Path((_owner, name)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("sha").map(String::as_str) != Some("main") {
        return Json(json!([])).into_response();
    }
    let shas: &[&str] = match name.as_str() {
        "widgets" => &["aaa111", "abc123"],
        "flaky" => &["f1", "f2", "f3"],
        "throttled" => &["t1"],
        _ => return not_found(),
    };
    Json(Value::Array(shas.iter().map(|s| commit_item(s)).collect())).into_response()
}

async fn show_commit(
    State(state): State<Arc<FakeGitHub>>,
    Path((_owner, name, sha)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if name == "throttled" {
        return (
            StatusCode::FORBIDDEN,
            [("x-ratelimit-remaining", "0"), ("retry-after", "60")],
            Json(json!({ "message": "API rate limit exceeded" })),
        )
            .into_response();
    }
    if message_for(&sha).is_none() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": format!("No commit found for SHA: {}", sha) })),
        )
            .into_response();
    }

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if accept == DIFF_MEDIA_TYPE {
        state.patch_requests.fetch_add(1, Ordering::SeqCst);
        match sha.as_str() {
            "f2" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
            "empty0" => (StatusCode::OK, String::new()).into_response(),
            _ => (StatusCode::OK, diff_for(&sha)).into_response(),
        }
    } else {
        state.detail_requests.fetch_add(1, Ordering::SeqCst);
        Json(commit_detail(&sha)).into_response()
    }
}

async fn compare(
    State(state): State<Arc<FakeGitHub>>,
    Path((_owner, _name, range)): Path<(String, String, String)>,
) -> Response {
    state.compared.lock().unwrap().push(range.clone());
    if range == "abc123...abc123" {
        (StatusCode::OK, String::new()).into_response()
    } else {
        (StatusCode::OK, diff_for("compare")).into_response()
    }
}

async fn create_ref(State(state): State<Arc<FakeGitHub>>, Json(body): Json<Value>) -> Response {
    let reference = body["ref"].as_str().unwrap_or_default().to_string();
    if !state.refs.lock().unwrap().insert(reference.clone()) {
        return validation_failed("Reference already exists");
    }
    (
        StatusCode::CREATED,
        Json(json!({ "ref": reference, "object": { "sha": body["sha"] } })),
    )
        .into_response()
}

async fn create_pull(Json(body): Json<Value>) -> Response {
    if body["head"] == body["base"] {
        return validation_failed("No commits between main and main");
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "id": 1,
            "number": 1347,
            "html_url": "https://github.com/acme/widgets/pull/1347",
            "title": body["title"]
        })),
    )
        .into_response()
}

async fn create_hook(State(state): State<Arc<FakeGitHub>>, Json(body): Json<Value>) -> Response {
    let url = body["config"]["url"].clone();
    let mut hooks = state.hooks.lock().unwrap();
    if hooks.values().any(|h| h["config"]["url"] == url) {
        return validation_failed("Hook already exists on this repository");
    }
    let id = state.next_hook_id.fetch_add(1, Ordering::SeqCst) + 12345678;
    hooks.insert(id, body.clone());
    (
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "name": "web",
            "events": body["events"],
            "active": true,
            "config": { "url": url, "content_type": "json", "insecure_ssl": "0" }
        })),
    )
        .into_response()
}

async fn delete_hook(
    State(state): State<Arc<FakeGitHub>>,
    Path((_owner, _name, id)): Path<(String, String, u64)>,
) -> Response {
    match state.hooks.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

async fn spawn_fake() -> (Arc<FakeGitHub>, String) {
    let state = Arc::new(FakeGitHub::default());
    let router = Router::new()
        .route("/user", get(user))
        .route("/user/repos", get(user_repos))
        .route("/repos/:owner/:name/branches", get(branches))
        .route("/repos/:owner/:name/commits", get(list_commits))
        .route("/repos/:owner/:name/commits/:sha", get(show_commit))
        .route("/repos/:owner/:name/compare/:range", get(compare))
        .route("/repos/:owner/:name/git/refs", post(create_ref))
        .route("/repos/:owner/:name/pulls", post(create_pull))
        .route("/repos/:owner/:name/hooks", post(create_hook))
        .route("/repos/:owner/:name/hooks/:id", delete(delete_hook))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (state, format!("http://{}", addr))
}

fn deriver() -> HmacSecretDeriver {
    HmacSecretDeriver::new(SecretString::new(SIGNING_KEY.to_string())).unwrap()
}

fn client(base: &str, token: &str) -> GitHubClient {
    let services = ClientServices::new(
        CommitFilter::default(),
        Arc::new(deriver()),
        Arc::new(RouteResolver::new("https://hooks.example.com").unwrap()),
    );
    let config = ProviderConfig::new(Location::GitHub).with_api_url(base);
    GitHubClient::new(Account::new(Location::GitHub, token), &config, services).unwrap()
}

fn widgets() -> Repository {
    Repository::new("acme", "widgets", Location::GitHub).with_internal_id("rep_1")
}

#[tokio::test]
async fn test_authenticate() {
    let (_state, base) = spawn_fake().await;

    assert!(client(&base, TOKEN).authenticate().await.unwrap());

    let err = client(&base, "revoked").authenticate().await.unwrap_err();
    assert!(matches!(err, Error::Authentication(ref m) if m.contains("Bad credentials")));
}

#[tokio::test]
async fn test_grab_repositories_follows_pages_and_tags_location() {
    let (_state, base) = spawn_fake().await;

    let repos = client(&base, TOKEN).grab_repositories().await.unwrap();

    let names: Vec<_> = repos.iter().map(|r| r.full_name.as_str()).collect();
    assert_eq!(names, vec!["acme/widgets", "acme/gadgets", "octocat/hello-world"]);
    assert!(repos.iter().all(|r| r.location == Location::GitHub));
    assert_eq!(repos[0].id, "1");
    assert_eq!(repos[0].owner, "acme");
    assert_eq!(repos[0].owner_url.as_deref(), Some("https://github.com/acme"));
    assert_eq!(repos[0].pushed_at.as_deref(), Some("2024-01-01T00:00:00Z"));
}

#[tokio::test]
async fn test_grab_branches() {
    let (_state, base) = spawn_fake().await;
    let client = client(&base, TOKEN);

    let branches = client.grab_branches(&widgets()).await.unwrap();
    assert_eq!(
        branches,
        vec![Branch::new("main", "abc123"), Branch::new("dev", "def456")]
    );

    let missing = Repository::new("acme", "nope", Location::GitHub);
    assert!(matches!(
        client.grab_branches(&missing).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_invalid_repository_fails_before_any_request() {
    let (state, base) = spawn_fake().await;
    let client = client(&base, TOKEN);
    let repo = Repository::new("", "widgets", Location::GitHub);

    assert!(matches!(
        client.grab_branches(&repo).await,
        Err(Error::InvalidRepository(_))
    ));
    assert!(matches!(
        client.grab_commits(&repo, "main").await,
        Err(Error::InvalidRepository(_))
    ));
    assert_eq!(state.detail_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_grab_commits_keeps_only_issue_linked_commits() {
    let (state, base) = spawn_fake().await;

    let commits = client(&base, TOKEN)
        .grab_commits(&widgets(), "main")
        .await
        .unwrap();

    assert_eq!(commits.len(), 1);
    let commit = &commits[0];
    assert_eq!(commit.sha, "abc123");
    assert_eq!(commit.comment, "Fix #42 bug");
    assert!(commit.patch.contains("+new abc123"));
    assert_eq!(commit.author.username.as_deref(), Some("octocat"));
    assert_eq!(commit.author.email.as_deref(), Some("mona@example.com"));
    assert_eq!(commit.stats.as_ref().unwrap()["total"], 2);
    assert_eq!(commit.files.len(), 1);

    // one detail and one patch request for the single surviving commit
    assert_eq!(state.detail_requests.load(Ordering::SeqCst), 1);
    assert_eq!(state.patch_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_patch_failure_degrades_single_commit() {
    let (_state, base) = spawn_fake().await;
    let repo = Repository::new("acme", "flaky", Location::GitHub);

    let commits = client(&base, TOKEN).grab_commits(&repo, "main").await.unwrap();

    let shas: Vec<_> = commits.iter().map(|c| c.sha.as_str()).collect();
    assert_eq!(shas, vec!["f1", "f2", "f3"]);
    assert!(!commits[0].patch.is_empty());
    assert!(commits[1].patch.is_empty());
    assert!(commits[1].stats.is_some());
    assert!(!commits[2].patch.is_empty());
}

#[tokio::test]
async fn test_rate_limit_aborts_listing() {
    let (_state, base) = spawn_fake().await;
    let repo = Repository::new("acme", "throttled", Location::GitHub);
    let client = client(&base, TOKEN);

    let err = client.grab_commits(&repo, "main").await.unwrap_err();

    assert!(matches!(err, Error::RateLimited { .. }));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    assert_eq!(client.rate_limit().remaining(), 0);
}

#[tokio::test]
async fn test_grab_commit() {
    let (_state, base) = spawn_fake().await;
    let client = client(&base, TOKEN);

    let found = client.grab_commit(&widgets(), "abc123").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].sha, "abc123");
    assert!(!found[0].patch.is_empty());

    let filtered = client.grab_commit(&widgets(), "aaa111").await.unwrap();
    assert!(filtered.is_empty());

    let missing = client.grab_commit(&widgets(), "deadbeef").await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_patch_of_unknown_commit_is_not_found() {
    let (_state, base) = spawn_fake().await;

    let err = client(&base, TOKEN)
        .grab_commit_patch("deadbeef", &widgets())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref m) if m.contains("No commit found for SHA: deadbeef")));
}

#[tokio::test]
async fn test_empty_diffs_are_not_errors() {
    let (_state, base) = spawn_fake().await;
    let client = client(&base, TOKEN);

    let diff = client.grab_commit_patch("empty0", &widgets()).await.unwrap();
    assert!(diff.is_empty());

    let diff = client.grab_diff(&widgets(), "abc123", "abc123").await.unwrap();
    assert_eq!(diff, "");
}

#[tokio::test]
async fn test_grab_diff_uses_three_dot_range() {
    let (state, base) = spawn_fake().await;

    let diff = client(&base, TOKEN)
        .grab_diff(&widgets(), "abc123", "def456")
        .await
        .unwrap();

    assert!(diff.starts_with("diff --git"));
    assert_eq!(*state.compared.lock().unwrap(), vec!["abc123...def456".to_string()]);
}

#[tokio::test]
async fn test_make_branch_conflicts_when_it_exists() {
    let (state, base) = spawn_fake().await;
    let client = client(&base, TOKEN);
    let source = Branch::new("main", "abc123");

    let name = client
        .make_branch(&widgets(), &source, "feature/login")
        .await
        .unwrap();
    assert_eq!(name, "feature/login");
    assert!(state.refs.lock().unwrap().contains("refs/heads/feature/login"));

    let err = client
        .make_branch(&widgets(), &source, "feature/login")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_make_pull_request() {
    let (_state, base) = spawn_fake().await;
    let client = client(&base, TOKEN);

    let pr = client
        .make_pull_request(&widgets(), &PullRequestRequest::new("feature", "main", "Add login"))
        .await
        .unwrap();
    assert_eq!(pr.number, Some(1347));
    assert_eq!(pr.url.as_deref(), Some("https://github.com/acme/widgets/pull/1347"));
    assert_eq!(pr.raw["title"], "Add login");

    let err = client
        .make_pull_request(&widgets(), &PullRequestRequest::new("main", "main", "Nothing"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_hook_lifecycle() {
    let (state, base) = spawn_fake().await;
    let client = client(&base, TOKEN);
    let repo = widgets();

    let hook = client.create_repository_hook(&repo).await.unwrap();
    assert_eq!(hook.repository_id, "rep_1");
    assert_eq!(hook.url, "https://hooks.example.com/project/webhook/rep_1");
    assert_eq!(hook.events, vec!["push", "pull_request"]);
    assert_eq!(hook.name.as_deref(), Some("web"));

    // the registered secret is the one recomputable from the internal id
    let expected = deriver().derive("rep_1").unwrap();
    {
        let hooks = state.hooks.lock().unwrap();
        let sent = hooks.values().next().unwrap();
        assert_eq!(sent["config"]["secret"], expected.expose_secret().as_str());
        assert_eq!(sent["config"]["content_type"], "json");
        assert_eq!(sent["config"]["insecure_ssl"], "0");
    }

    let err = client.create_repository_hook(&repo).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    client.delete_repository_hook(&hook.id, &repo).await.unwrap();
    client.delete_repository_hook(&hook.id, &repo).await.unwrap();
    assert!(state.hooks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_verify_hook_delivery() {
    let (_state, base) = spawn_fake().await;
    let client = client(&base, TOKEN);
    let secret = deriver().derive("rep_1").unwrap();
    let payload = br#"{"ref":"refs/heads/main"}"#;

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "X-Hub-Signature-256",
        sign_payload(&secret, payload).unwrap().parse().unwrap(),
    );

    assert!(client.verify_hook_delivery(&headers, payload, &secret).is_ok());
    assert!(matches!(
        client.verify_hook_delivery(&headers, b"{}", &secret),
        Err(Error::InvalidSignature(_))
    ));
}
