//! HTTP transport shared by provider clients
//!
//! Wraps `reqwest::Client` with the provider's auth header, builds URLs from
//! percent-encoded path segments, maps non-success statuses onto the error
//! taxonomy and walks `Link: rel="next"` pagination as a stream.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::rate_limit::{remaining_from_headers, retry_after_from_headers, RateLimitState};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest provider error body quoted in an error message
const MAX_ERROR_BODY: usize = 512;

/// How the access token is attached to each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `PRIVATE-TOKEN: <token>`
    PrivateToken,
}

pub struct HttpTransport {
    base_url: Url,
    client: reqwest::Client,
    token: SecretString,
    auth: AuthScheme,
    json_accept: &'static str,
    per_page: u32,
    rate_limit: RateLimitState,
}

impl HttpTransport {
    /// Build a transport for `config`, using `default_api_url` when none is configured
    pub fn new(
        config: &ProviderConfig,
        default_api_url: &str,
        token: SecretString,
        auth: AuthScheme,
        json_accept: &'static str,
    ) -> Result<Self> {
        let api_url = config.api_url_or(default_api_url);
        let base_url = Url::parse(api_url)
            .map_err(|e| Error::Config(format!("Invalid API URL {}: {}", api_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("API URL {} cannot be a base", api_url)));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            token,
            auth,
            json_accept,
            per_page: config.page_size(),
            rate_limit: RateLimitState::new(),
        })
    }

    /// Rate-limit state as last reported by the provider
    pub fn rate_limit(&self) -> &RateLimitState {
        &self.rate_limit
    }

    /// API URL for `segments`, each percent-encoded as a single path segment
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("API URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Like [`endpoint`](Self::endpoint) with query parameters appended
    pub fn endpoint_with_query(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.endpoint(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub async fn get_json(&self, url: Url) -> Result<Value> {
        let response = self.execute(Method::GET, url, self.json_accept, None).await?;
        Ok(response.json().await?)
    }

    /// Raw body of a GET negotiated with a non-JSON `accept` media type
    pub async fn get_text(&self, url: Url, accept: &str) -> Result<String> {
        let response = self.execute(Method::GET, url, accept, None).await?;
        Ok(response.text().await?)
    }

    /// POST a JSON body; an empty response body reads as `Value::Null`
    pub async fn post_json(&self, url: Url, body: &Value) -> Result<Value> {
        let response = self
            .execute(Method::POST, url, self.json_accept, Some(body))
            .await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn delete(&self, url: Url) -> Result<()> {
        self.execute(Method::DELETE, url, self.json_accept, None)
            .await?;
        Ok(())
    }

    /// Stream every element of a paginated JSON array endpoint
    ///
    /// Pages are requested lazily as the stream is polled, following the
    /// `Link: rel="next"` header until the provider stops sending one.
    pub fn paginate(&self, mut url: Url) -> BoxStream<'_, Result<Value>> {
        url.query_pairs_mut()
            .append_pair("per_page", &self.per_page.to_string());

        stream::try_unfold(Some(url), move |next| async move {
            match next {
                Some(url) => self.fetch_page(url).await.map(Some),
                None => Ok(None),
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, Error>)))
        .try_flatten()
        .boxed()
    }

    async fn fetch_page(&self, url: Url) -> Result<(Vec<Value>, Option<Url>)> {
        let response = self
            .execute(Method::GET, url.clone(), self.json_accept, None)
            .await?;
        let next = next_link(response.headers());
        if let Some(target) = next.as_ref() {
            // The auth header goes with every page request
            if target.origin() != self.base_url.origin() {
                return Err(Error::Transport(format!(
                    "refusing to follow next link {} outside {}",
                    target,
                    self.base_url.origin().ascii_serialization()
                )));
            }
        }
        let items = match response.json::<Value>().await? {
            Value::Array(items) => items,
            other => {
                return Err(Error::Transport(format!(
                    "expected a JSON array from {}, got {}",
                    url,
                    json_kind(&other)
                )))
            }
        };

        debug!(url = %url, items = items.len(), has_next = next.is_some(), "Fetched page");
        Ok((items, next))
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        accept: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        debug!(method = %method, url = %url, "Provider request");

        let mut request = self.authorize(self.client.request(method.clone(), url.clone()));
        request = request.header(ACCEPT, accept);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        self.rate_limit.update_from_headers(response.headers());

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let err = error_for_status(status, &headers, &body);
        warn!(method = %method, url = %url, status = %status, error = %err, "Provider request failed");
        Err(err)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth {
            AuthScheme::Bearer => request.bearer_auth(self.token.expose_secret()),
            AuthScheme::PrivateToken => request.header("PRIVATE-TOKEN", self.token.expose_secret()),
        }
    }
}

/// Stream that yields `err` once, for enumerations that cannot start
pub fn error_stream<'a, T: Send + 'a>(err: Error) -> BoxStream<'a, Result<T>> {
    stream::once(future::ready(Err(err))).boxed()
}

/// Map a non-success provider response onto the error taxonomy
pub fn error_for_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Error {
    let message = format!("{} {}", status, error_message(body));

    match status.as_u16() {
        401 => Error::Authentication(message),
        403 if is_throttled(headers, body) => Error::RateLimited {
            message,
            retry_after: retry_after_from_headers(headers),
        },
        403 => Error::Authentication(message),
        429 => Error::RateLimited {
            message,
            retry_after: retry_after_from_headers(headers),
        },
        404 | 410 => Error::NotFound(message),
        409 | 422 => Error::Conflict(message),
        _ => Error::Transport(message),
    }
}

fn is_throttled(headers: &HeaderMap, body: &str) -> bool {
    if remaining_from_headers(headers) == Some(0) || headers.contains_key("Retry-After") {
        return true;
    }
    let body = body.to_lowercase();
    body.contains("rate limit") || body.contains("abuse")
}

/// Provider's own `message` field when the body is JSON, else the trimmed body
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| match v.get("message") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) if !other.is_null() => Some(other.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &message[..end])
    } else {
        message
    }
}

/// Target of the `rel="next"` entry in a `Link` header
pub fn next_link(headers: &HeaderMap) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim().replace(' ', "");
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
