//! Request budget reported by the provider
//!
//! GitHub sends `X-RateLimit-*` headers and GitLab the unprefixed
//! `RateLimit-*` ones. The last reported budget is kept for callers that pace
//! themselves; requests are never delayed or replayed here.

use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sentinel for "no budget reported yet"
const UNREPORTED: u64 = u64::MAX;

#[derive(Debug)]
struct Window {
    remaining: AtomicU64,
    /// Unix seconds; 0 until reported
    resets_at: AtomicU64,
}

/// Budget handle; clones observe the same window
#[derive(Debug, Clone)]
pub struct RateLimitState {
    window: Arc<Window>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            window: Arc::new(Window {
                remaining: AtomicU64::new(UNREPORTED),
                resets_at: AtomicU64::new(0),
            }),
        }
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests left in the window, `u64::MAX` while the provider has said nothing
    pub fn remaining(&self) -> u64 {
        self.window.remaining.load(Ordering::Relaxed)
    }

    pub fn reset_at(&self) -> u64 {
        self.window.resets_at.load(Ordering::Relaxed)
    }

    /// Record whatever budget headers `headers` carries; absent or malformed ones leave the state alone
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        if let Some(left) = remaining_from_headers(headers) {
            self.window.remaining.store(left, Ordering::Relaxed);
        }
        if let Some(at) = reset_from_headers(headers) {
            self.window.resets_at.store(at, Ordering::Relaxed);
        }
    }

    pub fn time_until_reset(&self) -> Option<Duration> {
        match self.reset_at() {
            0 => None,
            at => Some(Duration::from_secs(at.saturating_sub(now_unix()))),
        }
    }
}

fn header_u64(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

pub(crate) fn remaining_from_headers(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, &["X-RateLimit-Remaining", "RateLimit-Remaining"])
}

fn reset_from_headers(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, &["X-RateLimit-Reset", "RateLimit-Reset"])
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Retry hint carried by a throttled response
///
/// `Retry-After` (seconds) wins; otherwise the distance to the reported
/// window reset.
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_u64(headers, &["Retry-After"]) {
        return Some(Duration::from_secs(secs));
    }
    reset_from_headers(headers).map(|reset| Duration::from_secs(reset.saturating_sub(now_unix())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_remaining_is_max() {
        let state = RateLimitState::new();
        assert_eq!(state.remaining(), u64::MAX);
        assert_eq!(state.time_until_reset(), None);
    }

    #[test]
    fn update_from_github_headers() {
        let state = RateLimitState::new();

        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", "42".parse().unwrap());
        headers.insert("X-RateLimit-Reset", "1700000000".parse().unwrap());
        state.update_from_headers(&headers);

        assert_eq!(state.remaining(), 42);
        assert_eq!(state.reset_at(), 1_700_000_000);
    }

    #[test]
    fn update_from_gitlab_headers() {
        let state = RateLimitState::new();

        let mut headers = HeaderMap::new();
        headers.insert("RateLimit-Remaining", "7".parse().unwrap());
        state.update_from_headers(&headers);

        assert_eq!(state.remaining(), 7);
    }

    #[test]
    fn garbage_headers_are_ignored() {
        let state = RateLimitState::new();

        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", "lots".parse().unwrap());
        state.update_from_headers(&headers);

        assert_eq!(state.remaining(), u64::MAX);
    }

    #[test]
    fn clones_share_state() {
        let state = RateLimitState::new();
        let clone = state.clone();

        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", "3".parse().unwrap());
        clone.update_from_headers(&headers);

        assert_eq!(state.remaining(), 3);
    }

    #[test]
    fn retry_after_prefers_explicit_header() {
        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", "120".parse().unwrap());
        headers.insert("X-RateLimit-Reset", "1".parse().unwrap());
        assert_eq!(retry_after_from_headers(&headers), Some(Duration::from_secs(120)));
    }

    #[test]
    fn retry_after_from_past_reset_is_zero() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Reset", "1".parse().unwrap());
        assert_eq!(retry_after_from_headers(&headers), Some(Duration::ZERO));
        assert_eq!(retry_after_from_headers(&HeaderMap::new()), None);
    }
}
