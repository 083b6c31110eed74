//! Bounded-concurrency HTTP fetch (C4): rate limit → SSRF guard → GET with
//! retry/alternate-endpoint fallback → truncation (§4.5 Step B).
//!
//! The semaphore-bounded fan-out is grounded in the pack's multi-model eval
//! runner, which caps concurrent provider calls the same way; everything
//! downstream of that (retry policy, truncation, error classification) is
//! this crate's own, built to the §4.5 contract.

use crate::config::ConductorConfig;
use crate::error::FetchError;
use crate::knowledge::registry::ApiEndpoint;
use crate::knowledge::ratelimit::RateLimiter;
use crate::knowledge::ssrf::sanitize_url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub endpoint: String,
    pub index: usize,
    pub success: bool,
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub size: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub corrected: bool,
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

/// Truncates `s` to `max_chars`, appending a marker describing how much was dropped.
fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars).collect();
    let dropped = s.chars().count() - max_chars;
    format!("{kept}... [truncated, {dropped} more chars]")
}

/// Recursively truncates a JSON value so the result stays valid JSON while
/// bounding string length and array/object breadth (§4.5 Step B.4).
fn truncate_json(value: Value, max_chars: usize, max_items: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_string(&s, max_chars)),
        Value::Array(items) => {
            let total = items.len();
            let mut kept: Vec<Value> = items
                .into_iter()
                .take(max_items)
                .map(|v| truncate_json(v, max_chars, max_items))
                .collect();
            if total > max_items {
                kept.push(Value::String(format!("_truncated: {} more", total - max_items)));
            }
            Value::Array(kept)
        }
        Value::Object(map) => {
            let total = map.len();
            let mut out = serde_json::Map::new();
            for (k, v) in map.into_iter().take(max_items) {
                out.insert(k, truncate_json(v, max_chars, max_items));
            }
            if total > max_items {
                out.insert(
                    "_truncated".to_string(),
                    Value::String(format!("{} more keys", total - max_items)),
                );
            }
            Value::Object(out)
        }
        other => other,
    }
}

/// Classifies a `reqwest::Error` into the §4.5 error taxonomy.
fn classify_transport_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = err.status() {
        FetchError::Http4xx5xx(status.as_u16())
    } else {
        FetchError::Network(err.to_string())
    }
}

async fn attempt_get(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_headers: usize,
) -> Result<(u16, Vec<(String, String)>, Value, usize), FetchError> {
    let resp = tokio::time::timeout(timeout, client.get(url).send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(|e| classify_transport_error(&e))?;

    let status = resp.status();
    let headers: Vec<(String, String)> = resp
        .headers()
        .iter()
        .take(max_headers)
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    if status.is_server_error() {
        return Err(FetchError::Http4xx5xx(status.as_u16()));
    }

    let bytes = resp.bytes().await.map_err(|e| classify_transport_error(&e))?;
    let size = bytes.len();
    if status.is_client_error() {
        return Err(FetchError::Http4xx5xx(status.as_u16()));
    }
    let body = serde_json::from_slice::<Value>(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
    Ok((status.as_u16(), headers, body, size))
}

/// Fetches one endpoint with rate limiting, SSRF guard, retry-with-backoff,
/// and alternate-endpoint fallback (§4.5 Step B points 1-5).
async fn fetch_one(
    client: &reqwest::Client,
    endpoint: &ApiEndpoint,
    index: usize,
    cfg: &ConductorConfig,
    rate_limiter: &RateLimiter,
    max_retries: u32,
) -> FetchResult {
    let start = std::time::Instant::now();
    let mut candidates = Vec::with_capacity(1 + endpoint.endpoint_patterns.len());
    candidates.push(endpoint.url);
    candidates.extend(endpoint.endpoint_patterns.iter().copied());

    let mut last_error: Option<FetchError> = None;
    for (attempt_idx, candidate_url) in candidates.iter().enumerate() {
        let corrected = attempt_idx > 0;

        let host = match host_of(candidate_url) {
            Some(h) => h,
            None => {
                last_error = Some(FetchError::SsrfBlocked(crate::error::SsrfError::MissingHost));
                continue;
            }
        };
        if !rate_limiter.can_make_request(
            &host,
            cfg.rate_limit_requests_per_minute,
            cfg.rate_limit_window_ms,
        ) {
            warn!(target: "conductor::knowledge::fetch", %host, "rate limited");
            return FetchResult {
                endpoint: endpoint.name.to_string(),
                index,
                success: false,
                status: None,
                headers: Vec::new(),
                body: None,
                size: 0,
                duration_ms: start.elapsed().as_millis() as u64,
                error: Some("rate_limit".to_string()),
                corrected: false,
            };
        }

        let sanitized = if cfg.enable_ssrf_protection {
            match sanitize_url(candidate_url, &cfg.allowed_hosts) {
                Ok(u) => u,
                Err(e) => {
                    warn!(target: "conductor::knowledge::fetch", %host, error = %e, "ssrf blocked");
                    return FetchResult {
                        endpoint: endpoint.name.to_string(),
                        index,
                        success: false,
                        status: None,
                        headers: Vec::new(),
                        body: None,
                        size: 0,
                        duration_ms: start.elapsed().as_millis() as u64,
                        error: Some("ssrf_blocked".to_string()),
                        corrected: false,
                    };
                }
            }
        } else {
            candidate_url.to_string()
        };

        let timeout = Duration::from_millis(cfg.knowledge_timeout_ms);
        for retry in 0..=max_retries {
            match attempt_get(client, &sanitized, timeout, 10).await {
                Ok((status, headers, body, size)) => {
                    let truncated = truncate_json(body, cfg.knowledge_max_response_size, 50);
                    info!(target: "conductor::knowledge::fetch", %host, status, corrected, "fetch succeeded");
                    return FetchResult {
                        endpoint: endpoint.name.to_string(),
                        index,
                        success: true,
                        status: Some(status),
                        headers,
                        body: Some(truncated),
                        size,
                        duration_ms: start.elapsed().as_millis() as u64,
                        error: None,
                        corrected,
                    };
                }
                Err(e) => {
                    last_error = Some(e);
                    if retry < max_retries {
                        let backoff = Duration::from_millis(500 * 2u64.pow(retry));
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
    }

    let err = last_error.unwrap_or(FetchError::Unknown("no candidates attempted".to_string()));
    FetchResult {
        endpoint: endpoint.name.to_string(),
        index,
        success: false,
        status: None,
        headers: Vec::new(),
        body: None,
        size: 0,
        duration_ms: start.elapsed().as_millis() as u64,
        error: Some(err.to_string()),
        corrected: false,
    }
}

/// Runs `fetch_one` over every endpoint, bounded by `cfg.knowledge_max_concurrency`
/// concurrent in-flight requests (§4.5 Step B, §5).
pub async fn fetch_all(
    client: &reqwest::Client,
    endpoints: &[&'static ApiEndpoint],
    cfg: &ConductorConfig,
    rate_limiter: Arc<RateLimiter>,
) -> Vec<FetchResult> {
    let semaphore = Arc::new(Semaphore::new(cfg.knowledge_max_concurrency));
    let max_retries = 2u32;

    let mut tasks = Vec::with_capacity(endpoints.len());
    for (index, endpoint) in endpoints.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let client = client.clone();
        let cfg = cfg.clone();
        let rate_limiter = Arc::clone(&rate_limiter);
        let endpoint = *endpoint;
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            fetch_one(&client, endpoint, index, &cfg, &rate_limiter, max_retries).await
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(r) => results.push(r),
            Err(e) => warn!(target: "conductor::knowledge::fetch", error = %e, "fetch task panicked"),
        }
    }
    results.sort_by_key(|r| r.index);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_string_appends_marker_when_over_limit() {
        let s = "a".repeat(20);
        let out = truncate_string(&s, 5);
        assert!(out.starts_with("aaaaa"));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn truncate_string_is_noop_under_limit() {
        assert_eq!(truncate_string("short", 100), "short");
    }

    #[test]
    fn truncate_json_array_preserves_validity_over_limit() {
        let arr = Value::Array((0..10).map(Value::from).collect());
        let out = truncate_json(arr, 1000, 3);
        let items = out.as_array().unwrap();
        assert_eq!(items.len(), 4); // 3 kept + sentinel
        assert!(items.last().unwrap().as_str().unwrap().contains("more"));
    }

    #[test]
    fn truncate_json_object_preserves_validity_over_limit() {
        let mut map = serde_json::Map::new();
        for i in 0..5 {
            map.insert(format!("k{i}"), Value::Bool(true));
        }
        let out = truncate_json(Value::Object(map), 1000, 2);
        let obj = out.as_object().unwrap();
        assert_eq!(obj.len(), 3); // 2 kept + _truncated
        assert!(obj.contains_key("_truncated"));
    }
}
