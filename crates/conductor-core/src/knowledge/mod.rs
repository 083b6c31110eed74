//! Knowledge auto-connection (C3-C5): API selection, bounded-concurrency
//! fetch, and confidence-scored synthesis, triggered once per session on
//! entry to KNOWLEDGE (§4.5).

pub mod fetch;
pub mod ratelimit;
pub mod registry;
pub mod ssrf;
pub mod synthesize;

use crate::config::ConductorConfig;
use crate::role::Role;
use fetch::{fetch_all, FetchResult};
use ratelimit::RateLimiter;
use registry::select_endpoints;
use serde::{Deserialize, Serialize};
use synthesize::{synthesize, SynthesizedKnowledge};

const TOP_K_ENDPOINTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoConnectionResult {
    pub api_discovery_results: Vec<FetchResult>,
    pub synthesized: SynthesizedKnowledge,
    pub successful: bool,
}

/// Runs the full KNOWLEDGE pipeline: select → fetch → synthesize (§4.5).
/// Never fails the caller: a total fetch wipeout still returns a valid
/// result with `successful = false` and the documented fallback answer.
pub async fn auto_connect(
    client: &reqwest::Client,
    goal: &str,
    role: Role,
    cfg: &ConductorConfig,
    rate_limiter: std::sync::Arc<RateLimiter>,
) -> AutoConnectionResult {
    if !cfg.auto_connection_enabled {
        return AutoConnectionResult {
            api_discovery_results: Vec::new(),
            synthesized: SynthesizedKnowledge {
                answer: "Knowledge auto-connection is disabled by configuration.".to_string(),
                contradictions: Vec::new(),
                confidence: 0.0,
            },
            successful: false,
        };
    }

    let endpoints = select_endpoints(goal, role, TOP_K_ENDPOINTS);
    let results = fetch_all(client, &endpoints, cfg, rate_limiter).await;
    let synthesized = synthesize(&results, &endpoints, cfg.knowledge_max_response_size);
    let successful = results.iter().any(|r| r.success);

    tracing::info!(
        target: "conductor::knowledge",
        endpoints = endpoints.len(),
        successes = results.iter().filter(|r| r.success).count(),
        confidence = synthesized.confidence,
        "knowledge auto-connection complete"
    );

    AutoConnectionResult { api_discovery_results: results, synthesized, successful }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_config_short_circuits_without_fetching() {
        let mut cfg = ConductorConfig::default();
        cfg.auto_connection_enabled = false;
        let client = reqwest::Client::new();
        let rl = std::sync::Arc::new(RateLimiter::new());
        let out = auto_connect(&client, "build a login form", Role::Coder, &cfg, rl).await;
        assert!(!out.successful);
        assert!(out.api_discovery_results.is_empty());
    }
}
