//! API registry and selection (C3): a static, read-only catalog scored
//! against the goal and role to pick the top `K` endpoints (§4.5 Step A).

use crate::role::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    None,
    ApiKey,
    Oauth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub name: &'static str,
    pub url: &'static str,
    pub category: &'static str,
    pub keywords: &'static [&'static str],
    pub auth_type: AuthType,
    pub https: bool,
    pub cors: bool,
    /// Static per spec §9 design note: not updated by observed failures (design i).
    pub reliability: f32,
    pub endpoint_patterns: &'static [&'static str],
}

/// Seed catalog (SPEC_FULL §3 "Registry seed data"): a small, realistic
/// spread across general-knowledge, software-docs, and news categories.
pub const REGISTRY: &[ApiEndpoint] = &[
    ApiEndpoint {
        name: "wikipedia",
        url: "https://en.wikipedia.org/w/api.php",
        category: "general_knowledge",
        keywords: &["history", "definition", "biography", "concept", "overview", "explain"],
        auth_type: AuthType::None,
        https: true,
        cors: true,
        reliability: 0.9,
        endpoint_patterns: &["https://simple.wikipedia.org/w/api.php"],
    },
    ApiEndpoint {
        name: "mdn",
        url: "https://developer.mozilla.org/api/v1/search",
        category: "software_docs",
        keywords: &["javascript", "css", "html", "browser", "api", "frontend", "web"],
        auth_type: AuthType::None,
        https: true,
        cors: true,
        reliability: 0.85,
        endpoint_patterns: &[],
    },
    ApiEndpoint {
        name: "crates_io",
        url: "https://crates.io/api/v1/crates",
        category: "software_docs",
        keywords: &["rust", "crate", "cargo", "library", "package", "dependency"],
        auth_type: AuthType::None,
        https: true,
        cors: true,
        reliability: 0.8,
        endpoint_patterns: &[],
    },
    ApiEndpoint {
        name: "hacker_news",
        url: "https://hacker-news.firebaseio.com/v0/topstories.json",
        category: "news",
        keywords: &["news", "trend", "discussion", "launch", "announcement"],
        auth_type: AuthType::None,
        https: true,
        cors: true,
        reliability: 0.6,
        endpoint_patterns: &[],
    },
    ApiEndpoint {
        name: "stackexchange",
        url: "https://api.stackexchange.com/2.3/search/advanced",
        category: "software_docs",
        keywords: &["error", "bug", "exception", "how to", "implement", "debug"],
        auth_type: AuthType::None,
        https: true,
        cors: true,
        reliability: 0.75,
        endpoint_patterns: &[],
    },
    ApiEndpoint {
        name: "worldbank",
        url: "https://api.worldbank.org/v2/country",
        category: "data",
        keywords: &["economy", "statistics", "population", "gdp", "data", "trend"],
        auth_type: AuthType::None,
        https: true,
        cors: true,
        reliability: 0.7,
        endpoint_patterns: &[],
    },
];

/// Role-category affinity bonus (§4.5 Step A): added to the keyword score
/// when the endpoint's category matches the role's natural domain.
fn role_category_bonus(role: Role, category: &str) -> f32 {
    let matches = matches!(
        (role, category),
        (Role::Coder, "software_docs")
            | (Role::Researcher, "general_knowledge")
            | (Role::Researcher, "news")
            | (Role::Analyzer, "data")
            | (Role::Planner, "general_knowledge")
    );
    if matches {
        0.5
    } else {
        0.0
    }
}

fn tokenize(goal: &str) -> Vec<String> {
    goal.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Scores every registry entry against `goal` and `role`, returning the top
/// `k` by descending score (ties broken by registry order, stable sort).
pub fn select_endpoints(goal: &str, role: Role, k: usize) -> Vec<&'static ApiEndpoint> {
    let tokens = tokenize(goal);
    let mut scored: Vec<(f32, &'static ApiEndpoint)> = REGISTRY
        .iter()
        .map(|ep| {
            let keyword_overlap = ep
                .keywords
                .iter()
                .filter(|kw| tokens.iter().any(|t| kw.contains(t.as_str()) || t.contains(*kw)))
                .count() as f32;
            let score = keyword_overlap + role_category_bonus(role, ep.category) + ep.reliability;
            (score, ep)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(k).map(|(_, ep)| ep).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_top_k_entries() {
        let top = select_endpoints("how do I fix this rust cargo build error", Role::Coder, 3);
        assert_eq!(top.len(), 3);
        assert!(top.iter().any(|e| e.name == "crates_io" || e.name == "stackexchange"));
    }

    #[test]
    fn k_larger_than_registry_returns_all() {
        let top = select_endpoints("anything", Role::Planner, 100);
        assert_eq!(top.len(), REGISTRY.len());
    }

    #[test]
    fn reliability_breaks_pure_ties_toward_higher_reliability() {
        let top = select_endpoints("completely unrelated blank query zzz", Role::Synthesizer, 1);
        assert_eq!(top[0].name, "wikipedia");
    }
}
