//! Knowledge synthesis (C5): collapses a vector of `FetchResult` into one
//! answer with a monotone confidence score (§4.5 Step C).
//!
//! The algorithm is deliberately under-specified by the contract; this
//! follows the reference sketch in spec.md §9: concatenate bodies with
//! source tags, weight confidence by mean reliability of the succeeding
//! sources scaled by the success ratio.

use crate::knowledge::fetch::FetchResult;
use crate::knowledge::registry::ApiEndpoint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedKnowledge {
    pub answer: String,
    pub contradictions: Vec<String>,
    pub confidence: f32,
}

const FALLBACK_ANSWER: &str =
    "No external source could be reached; manual research tools are required to proceed.";

/// Synthesizes the fetch results, given the endpoints in the same order they
/// were requested (for reliability lookup and source tagging).
pub fn synthesize(results: &[FetchResult], endpoints: &[&'static ApiEndpoint], max_answer_len: usize) -> SynthesizedKnowledge {
    let successes: Vec<(&FetchResult, &&ApiEndpoint)> = results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| endpoints.iter().find(|e| e.name == r.endpoint).map(|e| (r, e)))
        .collect();

    if successes.is_empty() {
        return SynthesizedKnowledge {
            answer: FALLBACK_ANSWER.to_string(),
            contradictions: Vec::new(),
            confidence: 0.0,
        };
    }

    let mut sections = Vec::with_capacity(successes.len());
    for (result, endpoint) in &successes {
        let snippet = result
            .body
            .as_ref()
            .map(|b| summarize_body(b))
            .unwrap_or_default();
        sections.push(format!("[{}] {}", endpoint.name, snippet));
    }
    let mut answer = sections.join("\n");
    if answer.chars().count() > max_answer_len {
        answer = answer.chars().take(max_answer_len).collect::<String>() + "... [truncated]";
    }

    let mean_reliability: f32 =
        successes.iter().map(|(_, e)| e.reliability).sum::<f32>() / successes.len() as f32;
    let success_ratio = successes.len() as f32 / results.len().max(1) as f32;
    let confidence = (mean_reliability * success_ratio).clamp(0.0, 1.0);

    let contradictions = detect_contradictions(&successes);

    SynthesizedKnowledge { answer, contradictions, confidence }
}

fn summarize_body(body: &serde_json::Value) -> String {
    match body {
        serde_json::Value::String(s) => s.chars().take(400).collect(),
        other => {
            let rendered = other.to_string();
            rendered.chars().take(400).collect()
        }
    }
}

/// Flags sources whose bodies differ wildly in size as a coarse contradiction
/// signal; a real implementation would diff extracted claims, but the
/// contract only requires a possibly-empty list of human-readable strings.
fn detect_contradictions(successes: &[(&FetchResult, &&ApiEndpoint)]) -> Vec<String> {
    if successes.len() < 2 {
        return Vec::new();
    }
    let sizes: Vec<usize> = successes.iter().map(|(r, _)| r.size).collect();
    let max = *sizes.iter().max().unwrap();
    let min = *sizes.iter().min().unwrap();
    if max > 0 && min == 0 {
        vec!["one or more sources returned an empty body while others returned content".to_string()]
    } else {
        Vec::new()
    }
}
