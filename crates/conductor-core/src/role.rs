//! Role & meta-prompt engine (C6): role detection, role config, and prompt assembly.

use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cognitive persona assigned once per session (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Coder,
    Critic,
    Researcher,
    Analyzer,
    Synthesizer,
    UiArchitect,
    UiImplementer,
    UiRefiner,
}

/// Fixed tie-break order used by role detection (§4.3).
pub const ROLE_ORDER: &[Role] = &[
    Role::Planner,
    Role::Coder,
    Role::Critic,
    Role::Researcher,
    Role::Analyzer,
    Role::Synthesizer,
    Role::UiArchitect,
    Role::UiImplementer,
    Role::UiRefiner,
];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Coder => "coder",
            Role::Critic => "critic",
            Role::Researcher => "researcher",
            Role::Analyzer => "analyzer",
            Role::Synthesizer => "synthesizer",
            Role::UiArchitect => "ui_architect",
            Role::UiImplementer => "ui_implementer",
            Role::UiRefiner => "ui_refiner",
        }
    }

    /// Parses an explicit role string supplied by the worker (§4.3: "Role selection is advisory").
    pub fn parse(s: &str) -> Option<Self> {
        ROLE_ORDER.iter().copied().find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Role::Planner => &["plan", "roadmap", "milestone", "schedule", "strategy", "steps"],
            Role::Coder => &["implement", "code", "function", "bug", "refactor", "build", "api", "script"],
            Role::Critic => &["review", "critique", "evaluate", "assess", "audit", "flaw"],
            Role::Researcher => &["research", "investigate", "find out", "learn about", "explore", "survey"],
            Role::Analyzer => &["analyze", "data", "metrics", "trend", "statistics", "compare"],
            Role::Synthesizer => &["summarize", "synthesize", "combine", "merge", "consolidate", "report"],
            Role::UiArchitect => &["design system", "information architecture", "wireframe", "ux flow"],
            Role::UiImplementer => &["component", "css", "layout", "frontend", "react", "button", "form"],
            Role::UiRefiner => &["polish", "pixel", "spacing", "accessibility", "responsive", "animation"],
        }
    }
}

/// Static per-role configuration surfaced in prompts so the worker self-regulates (§4.3).
#[derive(Debug, Clone)]
pub struct RoleConfig {
    pub reasoning_multiplier: f32,
    pub focus: &'static str,
    pub suggested_frameworks: &'static [&'static str],
    pub validation_rules: &'static [&'static str],
}

pub fn role_config(role: Role) -> RoleConfig {
    match role {
        Role::Planner => RoleConfig {
            reasoning_multiplier: 2.5,
            focus: "decomposing the objective into an ordered, verifiable task list",
            suggested_frameworks: &["work breakdown structure", "dependency graph"],
            validation_rules: &["every task has an id and a priority", "no cyclic dependencies"],
        },
        Role::Coder => RoleConfig {
            reasoning_multiplier: 2.0,
            focus: "producing working, minimal code changes",
            suggested_frameworks: &["test-first", "small diffs"],
            validation_rules: &["changes compile", "no unrelated refactors"],
        },
        Role::Critic => RoleConfig {
            reasoning_multiplier: 3.0,
            focus: "finding defects before they ship",
            suggested_frameworks: &["adversarial review", "checklist audit"],
            validation_rules: &["every claim is falsifiable", "cite the evidence"],
        },
        Role::Researcher => RoleConfig {
            reasoning_multiplier: 2.5,
            focus: "gathering and triangulating external facts",
            suggested_frameworks: &["source triangulation", "confidence scoring"],
            validation_rules: &["cite sources", "flag contradictions"],
        },
        Role::Analyzer => RoleConfig {
            reasoning_multiplier: 2.5,
            focus: "turning raw data into structured conclusions",
            suggested_frameworks: &["statistical significance", "root-cause analysis"],
            validation_rules: &["numbers are sourced", "no unsupported extrapolation"],
        },
        Role::Synthesizer => RoleConfig {
            reasoning_multiplier: 2.0,
            focus: "condensing many inputs into one coherent answer",
            suggested_frameworks: &["executive summary", "key-point extraction"],
            validation_rules: &["no contradiction is silently dropped"],
        },
        Role::UiArchitect => RoleConfig {
            reasoning_multiplier: 2.5,
            focus: "structuring the information architecture before any pixels",
            suggested_frameworks: &["component hierarchy", "user flow mapping"],
            validation_rules: &["every screen maps to a user goal"],
        },
        Role::UiImplementer => RoleConfig {
            reasoning_multiplier: 2.0,
            focus: "building the approved layout faithfully",
            suggested_frameworks: &["design tokens", "responsive breakpoints"],
            validation_rules: &["matches the approved spec", "keyboard accessible"],
        },
        Role::UiRefiner => RoleConfig {
            reasoning_multiplier: 3.5,
            focus: "pixel-level and interaction-level polish",
            suggested_frameworks: &["visual diffing", "accessibility audit"],
            validation_rules: &["no layout shift", "contrast ratio passes"],
        },
    }
}

/// Scores every role's keyword overlap against the lowercased objective and
/// returns the winner, ties broken by `ROLE_ORDER` (§4.3).
pub fn detect_role(objective: &str) -> Role {
    let lower = objective.to_lowercase();
    let mut best = Role::Planner;
    let mut best_score = -1i32;
    for &role in ROLE_ORDER {
        let score: i32 = role
            .keywords()
            .iter()
            .map(|kw| lower.matches(kw).count() as i32)
            .sum();
        if score > best_score {
            best_score = score;
            best = role;
        }
    }
    best
}

fn base_phase_prompt(phase: Phase) -> &'static str {
    match phase {
        Phase::Init => "Acknowledge the objective and prepare to interpret it.",
        Phase::Query => "Interpret the user's objective precisely. Produce `interpreted_goal`.",
        Phase::Enhance => "Enrich the interpreted goal with missing detail and constraints. Produce `enhanced_goal`.",
        Phase::Knowledge => "Gather and synthesize relevant external knowledge before planning.",
        Phase::Plan => "Produce an ordered, verifiable task list (`plan_created`, `current_todos`).",
        Phase::Execute => "Execute the current task. Report `execution_success` and `more_tasks_pending`.",
        Phase::Verify => "Verify completion against the task list and report `verification_passed`.",
        Phase::Done => "The objective is complete.",
    }
}

fn role_enhancement(role: Role, _phase: Phase) -> String {
    let cfg = role_config(role);
    format!(
        "You are operating as {role} (reasoning multiplier {mult:.1}). Focus: {focus}. \
         Suggested frameworks: {frameworks}. Validation rules: {rules}.",
        role = role.as_str(),
        mult = cfg.reasoning_multiplier,
        focus = cfg.focus,
        frameworks = cfg.suggested_frameworks.join(", "),
        rules = cfg.validation_rules.join("; "),
    )
}

/// Assembles the worker-facing prompt for `phase` (§4.3):
/// `base_phase_prompt + role_enhancement + phase_context`, with `{{session_id}}`
/// substituted.
pub fn assemble_prompt(
    phase: Phase,
    role: Role,
    session_id: &str,
    context_block: &str,
) -> String {
    let base = base_phase_prompt(phase);
    let enhancement = role_enhancement(role, phase);
    let raw = format!("{base}\n\n{enhancement}\n\n{context_block}");
    raw.replace("{{session_id}}", session_id)
}

/// Builds the phase-context block from selected payload keys (§4.1 step 2).
/// `payload` is an open string-keyed map; only recognized keys relevant to
/// `phase` are surfaced, in a stable order.
pub fn phase_context(phase: Phase, payload: &BTreeMap<String, serde_json::Value>) -> String {
    let keys: &[&str] = match phase {
        Phase::Enhance => &["interpreted_goal"],
        Phase::Knowledge => &["enhanced_goal"],
        Phase::Plan => &[
            "enhanced_goal",
            "knowledge_gathered",
            "synthesized_knowledge",
            "knowledge_confidence",
        ],
        Phase::Execute => &["plan_created", "current_todos", "current_task_index"],
        Phase::Verify => &["current_todos", "execution_success", "more_tasks_pending"],
        _ if payload.contains_key("verification_failure_reason") => &[
            "verification_failure_reason",
            "last_completion_percentage",
        ],
        _ => &[],
    };
    let mut lines = Vec::new();
    for key in keys {
        if let Some(v) = payload.get(*key) {
            lines.push(format!("{key}: {v}"));
        }
    }
    if payload.contains_key("verification_failure_reason") && !matches!(phase, Phase::Plan | Phase::Execute) {
        if let Some(v) = payload.get("verification_failure_reason") {
            lines.push(format!("verification_failure_reason: {v}"));
        }
        if let Some(v) = payload.get("last_completion_percentage") {
            lines.push(format!("last_completion_percentage: {v}"));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_coder_role() {
        assert_eq!(detect_role("implement a login form and fix the bug"), Role::Coder);
    }

    #[test]
    fn ties_break_to_fixed_order() {
        // "plan" and "implement" both present once; planner comes first in ROLE_ORDER.
        assert_eq!(detect_role("plan then implement the feature"), Role::Planner);
    }

    #[test]
    fn explicit_role_override_parses() {
        assert_eq!(Role::parse("Critic"), Some(Role::Critic));
        assert_eq!(Role::parse("not_a_role"), None);
    }

    #[test]
    fn prompt_substitutes_session_id() {
        let ctx = BTreeMap::new();
        let p = assemble_prompt(Phase::Query, Role::Researcher, "s1", "{{session_id}} context");
        assert!(p.contains("s1 context"));
    }
}
