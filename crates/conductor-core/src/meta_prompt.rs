//! Meta-prompt extraction (C6): regex parsing of `(ROLE:..)(CONTEXT:..)(PROMPT:..)(OUTPUT:..)`
//! and the parallel `(SLIDE_TYPE:..)(SLIDE_CONTENT:..)` shape embedded in todo content.
//!
//! **Open question from spec.md §9, preserved as-is:** the regexes are
//! non-greedy up to the next literal `)`, so a `PROMPT:` body containing
//! parentheses is silently truncated at the first one. This is the source
//! behavior and is kept rather than guessed at; switching to a
//! parenthesis-aware parser would be a breaking change to extraction output.

use crate::role::Role;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// A `(ROLE,CONTEXT,PROMPT,OUTPUT)` spec embedded in a todo, used to spawn a sub-agent (§3, §4.3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetaPrompt {
    pub role_specification: RoleSpec,
    pub context: BTreeMap<String, String>,
    pub instruction: String,
    pub output_requirements: String,
}

/// `role_specification` keeps the raw string alongside the parsed `Role` when it matches
/// a known role name; unrecognized strings are preserved verbatim (forward compatibility).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RoleSpec {
    pub raw: String,
    pub parsed: Option<Role>,
}

/// A `(SLIDE_TYPE,SLIDE_CONTENT[,OUTPUT])` spec, orthogonal to `MetaPrompt` and may coexist (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SlideSpec {
    pub slide_type: String,
    pub slide_content: String,
    pub output_slot: Option<String>,
}

static ROLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\(ROLE:\s*(.*?)\)").unwrap());
static CONTEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\(CONTEXT:\s*(.*?)\)").unwrap());
static PROMPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\(PROMPT:\s*(.*?)\)").unwrap());
static OUTPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\(OUTPUT:\s*(.*?)\)").unwrap());
static SLIDE_TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\(SLIDE_TYPE:\s*(.*?)\)").unwrap());
static SLIDE_CONTENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\(SLIDE_CONTENT:\s*(.*?)\)").unwrap());

/// Extracts a `MetaPrompt` from todo content. Both `ROLE` and `PROMPT` must match; otherwise `None`.
/// `CONTEXT`, when present, is stored under the key `"domain"` (single free-form context field).
pub fn extract_meta_prompt(content: &str) -> Option<MetaPrompt> {
    let role_raw = ROLE_RE.captures(content)?.get(1)?.as_str().trim().to_string();
    let prompt = PROMPT_RE.captures(content)?.get(1)?.as_str().trim().to_string();
    if role_raw.is_empty() || prompt.is_empty() {
        return None;
    }
    let mut context = BTreeMap::new();
    if let Some(c) = CONTEXT_RE.captures(content).and_then(|c| c.get(1)) {
        let v = c.as_str().trim().to_string();
        if !v.is_empty() {
            context.insert("domain".to_string(), v);
        }
    }
    let output_requirements = OUTPUT_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(MetaPrompt {
        role_specification: RoleSpec { parsed: Role::parse(&role_raw), raw: role_raw },
        context,
        instruction: prompt,
        output_requirements,
    })
}

/// Extracts a `SlideSpec` from todo content, independent of `extract_meta_prompt`.
pub fn extract_slide_spec(content: &str) -> Option<SlideSpec> {
    let slide_type = SLIDE_TYPE_RE.captures(content)?.get(1)?.as_str().trim().to_string();
    let slide_content = SLIDE_CONTENT_RE.captures(content)?.get(1)?.as_str().trim().to_string();
    if slide_type.is_empty() || slide_content.is_empty() {
        return None;
    }
    let output_slot = OUTPUT_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s.starts_with("slide_"));
    Some(SlideSpec { slide_type, slide_content, output_slot })
}

/// Renders a `MetaPrompt` back to the canonical `(ROLE:..)(CONTEXT:..)(PROMPT:..)(OUTPUT:..)` form.
/// Used by the round-trip law in spec §8: `extract(render(extract(s))) == extract(s)`.
pub fn render_meta_prompt(mp: &MetaPrompt) -> String {
    let context = mp.context.get("domain").cloned().unwrap_or_default();
    format!(
        "(ROLE:{})(CONTEXT:{})(PROMPT:{})(OUTPUT:{})",
        mp.role_specification.raw, context, mp.instruction, mp.output_requirements
    )
}
