//! Session record (§3) and the open payload map it accumulates.

use crate::phase::Phase;
use crate::role::Role;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static SESSION_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").unwrap());

/// Validates a `session_id` against `^[A-Za-z0-9_-]{1,128}$` (§3).
pub fn is_valid_session_id(id: &str) -> bool {
    SESSION_ID_RE.is_match(id)
}

/// The open string-keyed map accumulating per-phase outputs (§3). Unknown keys
/// are preserved verbatim for forward compatibility.
pub type Payload = BTreeMap<String, serde_json::Value>;

/// Per-`session_id` durable record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub current_phase: Phase,
    pub initial_objective: String,
    pub detected_role: Role,
    pub reasoning_effectiveness: f32,
    pub payload: Payload,
    /// Monotonic timestamp of the last `ProcessState` call, in milliseconds since epoch.
    pub last_activity_ms: i64,
    /// Incremented on every successful `Update`; used for optimistic-concurrency rejection.
    pub revision: u64,
}

impl Session {
    pub fn new(
        session_id: String,
        initial_objective: String,
        detected_role: Role,
        initial_effectiveness: f32,
        now_ms: i64,
    ) -> Self {
        Self {
            session_id,
            current_phase: Phase::Init,
            initial_objective,
            detected_role,
            reasoning_effectiveness: initial_effectiveness,
            payload: Payload::new(),
            last_activity_ms: now_ms,
            revision: 0,
        }
    }

    /// Merges `updates` into the payload, overwriting existing keys (§3: "mutated in place").
    pub fn merge_payload(&mut self, updates: Payload) {
        for (k, v) in updates {
            self.payload.insert(k, v);
        }
    }

    /// Applies a bounded effectiveness delta, clamped to `[min, max]` (§4.1).
    pub fn apply_effectiveness_delta(&mut self, delta: f32, min: f32, max: f32) {
        self.reasoning_effectiveness = (self.reasoning_effectiveness + delta).clamp(min, max);
    }
}

/// An archived session record: the same shape plus `archived_at_ms` (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedSession {
    #[serde(flatten)]
    pub session: Session,
    pub archived_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        assert!(is_valid_session_id("abc-123_DEF"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("has space"));
        assert!(!is_valid_session_id(&"a".repeat(129)));
    }

    #[test]
    fn effectiveness_clamps() {
        let mut s = Session::new("s1".into(), "obj".into(), Role::Coder, 0.8, 0);
        s.apply_effectiveness_delta(5.0, 0.3, 1.0);
        assert_eq!(s.reasoning_effectiveness, 1.0);
        s.apply_effectiveness_delta(-5.0, 0.3, 1.0);
        assert_eq!(s.reasoning_effectiveness, 0.3);
    }
}
