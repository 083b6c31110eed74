//! Phase state machine (C9): the eight-stage workflow and its transition function.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the workflow (spec §3). Ordered; `Init` is the unique start,
/// `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Init,
    Query,
    Enhance,
    Knowledge,
    Plan,
    Execute,
    Verify,
    Done,
}

impl Phase {
    /// Parses a worker-supplied phase token (`phase_completed`). Any other token is a schema error.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "INIT" => Some(Phase::Init),
            "QUERY" => Some(Phase::Query),
            "ENHANCE" => Some(Phase::Enhance),
            "KNOWLEDGE" => Some(Phase::Knowledge),
            "PLAN" => Some(Phase::Plan),
            "EXECUTE" => Some(Phase::Execute),
            "VERIFY" => Some(Phase::Verify),
            "DONE" => Some(Phase::Done),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Query => "QUERY",
            Phase::Enhance => "ENHANCE",
            Phase::Knowledge => "KNOWLEDGE",
            Phase::Plan => "PLAN",
            Phase::Execute => "EXECUTE",
            Phase::Verify => "VERIFY",
            Phase::Done => "DONE",
        }
    }

    /// Capability whitelist for this phase (§4.1). `Done` carries none.
    pub fn allowed_tools(&self) -> &'static [&'static str] {
        match self {
            Phase::Init => &["jarvis"],
            Phase::Query => &["jarvis"],
            Phase::Enhance => &["jarvis", "web_search"],
            Phase::Knowledge => &["jarvis", "web_search", "web_fetch"],
            Phase::Plan => &["jarvis", "todo_write", "todo_read"],
            Phase::Execute => &[
                "jarvis", "task", "todo_write", "todo_read", "bash", "read", "write", "edit",
                "browser", "ide_exec",
            ],
            Phase::Verify => &["jarvis", "todo_read"],
            Phase::Done => &[],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating the transition function for one `ProcessState` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The phase advanced (or rolled back) to `next`.
    Advance { next: Phase },
    /// `(current, completed)` did not match an advancing pair: re-issue the current phase's prompt.
    Reissue,
}

/// The transition function δ(current, completed) → next (spec §4.1).
///
/// This only decides *whether* the phase advances; payload merges, rollback
/// severity (§4.4), and knowledge auto-connection (§4.5) are orchestrated by
/// the caller (C10) since they need more than `(current, completed)` to decide.
pub fn next_on_completion(current: Phase, completed: Option<Phase>) -> Transition {
    use Phase::*;
    match (current, completed) {
        (Init, None) => Transition::Advance { next: Query },
        (Query, Some(Query)) => Transition::Advance { next: Enhance },
        (Enhance, Some(Enhance)) => Transition::Advance { next: Knowledge },
        (Knowledge, Some(Knowledge)) => Transition::Advance { next: Plan },
        (Plan, Some(Plan)) => Transition::Advance { next: Execute },
        (Done, _) => Transition::Advance { next: Done },
        _ => Transition::Reissue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_start_goes_to_query() {
        assert_eq!(next_on_completion(Phase::Init, None), Transition::Advance { next: Phase::Query });
    }

    #[test]
    fn done_is_idempotent() {
        assert_eq!(
            next_on_completion(Phase::Done, Some(Phase::Verify)),
            Transition::Advance { next: Phase::Done }
        );
    }

    #[test]
    fn mismatched_completion_is_a_reissue() {
        assert_eq!(next_on_completion(Phase::Query, Some(Phase::Enhance)), Transition::Reissue);
    }

    #[test]
    fn parse_rejects_unknown_token() {
        assert_eq!(Phase::parse("WAT"), None);
    }

    #[test]
    fn done_whitelist_is_empty() {
        assert!(Phase::Done.allowed_tools().is_empty());
    }
}
