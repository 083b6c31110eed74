//! Verification gate (C7): completion arithmetic and the pass/rollback ruleset (§4.4).

use crate::todo::{Todo, TodoPriority, TodoStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationMetrics {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub completion_pct: u32,
    pub critical_total: usize,
    pub critical_done: usize,
    pub any_high_priority_pending: bool,
}

pub fn compute_metrics(todos: &[Todo]) -> VerificationMetrics {
    let total = todos.len();
    let completed = todos.iter().filter(|t| matches!(t.status, TodoStatus::Completed)).count();
    let in_progress = todos.iter().filter(|t| matches!(t.status, TodoStatus::InProgress)).count();
    let pending = todos.iter().filter(|t| matches!(t.status, TodoStatus::Pending)).count();
    let completion_pct = if total == 0 {
        100
    } else {
        ((completed as f64 * 100.0) / total as f64).round() as u32
    };
    let critical: Vec<&Todo> = todos.iter().filter(|t| t.is_critical()).collect();
    let critical_total = critical.len();
    let critical_done = critical.iter().filter(|t| matches!(t.status, TodoStatus::Completed)).count();
    let any_high_priority_pending = todos
        .iter()
        .any(|t| matches!(t.priority, TodoPriority::High) && matches!(t.status, TodoStatus::Pending));

    VerificationMetrics {
        total,
        completed,
        in_progress,
        pending,
        completion_pct,
        critical_total,
        critical_done,
        any_high_priority_pending,
    }
}

/// Decision returned by the gate: pass, or a rollback target with its side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Pass,
    RollbackToPlan,
    RollbackToExecuteKeepIndex,
    RollbackToExecuteStepBack,
}

/// Evaluates the six rules in §4.4. `worker_asserted_pass` is the worker's own
/// `verification_passed` claim; rule 6 makes an inconsistent `true` claim fail.
pub fn evaluate(
    metrics: &VerificationMetrics,
    reasoning_effectiveness: f32,
    worker_asserted_pass: bool,
    completion_threshold: u32,
    effectiveness_threshold: f32,
) -> VerificationOutcome {
    let rule1 = metrics.critical_done == metrics.critical_total;
    let rule2 = metrics.completion_pct >= completion_threshold;
    let rule3 = !metrics.any_high_priority_pending;
    let rule4 = metrics.in_progress == 0;
    let rule5 = reasoning_effectiveness >= effectiveness_threshold;
    let all_pass = rule1 && rule2 && rule3 && rule4 && rule5;

    // Rule 6: an asserted pass with <100% completion while critical tasks exist is inconsistent.
    let inconsistent_assertion =
        worker_asserted_pass && metrics.completion_pct < 100 && metrics.critical_total > 0 && !all_pass;

    if all_pass && !inconsistent_assertion {
        return VerificationOutcome::Pass;
    }

    if metrics.completion_pct < 50 {
        VerificationOutcome::RollbackToPlan
    } else if metrics.completion_pct < 80 {
        VerificationOutcome::RollbackToExecuteKeepIndex
    } else {
        VerificationOutcome::RollbackToExecuteStepBack
    }
}
