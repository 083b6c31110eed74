//! Task/todo data model (§3) consumed by PLAN/EXECUTE/VERIFY.

use crate::meta_prompt::{extract_meta_prompt, extract_slide_spec, MetaPrompt, SlideSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoKind {
    DirectExecution,
    TaskAgent,
}

/// A unit of work produced in PLAN and consumed in EXECUTE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: TodoPriority,
    pub kind: TodoKind,
    /// Parsed once from `content` when the todo is created; never re-parsed.
    #[serde(default)]
    pub meta_prompt: Option<MetaPrompt>,
    /// Present iff `content` matches the slide meta-prompt shape.
    #[serde(default)]
    pub slide_spec: Option<SlideSpec>,
}

impl Todo {
    /// Builds a todo, parsing its content once for both meta-prompt shapes.
    /// `kind` is forced to `TaskAgent` when a meta-prompt is present, and to
    /// `DirectExecution` otherwise, enforcing the invariant `kind = task_agent
    /// <=> meta_prompt != None` (§3).
    pub fn new(id: impl Into<String>, content: impl Into<String>, priority: TodoPriority) -> Self {
        let content = content.into();
        let meta_prompt = extract_meta_prompt(&content);
        let slide_spec = extract_slide_spec(&content);
        let kind = if meta_prompt.is_some() { TodoKind::TaskAgent } else { TodoKind::DirectExecution };
        Self {
            id: id.into(),
            content,
            status: TodoStatus::Pending,
            priority,
            kind,
            meta_prompt,
            slide_spec,
        }
    }

    /// A critical task: high priority, a task-agent spawn, or an embedded meta-prompt (GLOSSARY).
    pub fn is_critical(&self) -> bool {
        matches!(self.priority, TodoPriority::High)
            || matches!(self.kind, TodoKind::TaskAgent)
            || self.meta_prompt.is_some()
    }
}

/// Validates the list-level invariants from §3: unique ids, at most one `in_progress`,
/// and `kind = task_agent <=> meta_prompt != None` for every entry.
pub fn validate_todo_list(todos: &[Todo]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    let mut in_progress_count = 0;
    for t in todos {
        if t.id.is_empty() {
            return Err("todo without id".to_string());
        }
        if !seen.insert(&t.id) {
            return Err(format!("duplicate todo id '{}'", t.id));
        }
        if matches!(t.status, TodoStatus::InProgress) {
            in_progress_count += 1;
        }
        let is_task_agent = matches!(t.kind, TodoKind::TaskAgent);
        if is_task_agent != t.meta_prompt.is_some() {
            return Err(format!("todo '{}' violates kind<=>meta_prompt invariant", t.id));
        }
    }
    if in_progress_count > 1 {
        return Err(format!("{in_progress_count} todos are in_progress; at most one is allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_prompt_forces_task_agent_kind() {
        let t = Todo::new("1", "(ROLE:coder)(PROMPT:fix bug)(OUTPUT:diff)", TodoPriority::Medium);
        assert_eq!(t.kind, TodoKind::TaskAgent);
        assert!(t.meta_prompt.is_some());
        assert!(t.is_critical());
    }

    #[test]
    fn plain_content_is_direct_execution() {
        let t = Todo::new("1", "write the README", TodoPriority::Low);
        assert_eq!(t.kind, TodoKind::DirectExecution);
        assert!(t.meta_prompt.is_none());
        assert!(!t.is_critical());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let todos = vec![
            Todo::new("dup", "a", TodoPriority::Low),
            Todo::new("dup", "b", TodoPriority::Low),
        ];
        assert!(validate_todo_list(&todos).is_err());
    }

    #[test]
    fn rejects_two_in_progress() {
        let mut a = Todo::new("a", "x", TodoPriority::Low);
        let mut b = Todo::new("b", "y", TodoPriority::Low);
        a.status = TodoStatus::InProgress;
        b.status = TodoStatus::InProgress;
        assert!(validate_todo_list(&[a, b]).is_err());
    }
}
