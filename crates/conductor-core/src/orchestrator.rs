//! `ProcessState` (C10): the single façade composing the phase state machine,
//! role engine, verification gate, knowledge auto-connection, and session
//! store into the one external operation named in §6.
//!
//! **Concurrency design note (not explicit in spec.md, decided here):** a
//! snapshot of the session is read once at the start of the call (outside
//! the store's per-session lock) so the async knowledge fetch can run
//! without holding that lock. The final `store.update` mutator then checks
//! the freshly-read revision against the snapshot's revision and fails with
//! `StaleRevision` on mismatch, rather than relying on sled's CAS (which
//! only guards the write itself) to detect a concurrent writer. This keeps
//! the one-in-flight-call-per-session precondition from §5 enforceable by
//! the optimistic-concurrency contract in §4.1 even though the knowledge
//! fetch suspends for real I/O mid-call.

use crate::config::ConductorConfig;
use crate::error::{ProcessError, StoreError};
use crate::knowledge::{auto_connect, ratelimit::RateLimiter};
use crate::phase::{next_on_completion, Phase, Transition};
use crate::role::{assemble_prompt, detect_role, phase_context, Role};
use crate::session::{Payload, Session};
use crate::store::SessionStore;
use crate::todo::Todo;
use crate::verification::{compute_metrics, evaluate, VerificationOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub session_id: String,
    #[serde(default)]
    pub phase_completed: Option<String>,
    #[serde(default)]
    pub initial_objective: Option<String>,
    #[serde(default)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub next_phase: Phase,
    pub system_prompt: String,
    pub allowed_next_tools: Vec<String>,
    pub status: Status,
    pub payload: Payload,
}

pub struct Orchestrator {
    store: SessionStore,
    cfg: ConductorConfig,
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
}

impl Orchestrator {
    pub fn new(store: SessionStore, cfg: ConductorConfig, http_client: reqwest::Client) -> Self {
        Self { store, cfg, http_client, rate_limiter: Arc::new(RateLimiter::new()) }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn run_archive_sweep(&self) -> Result<usize, StoreError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let cutoff = now_ms - self.cfg.session_ttl_hours * 3_600_000;
        self.store.archive(cutoff, now_ms).await
    }

    pub async fn process(&self, message: Message) -> Result<Response, ProcessError> {
        let snapshot = self.store.get(&message.session_id)?;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut session = match &snapshot {
            Some(s) => {
                if message.initial_objective.is_some() {
                    return Err(StoreError::ObjectiveAlreadySet(message.session_id.clone()).into());
                }
                s.clone()
            }
            None => {
                let objective = message
                    .initial_objective
                    .clone()
                    .ok_or(ProcessError::MissingInitialObjective)?;
                let role = detect_role(&objective);
                Session::new(message.session_id.clone(), objective, role, self.cfg.initial_reasoning_effectiveness, now_ms)
            }
        };
        let snapshot_revision = snapshot.as_ref().map(|s| s.revision);

        session.merge_payload(message.payload.clone());
        apply_role_override(&mut session, &message.payload);
        session.payload.insert(
            "detected_role".to_string(),
            Value::from(session.detected_role.as_str()),
        );

        let current = session.current_phase;
        let completed = message
            .phase_completed
            .as_deref()
            .and_then(Phase::parse);

        let next_phase = self.resolve_next_phase(&mut session, current, completed).await;

        bump_transition_count(&mut session.payload);
        session.current_phase = next_phase;
        session.last_activity_ms = now_ms;

        let persisted = self
            .store
            .update(&message.session_id, move |existing| {
                if existing.as_ref().map(|s| s.revision) != snapshot_revision {
                    return Err(StoreError::StaleRevision {
                        expected: snapshot_revision.unwrap_or(0),
                        found: existing.map(|s| s.revision).unwrap_or(0),
                        session_id: session.session_id.clone(),
                    });
                }
                Ok(session.clone())
            })
            .await?;

        let context_block = phase_context(next_phase, &persisted.payload);
        let system_prompt = assemble_prompt(next_phase, persisted.detected_role, &persisted.session_id, &context_block);
        let status = if next_phase == Phase::Done { Status::Done } else { Status::InProgress };

        Ok(Response {
            next_phase,
            system_prompt,
            allowed_next_tools: next_phase.allowed_tools().iter().map(|s| s.to_string()).collect(),
            status,
            payload: persisted.payload,
        })
    }

    /// Resolves the next phase, mutating `session.payload` with whatever
    /// side effects the transition requires (§4.1, §4.4, §4.5). EXECUTE's
    /// self-loop and VERIFY's pass/rollback need more than `(current,
    /// completed)`, so they are special-cased here rather than in
    /// `phase::next_on_completion`.
    async fn resolve_next_phase(&self, session: &mut Session, current: Phase, completed: Option<Phase>) -> Phase {
        match (current, completed) {
            (Phase::Execute, Some(Phase::Execute)) => {
                apply_effectiveness_update(session, &self.cfg);
                let more_pending = payload_bool(&session.payload, "more_tasks_pending").unwrap_or(false);
                let todos = payload_todos(&session.payload);
                let index = payload_usize(&session.payload, "current_task_index").unwrap_or(0);
                if more_pending || (!todos.is_empty() && index + 1 < todos.len()) {
                    Phase::Execute
                } else {
                    Phase::Verify
                }
            }
            (Phase::Verify, Some(Phase::Verify)) => self.resolve_verify(session),
            (Phase::Knowledge, Some(Phase::Knowledge)) => {
                self.run_knowledge_auto_connection(session).await;
                Phase::Plan
            }
            (Phase::Plan, Some(Phase::Plan)) => {
                session.payload.entry("current_task_index".to_string()).or_insert(Value::from(0));
                Phase::Execute
            }
            _ => match next_on_completion(current, completed) {
                Transition::Advance { next } => next,
                Transition::Reissue => current,
            },
        }
    }

    fn resolve_verify(&self, session: &mut Session) -> Phase {
        let todos = payload_todos(&session.payload);
        let metrics = compute_metrics(&todos);
        let asserted_pass = payload_bool(&session.payload, "verification_passed").unwrap_or(false);

        let outcome = evaluate(
            &metrics,
            session.reasoning_effectiveness,
            asserted_pass,
            self.cfg.verification_completion_threshold,
            self.cfg.execution_success_rate_threshold,
        );

        match outcome {
            VerificationOutcome::Pass => Phase::Done,
            VerificationOutcome::RollbackToPlan => {
                record_rollback(session, &metrics, "completion below 50%");
                session.payload.insert("current_task_index".to_string(), Value::from(0));
                Phase::Plan
            }
            VerificationOutcome::RollbackToExecuteKeepIndex => {
                record_rollback(session, &metrics, "completion between 50% and 79%");
                Phase::Execute
            }
            VerificationOutcome::RollbackToExecuteStepBack => {
                record_rollback(session, &metrics, "completion between 80% and 99%");
                let index = payload_usize(&session.payload, "current_task_index").unwrap_or(0);
                session
                    .payload
                    .insert("current_task_index".to_string(), Value::from(index.saturating_sub(1)));
                Phase::Execute
            }
        }
    }

    async fn run_knowledge_auto_connection(&self, session: &mut Session) {
        if session.payload.contains_key("synthesized_knowledge") {
            return;
        }
        let goal = payload_string(&session.payload, "enhanced_goal").unwrap_or_else(|| session.initial_objective.clone());
        let result = auto_connect(&self.http_client, &goal, session.detected_role, &self.cfg, Arc::clone(&self.rate_limiter)).await;

        session.payload.insert("knowledge_gathered".to_string(), Value::from(true));
        session.payload.insert(
            "synthesized_knowledge".to_string(),
            Value::from(result.synthesized.answer.clone()),
        );
        session
            .payload
            .insert("knowledge_confidence".to_string(), Value::from(result.synthesized.confidence));
        session.payload.insert(
            "knowledge_contradictions".to_string(),
            Value::from(result.synthesized.contradictions.clone()),
        );
        session.payload.insert(
            "api_discovery_results".to_string(),
            serde_json::to_value(&result.api_discovery_results).unwrap_or(Value::Null),
        );
        session
            .payload
            .insert("auto_connection_successful".to_string(), Value::from(result.successful));
    }
}

fn apply_role_override(session: &mut Session, incoming: &Payload) {
    if let Some(Value::String(role_str)) = incoming.get("role") {
        if let Some(role) = Role::parse(role_str) {
            session.detected_role = role;
        }
    }
}

fn bump_transition_count(payload: &mut Payload) {
    let count = payload.get("phase_transition_count").and_then(Value::as_u64).unwrap_or(0);
    payload.insert("phase_transition_count".to_string(), Value::from(count + 1));
}

fn apply_effectiveness_update(session: &mut Session, cfg: &ConductorConfig) {
    let success = payload_bool(&session.payload, "execution_success").unwrap_or(false);
    let complex = payload_string(&session.payload, "task_complexity")
        .map(|s| s.eq_ignore_ascii_case("complex"))
        .unwrap_or(false);
    let magnitude = if complex { 0.15 } else { 0.10 };
    let delta = if success { magnitude } else { -magnitude };
    session.apply_effectiveness_delta(delta, cfg.min_reasoning_effectiveness, cfg.max_reasoning_effectiveness);
}

fn record_rollback(session: &mut Session, metrics: &crate::verification::VerificationMetrics, reason: &str) {
    session
        .payload
        .insert("verification_failure_reason".to_string(), Value::from(reason.to_string()));
    session
        .payload
        .insert("last_completion_percentage".to_string(), Value::from(metrics.completion_pct));
}

fn payload_bool(payload: &Payload, key: &str) -> Option<bool> {
    payload.get(key).and_then(Value::as_bool)
}

fn payload_usize(payload: &Payload, key: &str) -> Option<usize> {
    payload.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

fn payload_string(payload: &Payload, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn payload_todos(payload: &Payload) -> Vec<Todo> {
    payload
        .get("current_todos")
        .and_then(|v| serde_json::from_value::<Vec<Todo>>(v.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_orchestrator() -> (Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open_path(dir.path()).unwrap();
        let cfg = ConductorConfig::default();
        let client = reqwest::Client::new();
        (Orchestrator::new(store, cfg, client), dir)
    }

    #[tokio::test]
    async fn cold_start_moves_to_query() {
        let (orch, _dir) = test_orchestrator();
        let msg = Message {
            session_id: "s1".to_string(),
            phase_completed: None,
            initial_objective: Some("Build login form".to_string()),
            payload: Payload::new(),
        };
        let resp = orch.process(msg).await.unwrap();
        assert_eq!(resp.next_phase, Phase::Query);
        assert_eq!(resp.status, Status::InProgress);
        assert_eq!(resp.allowed_next_tools, vec!["jarvis".to_string()]);
    }

    #[tokio::test]
    async fn second_call_without_objective_requires_completed_phase() {
        let (orch, _dir) = test_orchestrator();
        orch.process(Message {
            session_id: "s1".to_string(),
            phase_completed: None,
            initial_objective: Some("Build login form".to_string()),
            payload: Payload::new(),
        })
        .await
        .unwrap();

        let resp = orch
            .process(Message {
                session_id: "s1".to_string(),
                phase_completed: Some("QUERY".to_string()),
                initial_objective: None,
                payload: Payload::new(),
            })
            .await
            .unwrap();
        assert_eq!(resp.next_phase, Phase::Enhance);
    }

    #[tokio::test]
    async fn repeated_initial_objective_is_rejected() {
        let (orch, _dir) = test_orchestrator();
        orch.process(Message {
            session_id: "s1".to_string(),
            phase_completed: None,
            initial_objective: Some("Build login form".to_string()),
            payload: Payload::new(),
        })
        .await
        .unwrap();

        let result = orch
            .process(Message {
                session_id: "s1".to_string(),
                phase_completed: None,
                initial_objective: Some("Different objective".to_string()),
                payload: Payload::new(),
            })
            .await;
        assert!(matches!(result, Err(ProcessError::Internal { .. })));
    }

    #[tokio::test]
    async fn severe_rollback_reports_plan_and_zeroed_index() {
        let (orch, _dir) = test_orchestrator();
        orch.process(Message {
            session_id: "s1".to_string(),
            phase_completed: None,
            initial_objective: Some("Ship the feature".to_string()),
            payload: Payload::new(),
        })
        .await
        .unwrap();

        let todos = json!([
            {"id": "a", "content": "x", "status": "completed", "priority": "low", "kind": "direct_execution"},
            {"id": "b", "content": "y", "status": "pending", "priority": "low", "kind": "direct_execution"},
            {"id": "c", "content": "z", "status": "pending", "priority": "low", "kind": "direct_execution"},
        ]);
        let mut payload = Payload::new();
        payload.insert("current_todos".to_string(), todos);
        payload.insert("verification_passed".to_string(), Value::from(false));

        let resp = orch
            .process(Message {
                session_id: "s1".to_string(),
                phase_completed: Some("VERIFY".to_string()),
                initial_objective: None,
                payload,
            })
            .await
            .unwrap();

        assert_eq!(resp.next_phase, Phase::Plan);
        assert_eq!(resp.payload.get("current_task_index"), Some(&Value::from(0)));
        assert_eq!(resp.payload.get("last_completion_percentage"), Some(&Value::from(33)));
    }

    #[tokio::test]
    async fn mismatched_completion_reissues_without_advancing() {
        let (orch, _dir) = test_orchestrator();
        orch.process(Message {
            session_id: "s1".to_string(),
            phase_completed: None,
            initial_objective: Some("Build login form".to_string()),
            payload: Payload::new(),
        })
        .await
        .unwrap();

        let resp = orch
            .process(Message {
                session_id: "s1".to_string(),
                phase_completed: Some("ENHANCE".to_string()),
                initial_objective: None,
                payload: Payload::new(),
            })
            .await
            .unwrap();
        assert_eq!(resp.next_phase, Phase::Query);
    }
}
