//! Deterministic phase-orchestration control plane.
//!
//! `conductor-core` is the library half of the workspace: the eight-phase
//! state machine, session store, role & meta-prompt engine, verification
//! gate, and knowledge auto-connection subsystem. It exposes a single
//! external operation, [`orchestrator::Orchestrator::process`], matching the
//! "one `ProcessState` call suffices" boundary from the design.

pub mod config;
pub mod error;
pub mod knowledge;
pub mod meta_prompt;
pub mod orchestrator;
pub mod phase;
pub mod role;
pub mod session;
pub mod store;
pub mod todo;
pub mod verification;

pub use config::ConductorConfig;
pub use error::ProcessError;
pub use orchestrator::{Message, Orchestrator, Response, Status};
pub use phase::Phase;
pub use role::Role;
pub use session::Session;
pub use store::SessionStore;
