//! Error taxonomy for the control plane.
//!
//! Internal modules (C1-C9) model their own failures as values (`SsrfError`,
//! `FetchError`, `StoreError`, `PhaseError`); none of them panics. The
//! `ProcessState` boundary (C10) maps every one of them to `ProcessError`,
//! the only error type that ever crosses the external interface.

use thiserror::Error;

/// Raised by the SSRF guard (C1) when a URL is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SsrfError {
    #[error("scheme '{0}' is not http/https")]
    UnsupportedScheme(String),
    #[error("host '{0}' is not permitted (private, loopback, or metadata range)")]
    BlockedHost(String),
    #[error("host '{0}' is not in the configured allowlist")]
    NotAllowlisted(String),
    #[error("url has no host")]
    MissingHost,
    #[error("url failed to parse: {0}")]
    Malformed(String),
}

/// Classification required by spec §4.5: every fetch failure resolves to one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited")]
    RateLimit,
    #[error("blocked by ssrf guard: {0}")]
    SsrfBlocked(#[from] SsrfError),
    #[error("http {0}")]
    Http4xx5xx(u16),
    #[error("promise rejected: {0}")]
    PromiseRejected(String),
    #[error("unknown fetch error: {0}")]
    Unknown(String),
}

/// Session-store (C8) failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session id '{0}' does not match ^[A-Za-z0-9_-]{{1,128}}$")]
    InvalidSessionId(String),
    #[error("initial_objective is required on the first call for session '{0}'")]
    MissingInitialObjective(String),
    #[error("initial_objective is immutable and was supplied again for session '{0}'")]
    ObjectiveAlreadySet(String),
    #[error("stale revision for session '{0}': expected {expected}, found {found}")]
    StaleRevision { expected: u64, found: u64, session_id: String },
    #[error("underlying store error: {0}")]
    Backend(String),
}

/// Phase state machine (C9) failures.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("unknown phase token '{0}'")]
    UnknownPhase(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Startup configuration failures (§6: "Invalid configuration is a startup error").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} = '{value}' is out of range {range}")]
    OutOfRange { name: &'static str, value: String, range: &'static str },
    #[error("{name} = '{value}' could not be parsed: {reason}")]
    Invalid { name: &'static str, value: String, reason: String },
}

/// The single error type returned across the `ProcessState` boundary (§6).
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid session_id")]
    InvalidSessionId,
    #[error("missing initial_objective")]
    MissingInitialObjective,
    #[error("stale revision, retry")]
    StaleRevision,
    #[error("internal store error: {0}")]
    InternalStoreError(String),
    #[error("internal error in phase '{phase}': {message}")]
    Internal { phase: String, message: String },
}

impl From<StoreError> for ProcessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidSessionId(_) => ProcessError::InvalidSessionId,
            StoreError::MissingInitialObjective(_) => ProcessError::MissingInitialObjective,
            StoreError::ObjectiveAlreadySet(s) => ProcessError::Internal {
                phase: "INIT".to_string(),
                message: format!("initial_objective already set for session '{s}'"),
            },
            StoreError::StaleRevision { .. } => ProcessError::StaleRevision,
            StoreError::Backend(msg) => ProcessError::InternalStoreError(msg),
        }
    }
}
