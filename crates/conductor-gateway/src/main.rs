//! Conductor Gateway — HTTP transport for the phase-orchestration control
//! plane. Exposes the single `ProcessState` boundary operation at
//! `POST /process-state` and ticks the session archival sweep in the
//! background alongside the server.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use conductor_core::orchestrator::Message;
use conductor_core::{ConductorConfig, Orchestrator, ProcessError, SessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[conductor-gateway] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ConductorConfig::from_env().expect("invalid configuration");
    let storage_path = std::env::var("CONDUCTOR_STORAGE_PATH").unwrap_or_else(|_| "./data/conductor_sessions".into());
    let store = SessionStore::open_path(&storage_path).expect("open session store");
    let http_client = reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .build()
        .expect("build http client");

    let archive_sweep_secs = cfg.archive_sweep_secs;
    let orchestrator = Arc::new(Orchestrator::new(store, cfg, http_client));

    let state = AppState { orchestrator: Arc::clone(&orchestrator) };
    let app = Router::new().route("/process-state", post(process_state_handler)).with_state(state);

    let addr: SocketAddr = std::env::var("CONDUCTOR_BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8070".to_string())
        .parse()
        .expect("invalid CONDUCTOR_BIND_ADDR");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind listener");
    tracing::info!(%addr, storage_path, "conductor-gateway listening");

    let sweep_orchestrator = Arc::clone(&orchestrator);
    let server = axum::serve(listener, app.into_make_service());

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server exited with error");
            }
        }
        _ = archive_sweep_loop(sweep_orchestrator, archive_sweep_secs) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; shutting down conductor-gateway");
        }
    }
}

/// Runs the archival sweep on a fixed tick until ctrl_c is handled by the
/// caller's `select!` (§4.2 Archive, SPEC_FULL §3 "Archival sweep loop").
async fn archive_sweep_loop(orchestrator: Arc<Orchestrator>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        match orchestrator.run_archive_sweep().await {
            Ok(moved) if moved > 0 => tracing::info!(archived = moved, "archival sweep moved sessions"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "archival sweep failed"),
        }
    }
}

async fn process_state_handler(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> impl IntoResponse {
    match state.orchestrator.process(message).await {
        Ok(response) => (StatusCode::OK, Json(serde_json::to_value(&response).unwrap())).into_response(),
        Err(err) => {
            let status = match &err {
                ProcessError::InvalidSessionId
                | ProcessError::MissingInitialObjective
                | ProcessError::StaleRevision => StatusCode::BAD_REQUEST,
                ProcessError::InternalStoreError(_) | ProcessError::Internal { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let body = serde_json::json!({ "error": error_code(&err), "message": err.to_string() });
            (status, Json(body)).into_response()
        }
    }
}

/// Maps a `ProcessError` to the structured error-code strings named in §6.
fn error_code(err: &ProcessError) -> &'static str {
    match err {
        ProcessError::InvalidSessionId => "invalid_session_id",
        ProcessError::MissingInitialObjective => "missing_initial_objective",
        ProcessError::StaleRevision => "stale_revision",
        ProcessError::InternalStoreError(_) => "internal_store_error",
        ProcessError::Internal { .. } => "internal_error",
    }
}
