use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::{
    Json, Router,
    routing::{get, post},
};
use log::{error, info};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{AppConfig, SolverConfig};
use crate::data::{ScheduleEntry, TimetableRequest};
use crate::error::SolveError;
use crate::solver;

#[derive(Clone)]
pub struct AppState {
    solver: Arc<SolverConfig>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

async fn generate_timetable(
    State(state): State<AppState>,
    payload: Result<Json<TimetableRequest>, JsonRejection>,
) -> Result<Json<Vec<ScheduleEntry>>, SolveError> {
    let Json(request) = payload.map_err(|rejection| SolveError::invalid(rejection.body_text()))?;

    // the solve blocks until HiGHS returns
    let config = Arc::clone(&state.solver);
    let entries = tokio::task::spawn_blocking(move || solver::solve(&request, &config))
        .await
        .map_err(|e| {
            error!("Solver task failed: {e}");
            SolveError::NoFeasibleSolution
        })??;

    Ok(Json(entries))
}

/// Builds the HTTP router. Any origin may call it, matching the browser
/// front end served from elsewhere.
pub fn router(config: SolverConfig) -> Router {
    let state = AppState {
        solver: Arc::new(config),
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate-timetable", post(generate_timetable))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, router(config.solver)).await
}
