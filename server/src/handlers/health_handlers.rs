// Health check endpoint

use axum::{Json, extract::State, response::IntoResponse};

use crate::{state::AppState, types::HealthResponse};

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: state.metadata.version.clone(),
        backend: state.metadata.backend,
    })
}
