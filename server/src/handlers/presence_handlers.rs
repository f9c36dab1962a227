// Presence handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use lessonroom_core::{
    ids::{DocId, SessionId},
    presence::{Presence, PresenceUser},
};

use crate::{
    error::AppError,
    state::AppState,
    types::{PresenceResponse, PresenceUpdateRequest},
    user::service::CurrentUser,
};

/// Replaces the caller's presence for one session and returns what the other
/// sessions are focused on.
pub(crate) async fn publish_presence_handler(
    Path((doc_id, session_id)): Path<(DocId, SessionId)>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<PresenceUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.doc_access_service.open(&doc_id, &user.id).await?;

    let presence = Presence {
        cursor: payload.cursor,
        active_block_id: payload.active_block_id,
        user: PresenceUser::from(&user),
    };
    state.presence_hub.publish(&doc_id, &session_id, presence)?;

    let others_by_block = state.presence_hub.others_by_block(&doc_id, &session_id);
    Ok(Json(PresenceResponse {
        session_id,
        others_by_block,
    }))
}

pub(crate) async fn get_presence_handler(
    Path((doc_id, session_id)): Path<(DocId, SessionId)>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    state.doc_access_service.open(&doc_id, &user.id).await?;

    let others_by_block = state.presence_hub.others_by_block(&doc_id, &session_id);
    Ok(Json(PresenceResponse {
        session_id,
        others_by_block,
    }))
}

pub(crate) async fn leave_presence_handler(
    Path((doc_id, session_id)): Path<(DocId, SessionId)>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    state
        .presence_hub
        .leave(&doc_id, &session_id, &user.id)?;
    Ok(StatusCode::NO_CONTENT)
}
