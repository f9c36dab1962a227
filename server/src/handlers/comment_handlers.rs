// Comment thread handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use lessonroom_core::ids::{BlockId, DocId, ThreadId};

use crate::{
    error::AppError,
    state::AppState,
    types::{CommentBodyRequest, ThreadListQuery, ThreadListResponse, ThreadResponse},
    user::service::CurrentUser,
};

pub(crate) async fn list_block_threads_handler(
    Path((doc_id, bloq_id)): Path<(DocId, BlockId)>,
    Query(query): Query<ThreadListQuery>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    state.doc_access_service.open(&doc_id, &user.id).await?;

    let threads = if query.all {
        state.comment_gateway.list_threads(&doc_id, &bloq_id).await?
    } else {
        state
            .comment_gateway
            .list_unresolved(&doc_id, &bloq_id)
            .await?
    };
    Ok(Json(ThreadListResponse { threads }))
}

/// Opening a thread needs editor or owner access.
pub(crate) async fn create_thread_handler(
    Path((doc_id, bloq_id)): Path<(DocId, BlockId)>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CommentBodyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let opened = state.doc_access_service.open(&doc_id, &user.id).await?;
    opened.ensure_can_edit()?;

    let posted = state
        .comment_gateway
        .create_thread(&opened.record, &bloq_id, &user, payload.body)
        .await?;
    Ok((StatusCode::CREATED, Json(ThreadResponse::from(posted))))
}

pub(crate) async fn resolve_thread_handler(
    Path((doc_id, thread_id)): Path<(DocId, ThreadId)>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    state.doc_access_service.open(&doc_id, &user.id).await?;
    let thread = state
        .comment_gateway
        .resolve(&doc_id, &thread_id, &user.id)
        .await?;
    Ok(Json(ThreadResponse::from(thread)))
}

pub(crate) async fn reopen_thread_handler(
    Path((doc_id, thread_id)): Path<(DocId, ThreadId)>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    state.doc_access_service.open(&doc_id, &user.id).await?;
    let thread = state
        .comment_gateway
        .reopen(&doc_id, &thread_id, &user.id)
        .await?;
    Ok(Json(ThreadResponse::from(thread)))
}

pub(crate) async fn add_reply_handler(
    Path((doc_id, thread_id)): Path<(DocId, ThreadId)>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CommentBodyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let opened = state.doc_access_service.open(&doc_id, &user.id).await?;
    let posted = state
        .comment_gateway
        .add_reply(&opened.record, &thread_id, &user, payload.body)
        .await?;
    Ok((StatusCode::CREATED, Json(ThreadResponse::from(posted))))
}
