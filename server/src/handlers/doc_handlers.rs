// Document handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use lessonroom_core::ids::DocId;
use tracing::debug;

use crate::{
    ErrorKind,
    error::AppError,
    state::AppState,
    types::{
        AccessMutationResponse, CollaboratorsResponse, DocumentListResponse, DocumentResponse,
        RemoveCollaboratorRequest, RenameDocumentRequest, ShareDocumentRequest,
    },
    user::service::CurrentUser,
    utils::users::normalize_title,
};

const MAX_TITLE_CHARS: usize = 200;

pub(crate) async fn list_documents_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let documents = state.doc_access_service.list_for_user(&user.id).await?;
    Ok(Json(DocumentListResponse { documents }))
}

pub(crate) async fn create_document_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .doc_access_service
        .create(&user.id, &user.email)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::for_user(record, &user.id)),
    ))
}

pub(crate) async fn get_document_handler(
    Path(doc_id): Path<DocId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let opened = state.doc_access_service.open(&doc_id, &user.id).await?;
    Ok(Json(DocumentResponse::from(opened)))
}

/// Viewers may not rename; the access service itself does not check.
pub(crate) async fn rename_document_handler(
    Path(doc_id): Path<DocId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<RenameDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = normalize_title(&payload.title, MAX_TITLE_CHARS)
        .ok_or_else(|| AppError::bad_request("title must not be empty"))?;

    let opened = state.doc_access_service.open(&doc_id, &user.id).await?;
    opened.ensure_can_edit()?;

    let record = state.doc_access_service.rename(&doc_id, &title).await?;
    Ok(Json(DocumentResponse::new(record, opened.access)))
}

/// A document that is already gone counts as deleted.
pub(crate) async fn delete_document_handler(
    Path(doc_id): Path<DocId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    match state.doc_access_service.delete(&doc_id, &user.id).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(doc_id = %doc_id, "delete of missing document treated as success");
        }
        Err(err) => return Err(err),
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_collaborators_handler(
    Path(doc_id): Path<DocId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let collaborators = state
        .doc_access_service
        .collaborators(&doc_id, &user.id)
        .await?;
    Ok(Json(CollaboratorsResponse { collaborators }))
}

pub(crate) async fn share_document_handler(
    Path(doc_id): Path<DocId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ShareDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mutation = state
        .doc_access_service
        .share(&doc_id, &payload.email, payload.level, &user)
        .await?;
    Ok(Json(AccessMutationResponse::new(mutation, &user.id)))
}

pub(crate) async fn remove_collaborator_handler(
    Path(doc_id): Path<DocId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<RemoveCollaboratorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mutation = state
        .doc_access_service
        .remove(&doc_id, &payload.email, &user)
        .await?;
    Ok(Json(AccessMutationResponse::new(mutation, &user.id)))
}
