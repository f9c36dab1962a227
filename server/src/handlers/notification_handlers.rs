// Inbox notification handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use lessonroom_core::ids::NotificationId;

use crate::{
    error::AppError,
    state::AppState,
    types::{MarkAllReadResponse, NotificationListQuery, NotificationListResponse},
    user::service::CurrentUser,
};

pub(crate) async fn list_notifications_handler(
    Query(query): Query<NotificationListQuery>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let notifications = state
        .notifications
        .list_for_user(&user.id, query.unread)
        .await?;
    let unread_count = if query.unread {
        notifications.len()
    } else {
        state.notifications.count_unread(&user.id).await?
    };
    Ok(Json(NotificationListResponse {
        notifications,
        unread_count,
    }))
}

pub(crate) async fn mark_notification_read_handler(
    Path(notification_id): Path<NotificationId>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .notifications
        .mark_read(&user.id, &notification_id)
        .await?;
    Ok(Json(view))
}

pub(crate) async fn mark_all_notifications_read_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.notifications.mark_all_read(&user.id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
