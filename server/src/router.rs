// Router configuration

use axum::{
    Router,
    http::Method,
    routing::{get, post, put},
};
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{
        comment_handlers::*, doc_handlers::*, health_handlers::*, notification_handlers::*,
        presence_handlers::*,
    },
    observability,
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_handler))
        // Documents
        .route(
            "/api/documents",
            get(list_documents_handler).post(create_document_handler),
        )
        .route(
            "/api/documents/{id}",
            get(get_document_handler)
                .patch(rename_document_handler)
                .delete(delete_document_handler),
        )
        .route(
            "/api/documents/{id}/collaborators",
            get(list_collaborators_handler),
        )
        .route("/api/documents/{id}/share", post(share_document_handler))
        .route(
            "/api/documents/{id}/remove",
            post(remove_collaborator_handler),
        )
        // Comments
        .route(
            "/api/documents/{id}/blocks/{block_id}/threads",
            get(list_block_threads_handler).post(create_thread_handler),
        )
        .route(
            "/api/documents/{id}/threads/{thread_id}/resolve",
            post(resolve_thread_handler),
        )
        .route(
            "/api/documents/{id}/threads/{thread_id}/reopen",
            post(reopen_thread_handler),
        )
        .route(
            "/api/documents/{id}/threads/{thread_id}/replies",
            post(add_reply_handler),
        )
        // Presence
        .route(
            "/api/documents/{id}/presence/{session_id}",
            put(publish_presence_handler)
                .get(get_presence_handler)
                .delete(leave_presence_handler),
        )
        // Notifications
        .route("/api/notifications", get(list_notifications_handler))
        .route(
            "/api/notifications/read-all",
            post(mark_all_notifications_read_handler),
        )
        .route(
            "/api/notifications/{id}/read",
            post(mark_notification_read_handler),
        )
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(observability::http_make_span())
                .on_response(observability::response_logger()),
        )
        .layer(observability::request_context_layer())
        .with_state(state)
}
