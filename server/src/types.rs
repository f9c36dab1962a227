// Request and response types for REST API handlers

use chrono::{DateTime, Utc};
use lessonroom_core::{
    access::{AccessLevel, GrantLevel, UserAccesses},
    comment::CommentThreadRecord,
    document::{DocumentRecord, DocumentSummary},
    identity::UserProfile,
    ids::{BlockId, DocId, SessionId, UserId},
    notification::NotificationView,
    presence::{Cursor, OthersByBlock},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    comment::CommentPosted,
    doc::service::{AccessMutation, Collaborator, OpenedDocument},
    notification::DispatchOutcome,
    state::BackendKind,
};

// ========== Request Types ==========

#[derive(Deserialize)]
pub(crate) struct RenameDocumentRequest {
    pub(crate) title: String,
}

#[derive(Deserialize)]
pub(crate) struct ShareDocumentRequest {
    pub(crate) email: String,
    pub(crate) level: GrantLevel,
}

#[derive(Deserialize)]
pub(crate) struct RemoveCollaboratorRequest {
    pub(crate) email: String,
}

#[derive(Deserialize)]
pub(crate) struct CommentBodyRequest {
    pub(crate) body: JsonValue,
}

#[derive(Deserialize, Default)]
pub(crate) struct ThreadListQuery {
    #[serde(default)]
    pub(crate) all: bool,
}

#[derive(Deserialize, Default)]
pub(crate) struct NotificationListQuery {
    #[serde(default)]
    pub(crate) unread: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PresenceUpdateRequest {
    #[serde(default)]
    pub(crate) cursor: Option<Cursor>,
    #[serde(default)]
    pub(crate) active_block_id: Option<BlockId>,
}

// ========== Response Types ==========

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) version: String,
    pub(crate) backend: BackendKind,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentResponse {
    pub(crate) id: DocId,
    pub(crate) title: String,
    pub(crate) creator_id: UserId,
    pub(crate) access: AccessLevel,
    pub(crate) users_accesses: UserAccesses,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) last_connection_at: Option<DateTime<Utc>>,
}

impl DocumentResponse {
    pub(crate) fn new(record: DocumentRecord, access: AccessLevel) -> Self {
        Self {
            id: record.id,
            title: record.metadata.title,
            creator_id: record.metadata.creator_id,
            access,
            users_accesses: record.users_accesses,
            created_at: record.created_at,
            last_connection_at: record.last_connection_at,
        }
    }

    pub(crate) fn for_user(record: DocumentRecord, user_id: &UserId) -> Self {
        let access = record.access_level(user_id);
        Self::new(record, access)
    }
}

impl From<OpenedDocument> for DocumentResponse {
    fn from(opened: OpenedDocument) -> Self {
        Self::new(opened.record, opened.access)
    }
}

#[derive(Serialize)]
pub(crate) struct DocumentListResponse {
    pub(crate) documents: Vec<DocumentSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccessMutationResponse {
    pub(crate) document: DocumentResponse,
    pub(crate) target: UserProfile,
    pub(crate) previous_access: AccessLevel,
    pub(crate) notification: DispatchOutcome,
    pub(crate) warnings: Vec<String>,
}

impl AccessMutationResponse {
    pub(crate) fn new(mutation: AccessMutation, actor_id: &UserId) -> Self {
        let warnings = mutation.notification.warning().into_iter().collect();
        Self {
            document: DocumentResponse::for_user(mutation.document, actor_id),
            target: mutation.target,
            previous_access: mutation.previous,
            notification: mutation.notification,
            warnings,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct CollaboratorsResponse {
    pub(crate) collaborators: Vec<Collaborator>,
}

#[derive(Serialize)]
pub(crate) struct ThreadListResponse {
    pub(crate) threads: Vec<CommentThreadRecord>,
}

#[derive(Serialize)]
pub(crate) struct ThreadResponse {
    pub(crate) thread: CommentThreadRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) warnings: Vec<String>,
}

impl From<CommentThreadRecord> for ThreadResponse {
    fn from(thread: CommentThreadRecord) -> Self {
        Self {
            thread,
            warnings: Vec::new(),
        }
    }
}

impl From<CommentPosted> for ThreadResponse {
    fn from(posted: CommentPosted) -> Self {
        let warnings = posted.warnings();
        Self {
            thread: posted.thread,
            warnings,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotificationListResponse {
    pub(crate) notifications: Vec<NotificationView>,
    pub(crate) unread_count: usize,
}

#[derive(Serialize)]
pub(crate) struct MarkAllReadResponse {
    pub(crate) updated: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PresenceResponse {
    pub(crate) session_id: SessionId,
    pub(crate) others_by_block: OthersByBlock,
}
