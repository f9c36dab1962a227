use std::sync::Arc;

use axum::extract::FromRef;
use chrono::Utc;
use lessonroom_core::{
    comment::{
        CommentReplyRecord, CommentStoreRef, CommentThreadRecord, oldest_first,
        unresolved_oldest_first,
    },
    document::DocumentRecord,
    identity::UserProfile,
    ids::{BlockId, DocId, ThreadId, UserId},
};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use crate::{
    AppError,
    comment::notifications::{notify_comment_creation, notify_comment_reply},
    notification::{DispatchOutcome, NotificationDispatcher},
    state::AppState,
};

/// A thread after a committed write, with the outcome of every best-effort
/// notification it caused.
#[derive(Debug, Clone)]
pub struct CommentPosted {
    pub thread: CommentThreadRecord,
    pub notifications: Vec<DispatchOutcome>,
}

impl CommentPosted {
    pub fn warnings(&self) -> Vec<String> {
        self.notifications
            .iter()
            .filter_map(DispatchOutcome::warning)
            .collect()
    }
}

/// Per-block comment threads on the room service. Role checks happen in the
/// calling context, which loads the document first.
pub struct CommentThreadGateway {
    store: CommentStoreRef,
    notifications: Arc<NotificationDispatcher>,
}

impl CommentThreadGateway {
    pub fn new(store: CommentStoreRef, notifications: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn create_thread(
        &self,
        document: &DocumentRecord,
        bloq_id: &BlockId,
        author: &UserProfile,
        body: JsonValue,
    ) -> Result<CommentPosted, AppError> {
        ensure_body(&body)?;

        let thread = CommentThreadRecord::open(
            document.id.clone(),
            bloq_id.clone(),
            author,
            body,
        );
        let thread = self
            .store
            .create_thread(thread)
            .await
            .map_err(AppError::from_anyhow)?;
        info!(
            doc_id = %document.id,
            thread_id = %thread.id,
            bloq_id = %bloq_id,
            actor_id = %author.id,
            "comment thread created"
        );

        let notifications =
            notify_comment_creation(&self.notifications, author, document, &thread).await;
        Ok(CommentPosted {
            thread,
            notifications,
        })
    }

    pub async fn list_unresolved(
        &self,
        doc_id: &DocId,
        bloq_id: &BlockId,
    ) -> Result<Vec<CommentThreadRecord>, AppError> {
        let threads = self
            .store
            .list_threads(doc_id, bloq_id)
            .await
            .map_err(AppError::from_anyhow)?;
        Ok(unresolved_oldest_first(threads))
    }

    pub async fn list_threads(
        &self,
        doc_id: &DocId,
        bloq_id: &BlockId,
    ) -> Result<Vec<CommentThreadRecord>, AppError> {
        let threads = self
            .store
            .list_threads(doc_id, bloq_id)
            .await
            .map_err(AppError::from_anyhow)?;
        Ok(oldest_first(threads))
    }

    pub async fn resolve(
        &self,
        doc_id: &DocId,
        thread_id: &ThreadId,
        actor_id: &UserId,
    ) -> Result<CommentThreadRecord, AppError> {
        self.set_resolved(doc_id, thread_id, true, actor_id).await
    }

    pub async fn reopen(
        &self,
        doc_id: &DocId,
        thread_id: &ThreadId,
        actor_id: &UserId,
    ) -> Result<CommentThreadRecord, AppError> {
        self.set_resolved(doc_id, thread_id, false, actor_id).await
    }

    pub async fn add_reply(
        &self,
        document: &DocumentRecord,
        thread_id: &ThreadId,
        author: &UserProfile,
        body: JsonValue,
    ) -> Result<CommentPosted, AppError> {
        ensure_body(&body)?;

        let reply = CommentReplyRecord {
            id: format!("cm_{}", Uuid::new_v4().simple()),
            author_id: author.id.clone(),
            author_name: author.name.clone(),
            body,
            created_at: Utc::now(),
        };
        let thread = self
            .store
            .add_reply(&document.id, thread_id, reply)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::thread_not_found(&document.id, thread_id))?;
        info!(
            doc_id = %document.id,
            thread_id = %thread_id,
            actor_id = %author.id,
            "comment reply added"
        );

        let notifications =
            notify_comment_reply(&self.notifications, author, document, &thread).await;
        Ok(CommentPosted {
            thread,
            notifications,
        })
    }

    async fn set_resolved(
        &self,
        doc_id: &DocId,
        thread_id: &ThreadId,
        resolved: bool,
        actor_id: &UserId,
    ) -> Result<CommentThreadRecord, AppError> {
        let thread = self
            .store
            .set_resolved(doc_id, thread_id, resolved, actor_id)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::thread_not_found(doc_id, thread_id))?;
        info!(
            doc_id = %doc_id,
            thread_id = %thread_id,
            actor_id = %actor_id,
            resolved,
            "comment thread updated"
        );
        Ok(thread)
    }
}

fn ensure_body(body: &JsonValue) -> Result<(), AppError> {
    let empty = match body {
        JsonValue::Null => true,
        JsonValue::String(text) => text.trim().is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(fields) => fields.is_empty(),
        _ => false,
    };
    if empty {
        return Err(AppError::bad_request("comment body must not be empty"));
    }
    Ok(())
}

impl FromRef<AppState> for Arc<CommentThreadGateway> {
    fn from_ref(state: &AppState) -> Arc<CommentThreadGateway> {
        Arc::clone(&state.comment_gateway)
    }
}

#[cfg(test)]
mod tests {
    use lessonroom_core::access::GrantLevel;
    use serde_json::json;

    use crate::{ErrorKind, test_support::setup_env};

    use super::*;

    #[tokio::test]
    async fn unresolved_threads_are_listed_oldest_first_per_block() {
        let env = setup_env();
        let doc = env
            .state
            .doc_access_service
            .create(&env.owner.id, &env.owner.email)
            .await
            .unwrap();
        let gateway = &env.state.comment_gateway;
        let intro = BlockId::from("intro");

        let first = gateway
            .create_thread(&doc, &intro, &env.owner, json!({"text": "first"}))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = gateway
            .create_thread(&doc, &intro, &env.owner, json!({"text": "second"}))
            .await
            .unwrap();
        gateway
            .create_thread(&doc, &BlockId::from("quiz"), &env.owner, json!("elsewhere"))
            .await
            .unwrap();

        let listed = gateway.list_unresolved(&doc.id, &intro).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![first.thread.id.clone(), second.thread.id.clone()]);
        assert!(listed.iter().all(|t| !t.is_resolved()));

        gateway.resolve(&doc.id, &first.thread.id, &env.owner.id).await.unwrap();
        let listed = gateway.list_unresolved(&doc.id, &intro).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second.thread.id);
        assert_eq!(gateway.list_threads(&doc.id, &intro).await.unwrap().len(), 2);

        let reopened = gateway.reopen(&doc.id, &first.thread.id, &env.owner.id).await.unwrap();
        assert!(!reopened.is_resolved());
        assert_eq!(gateway.list_unresolved(&doc.id, &intro).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn thread_creation_notifies_creator_but_not_author() {
        let env = setup_env();
        let docs = &env.state.doc_access_service;
        let doc = docs.create(&env.owner.id, &env.owner.email).await.unwrap();
        docs.share(&doc.id, &env.editor.email, GrantLevel::Editor, &env.owner)
            .await
            .unwrap();
        let before = env.rooms.notifications_for(&env.owner.id).len();

        let posted = env
            .state
            .comment_gateway
            .create_thread(&doc, &BlockId::from("intro"), &env.editor, json!("Check this"))
            .await
            .unwrap();
        assert_eq!(posted.notifications.len(), 1);
        assert!(posted.warnings().is_empty());

        let owner_inbox = env.rooms.notifications_for(&env.owner.id);
        assert_eq!(owner_inbox.len(), before + 1);
        let latest = owner_inbox.last().unwrap();
        assert_eq!(latest.kind.as_str(), "documentComment");
        assert_eq!(latest.activity_data.bloq_id.as_deref(), Some("intro"));

        // The creator commenting on their own document notifies nobody.
        let own = env
            .state
            .comment_gateway
            .create_thread(&doc, &BlockId::from("intro"), &env.owner, json!("Note"))
            .await
            .unwrap();
        assert!(own.notifications.is_empty());
    }

    #[tokio::test]
    async fn replies_notify_prior_participants() {
        let env = setup_env();
        let docs = &env.state.doc_access_service;
        let doc = docs.create(&env.owner.id, &env.owner.email).await.unwrap();
        docs.share(&doc.id, &env.editor.email, GrantLevel::Editor, &env.owner)
            .await
            .unwrap();
        docs.share(&doc.id, &env.viewer.email, GrantLevel::Viewer, &env.owner)
            .await
            .unwrap();
        let gateway = &env.state.comment_gateway;

        let thread = gateway
            .create_thread(&doc, &BlockId::from("intro"), &env.editor, json!("Typo?"))
            .await
            .unwrap()
            .thread;
        let editor_before = env.rooms.notifications_for(&env.editor.id).len();

        let reply = gateway
            .add_reply(&doc, &thread.id, &env.viewer, json!("Fixed it"))
            .await
            .unwrap();
        assert_eq!(reply.thread.replies.len(), 1);
        assert_eq!(reply.thread.replies[0].author_id, env.viewer.id);
        // Creator and the thread author.
        assert_eq!(reply.notifications.len(), 2);
        assert_eq!(
            env.rooms.notifications_for(&env.editor.id).len(),
            editor_before + 1
        );
    }

    #[tokio::test]
    async fn unknown_threads_and_empty_bodies_are_rejected() {
        let env = setup_env();
        let doc = env
            .state
            .doc_access_service
            .create(&env.owner.id, &env.owner.email)
            .await
            .unwrap();
        let gateway = &env.state.comment_gateway;

        let err = gateway
            .resolve(&doc.id, &ThreadId::from("th_missing"), &env.owner.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.name(), "THREAD_NOT_FOUND");

        let err = gateway
            .create_thread(&doc, &BlockId::from("intro"), &env.owner, json!("  "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = gateway
            .add_reply(&doc, &ThreadId::from("th_missing"), &env.owner, json!("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failing_comment_notification_is_a_warning() {
        let env = setup_env();
        let docs = &env.state.doc_access_service;
        let doc = docs.create(&env.owner.id, &env.owner.email).await.unwrap();
        env.rooms.fail_next_triggers(u32::MAX);

        let posted = env
            .state
            .comment_gateway
            .create_thread(&doc, &BlockId::from("intro"), &env.editor, json!("Hello"))
            .await
            .unwrap();
        assert_eq!(posted.warnings().len(), 1);
        assert_eq!(
            env.state
                .comment_gateway
                .list_unresolved(&doc.id, &BlockId::from("intro"))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
