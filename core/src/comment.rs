use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    identity::UserProfile,
    ids::{BlockId, DocId, ThreadId, UserId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMetadata {
    pub bloq_id: BlockId,
    #[serde(default)]
    pub resolved: bool,
    pub author_name: String,
    pub author_email: String,
    #[serde(default)]
    pub author_image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentReplyRecord {
    pub id: String,
    pub author_id: UserId,
    pub author_name: String,
    /// Rich content as produced by the editor engine; stored as-is.
    pub body: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadRecord {
    pub id: ThreadId,
    pub room_id: DocId,
    pub author_id: UserId,
    pub metadata: ThreadMetadata,
    pub body: JsonValue,
    #[serde(default)]
    pub replies: Vec<CommentReplyRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentThreadRecord {
    /// Fresh, unresolved thread attached to `bloq_id`.
    pub fn open(room_id: DocId, bloq_id: BlockId, author: &UserProfile, body: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::generate(),
            room_id,
            author_id: author.id.clone(),
            metadata: ThreadMetadata {
                bloq_id,
                resolved: false,
                author_name: author.name.clone(),
                author_email: author.email.clone(),
                author_image: author.avatar.clone(),
            },
            body,
            replies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.metadata.resolved
    }

    /// Thread author followed by reply authors, without duplicates.
    pub fn participants(&self) -> Vec<UserId> {
        let mut participants = vec![self.author_id.clone()];
        for reply in &self.replies {
            if !participants.contains(&reply.author_id) {
                participants.push(reply.author_id.clone());
            }
        }
        participants
    }
}

/// Sort threads the way the discussion panel stacks them: oldest first.
pub fn oldest_first(mut threads: Vec<CommentThreadRecord>) -> Vec<CommentThreadRecord> {
    threads.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    threads
}

pub fn unresolved_oldest_first(threads: Vec<CommentThreadRecord>) -> Vec<CommentThreadRecord> {
    oldest_first(threads.into_iter().filter(|t| !t.is_resolved()).collect())
}

/// Thread storage on the external room service.
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create_thread(&self, thread: CommentThreadRecord) -> Result<CommentThreadRecord>;
    async fn find_thread(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
    ) -> Result<Option<CommentThreadRecord>>;
    /// All threads whose `metadata.bloqId` equals `bloq_id`, in store order.
    async fn list_threads(
        &self,
        room_id: &DocId,
        bloq_id: &BlockId,
    ) -> Result<Vec<CommentThreadRecord>>;
    /// `actor_id` is recorded by the store as the user who toggled it.
    async fn set_resolved(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
        resolved: bool,
        actor_id: &UserId,
    ) -> Result<Option<CommentThreadRecord>>;
    async fn add_reply(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
        reply: CommentReplyRecord,
    ) -> Result<Option<CommentThreadRecord>>;
}

pub type CommentStoreRef = Arc<dyn CommentStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn thread_at(id: &str, minutes: i64, resolved: bool) -> CommentThreadRecord {
        let author = UserProfile::new("u1", "Ada", "ada@x.com", "");
        let mut thread = CommentThreadRecord::open(
            DocId::from("room"),
            BlockId::from("b1"),
            &author,
            json!({ "text": id }),
        );
        thread.id = ThreadId::from(id);
        thread.created_at = Utc::now() + Duration::minutes(minutes);
        thread.metadata.resolved = resolved;
        thread
    }

    #[test]
    fn unresolved_threads_are_returned_oldest_first() {
        let threads = vec![
            thread_at("late", 10, false),
            thread_at("done", -5, true),
            thread_at("early", 0, false),
        ];

        let ids: Vec<String> = unresolved_oldest_first(threads)
            .into_iter()
            .map(|t| t.id.into_inner())
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn participants_are_deduplicated_in_order() {
        let mut thread = thread_at("t", 0, false);
        for author in ["u2", "u1", "u2", "u3"] {
            thread.replies.push(CommentReplyRecord {
                id: format!("r-{author}"),
                author_id: UserId::from(author),
                author_name: author.into(),
                body: JsonValue::Null,
                created_at: Utc::now(),
            });
        }
        let ids: Vec<String> = thread
            .participants()
            .into_iter()
            .map(UserId::into_inner)
            .collect();
        assert_eq!(ids, vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn new_threads_start_unresolved_with_author_snapshot() {
        let thread = thread_at("t", 0, false);
        assert!(!thread.is_resolved());
        assert_eq!(thread.metadata.author_email, "ada@x.com");
        assert_eq!(
            serde_json::to_value(&thread.metadata).unwrap()["bloqId"],
            "b1"
        );
    }
}
