use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lessonroom_core::{
    comment::{CommentReplyRecord, CommentStore, CommentThreadRecord, ThreadMetadata},
    document::{DocumentAccessRepository, DocumentRecord, NewRoom, RoomFilter, RoomUpdate},
    ids::{BlockId, DocId, NotificationId, ThreadId, UserId},
    notification::{
        ActivityData, NotificationCenter, NotificationKind, NotificationRecord,
        NotificationTrigger,
    },
};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value as JsonValue, json};
use tracing::debug;
use url::Url;

use super::RestClient;

const PAGE_LIMIT: &str = "100";

/// Liveblocks-style room service: rooms, comment threads and the inbox.
#[derive(Clone)]
pub struct RoomServiceClient {
    rest: RestClient,
}

impl RoomServiceClient {
    pub fn new(client: Client, base_url: &str, secret_key: &str) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(client, "room service", base_url, secret_key)?,
        })
    }

    /// Follows `nextCursor` until the service reports no further page.
    async fn fetch_all_pages<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut page_url = url.clone();
            if let Some(cursor) = cursor.as_deref() {
                page_url
                    .query_pairs_mut()
                    .append_pair("startingAfter", cursor);
            }
            let Some(page) = self.rest.get_json::<DataPage<T>>(page_url).await? else {
                break;
            };
            items.extend(page.data);

            match page.next_cursor.filter(|next| !next.is_empty()) {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    bail!("room service repeated page cursor {next} for {}", url.path());
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(items)
    }

    async fn list_inbox(&self, user_id: &UserId) -> Result<Vec<NotificationRecord>> {
        let mut url = self
            .rest
            .endpoint(&["users", user_id.as_str(), "inbox-notifications"]);
        url.query_pairs_mut().append_pair("limit", PAGE_LIMIT);
        let notifications: Vec<WireInboxNotification> = self.fetch_all_pages(url).await?;
        Ok(notifications
            .into_iter()
            .filter_map(|wire| wire.into_record(user_id))
            .collect())
    }

    async fn find_inbox(
        &self,
        user_id: &UserId,
        notification_id: &NotificationId,
    ) -> Result<Option<NotificationRecord>> {
        let url = self.rest.endpoint(&[
            "users",
            user_id.as_str(),
            "inbox-notifications",
            notification_id.as_str(),
        ]);
        let wire: Option<WireInboxNotification> = self.rest.get_json(url).await?;
        Ok(wire.and_then(|wire| wire.into_record(user_id)))
    }

    async fn read_inbox(&self, user_id: &UserId, notification_id: &NotificationId) -> Result<bool> {
        let url = self.rest.endpoint(&[
            "users",
            user_id.as_str(),
            "inbox-notifications",
            notification_id.as_str(),
            "read",
        ]);
        self.rest.post_unit(url, &json!({})).await
    }
}

#[async_trait]
impl DocumentAccessRepository for RoomServiceClient {
    async fn create_room(&self, room: NewRoom) -> Result<DocumentRecord> {
        let url = self.rest.endpoint(&["rooms"]);
        let record: Option<DocumentRecord> = self.rest.post_json(url, &room).await?;
        record.with_context(|| format!("room service did not return created room {}", room.id))
    }

    async fn get_room(&self, room_id: &DocId) -> Result<Option<DocumentRecord>> {
        let url = self.rest.endpoint(&["rooms", room_id.as_str()]);
        self.rest.get_json(url).await
    }

    async fn update_room(
        &self,
        room_id: &DocId,
        update: RoomUpdate,
    ) -> Result<Option<DocumentRecord>> {
        let url = self.rest.endpoint(&["rooms", room_id.as_str()]);
        self.rest.post_json(url, &update).await
    }

    async fn delete_room(&self, room_id: &DocId) -> Result<bool> {
        let url = self.rest.endpoint(&["rooms", room_id.as_str()]);
        self.rest.delete(url).await
    }

    async fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<DocumentRecord>> {
        let mut url = self.rest.endpoint(&["rooms"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", PAGE_LIMIT);
            if let Some(user_id) = filter.user_id.as_ref() {
                query.append_pair("userId", user_id.as_str());
            }
        }
        self.fetch_all_pages(url).await
    }
}

#[async_trait]
impl CommentStore for RoomServiceClient {
    async fn create_thread(&self, thread: CommentThreadRecord) -> Result<CommentThreadRecord> {
        let url = self
            .rest
            .endpoint(&["rooms", thread.room_id.as_str(), "threads"]);
        let body = json!({
            "comment": {
                "userId": thread.author_id,
                "createdAt": thread.created_at,
                "body": thread.body,
            },
            "metadata": thread.metadata,
        });
        let created: Option<WireThread> = self.rest.post_json(url, &body).await?;
        created
            .with_context(|| format!("room {} not found while creating thread", thread.room_id))?
            .into_record()
    }

    async fn find_thread(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
    ) -> Result<Option<CommentThreadRecord>> {
        let url = self
            .rest
            .endpoint(&["rooms", room_id.as_str(), "threads", thread_id.as_str()]);
        let wire: Option<WireThread> = self.rest.get_json(url).await?;
        wire.map(WireThread::into_record).transpose()
    }

    async fn list_threads(
        &self,
        room_id: &DocId,
        bloq_id: &BlockId,
    ) -> Result<Vec<CommentThreadRecord>> {
        let mut url = self.rest.endpoint(&["rooms", room_id.as_str(), "threads"]);
        url.query_pairs_mut()
            .append_pair("query", &block_thread_query(bloq_id)?);
        let wires: Vec<WireThread> = self.fetch_all_pages(url).await?;

        let mut threads = Vec::new();
        for wire in wires {
            let thread = wire.into_record()?;
            if &thread.metadata.bloq_id == bloq_id {
                threads.push(thread);
            }
        }
        Ok(threads)
    }

    async fn set_resolved(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
        resolved: bool,
        actor_id: &UserId,
    ) -> Result<Option<CommentThreadRecord>> {
        let url = self.rest.endpoint(&[
            "rooms",
            room_id.as_str(),
            "threads",
            thread_id.as_str(),
            "metadata",
        ]);
        let body = json!({
            "metadata": { "resolved": resolved },
            "userId": actor_id,
        });
        if !self.rest.post_unit(url, &body).await? {
            return Ok(None);
        }
        self.find_thread(room_id, thread_id).await
    }

    async fn add_reply(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
        reply: CommentReplyRecord,
    ) -> Result<Option<CommentThreadRecord>> {
        let url = self.rest.endpoint(&[
            "rooms",
            room_id.as_str(),
            "threads",
            thread_id.as_str(),
            "comments",
        ]);
        let body = json!({
            "userId": reply.author_id,
            "createdAt": reply.created_at,
            "body": reply.body,
            "metadata": { "authorName": reply.author_name },
        });
        if !self.rest.post_unit(url, &body).await? {
            return Ok(None);
        }
        self.find_thread(room_id, thread_id).await
    }
}

#[async_trait]
impl NotificationCenter for RoomServiceClient {
    async fn trigger(&self, notification: NotificationTrigger) -> Result<()> {
        let url = self.rest.endpoint(&["inbox-notifications", "trigger"]);
        let body = WireTrigger::from(&notification);
        let accepted = self.rest.post_unit(url, &body).await?;
        anyhow::ensure!(
            accepted,
            "notification trigger endpoint not found on room service"
        );
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>> {
        let mut records = self.list_inbox(user_id).await?;
        if unread_only {
            records.retain(NotificationRecord::is_unread);
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn mark_read(
        &self,
        user_id: &UserId,
        notification_id: &NotificationId,
    ) -> Result<Option<NotificationRecord>> {
        let Some(existing) = self.find_inbox(user_id, notification_id).await? else {
            return Ok(None);
        };
        if !existing.is_unread() {
            return Ok(Some(existing));
        }
        if !self.read_inbox(user_id, notification_id).await? {
            return Ok(None);
        }
        self.find_inbox(user_id, notification_id).await
    }

    async fn mark_all_read(&self, user_id: &UserId) -> Result<u64> {
        let mut marked = 0;
        for record in self.list_inbox(user_id).await? {
            if record.is_unread() && self.read_inbox(user_id, &record.id).await? {
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Thread filter in the room service query language. The value is a JSON
/// string literal.
fn block_thread_query(bloq_id: &BlockId) -> Result<String> {
    let literal = serde_json::to_string(bloq_id.as_str()).context("encode block id")?;
    Ok(format!("metadata[\"bloqId\"]:{literal}"))
}

/// Custom inbox kinds carry a `$` prefix on the room service.
fn wire_kind(kind: NotificationKind) -> String {
    format!("${}", kind.as_str())
}

fn parse_wire_kind(kind: &str) -> Option<NotificationKind> {
    match kind.trim_start_matches('$') {
        "documentAccess" => Some(NotificationKind::DocumentAccess),
        "documentShared" => Some(NotificationKind::DocumentShared),
        "documentComment" => Some(NotificationKind::DocumentComment),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTrigger<'a> {
    user_id: &'a UserId,
    kind: String,
    subject_id: &'a str,
    room_id: &'a DocId,
    activity_data: &'a ActivityData,
}

impl<'a> From<&'a NotificationTrigger> for WireTrigger<'a> {
    fn from(trigger: &'a NotificationTrigger) -> Self {
        Self {
            user_id: &trigger.user_id,
            kind: wire_kind(trigger.kind),
            subject_id: &trigger.subject_id,
            room_id: &trigger.room_id,
            activity_data: &trigger.activity_data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInboxNotification {
    id: NotificationId,
    kind: String,
    #[serde(default)]
    room_id: Option<DocId>,
    #[serde(default)]
    read_at: Option<DateTime<Utc>>,
    notified_at: DateTime<Utc>,
    #[serde(default)]
    activities: Vec<WireActivity>,
}

#[derive(Debug, Deserialize)]
struct WireActivity {
    #[serde(default)]
    data: ActivityData,
}

impl WireInboxNotification {
    /// Notifications of kinds this product did not send are skipped.
    fn into_record(self, user_id: &UserId) -> Option<NotificationRecord> {
        let Some(kind) = parse_wire_kind(&self.kind) else {
            debug!(kind = %self.kind, notification_id = %self.id, "skipping foreign inbox kind");
            return None;
        };
        Some(NotificationRecord {
            id: self.id,
            kind,
            user_id: user_id.clone(),
            room_id: self.room_id.unwrap_or_else(|| DocId::from("")),
            activity_data: self
                .activities
                .into_iter()
                .last()
                .map(|activity| activity.data)
                .unwrap_or_default(),
            read_at: self.read_at,
            created_at: self.notified_at,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireThread {
    id: ThreadId,
    room_id: DocId,
    metadata: ThreadMetadata,
    #[serde(default)]
    comments: Vec<WireComment>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    id: String,
    user_id: UserId,
    #[serde(default)]
    body: JsonValue,
    created_at: DateTime<Utc>,
    #[serde(default)]
    metadata: WireCommentMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCommentMetadata {
    #[serde(default)]
    author_name: Option<String>,
}

impl WireThread {
    /// The first comment is the thread body; the rest are replies.
    fn into_record(self) -> Result<CommentThreadRecord> {
        let mut comments = self.comments.into_iter();
        let first = comments
            .next()
            .with_context(|| format!("thread {} has no opening comment", self.id))?;

        let replies = comments
            .map(|comment| CommentReplyRecord {
                author_name: comment
                    .metadata
                    .author_name
                    .unwrap_or_else(|| comment.user_id.to_string()),
                id: comment.id,
                author_id: comment.user_id,
                body: comment.body,
                created_at: comment.created_at,
            })
            .collect();

        Ok(CommentThreadRecord {
            id: self.id,
            room_id: self.room_id,
            author_id: first.user_id,
            metadata: self.metadata,
            body: first.body,
            replies,
            created_at: self.created_at,
            updated_at: self.updated_at.unwrap_or(self.created_at),
        })
    }
}
