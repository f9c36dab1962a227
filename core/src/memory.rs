//! In-memory stand-ins for the external room service and identity service.
//!
//! Used by tests and by the ephemeral local server mode. Failure injection
//! switches mimic transport errors from the real services.

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::{
    comment::{CommentReplyRecord, CommentStore, CommentThreadRecord},
    document::{DocumentAccessRepository, DocumentRecord, NewRoom, RoomFilter, RoomUpdate},
    identity::{IdentityProvider, UserProfile, normalize_email},
    ids::{BlockId, DocId, NotificationId, ThreadId, UserId},
    notification::{NotificationCenter, NotificationRecord, NotificationTrigger},
};

#[derive(Default)]
pub struct InMemoryRoomService {
    rooms: RwLock<BTreeMap<DocId, DocumentRecord>>,
    threads: RwLock<BTreeMap<(DocId, ThreadId), CommentThreadRecord>>,
    notifications: RwLock<Vec<NotificationRecord>>,
    trigger_attempts: AtomicU32,
    failing_triggers: AtomicU32,
    fail_room_writes: AtomicBool,
    unavailable: AtomicBool,
}

impl InMemoryRoomService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` notification submissions.
    pub fn fail_next_triggers(&self, count: u32) {
        self.failing_triggers.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_room_writes(&self, fail: bool) {
        self.fail_room_writes.store(fail, Ordering::SeqCst);
    }

    /// Every call fails, as if the service were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn trigger_attempts(&self) -> u32 {
        self.trigger_attempts.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.notifications.read().clone()
    }

    pub fn notifications_for(&self, user_id: &UserId) -> Vec<NotificationRecord> {
        self.notifications
            .read()
            .iter()
            .filter(|n| &n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn room(&self, room_id: &DocId) -> Option<DocumentRecord> {
        self.rooms.read().get(room_id).cloned()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("room service unavailable");
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_available()?;
        if self.fail_room_writes.load(Ordering::SeqCst) {
            bail!("room service rejected the write");
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentAccessRepository for InMemoryRoomService {
    async fn create_room(&self, room: NewRoom) -> Result<DocumentRecord> {
        self.ensure_writable()?;
        let mut rooms = self.rooms.write();
        if rooms.contains_key(&room.id) {
            return Err(anyhow!("room {} already exists", room.id));
        }

        let now = Utc::now();
        let record = DocumentRecord {
            id: room.id.clone(),
            metadata: room.metadata,
            users_accesses: room.users_accesses,
            default_accesses: room.default_accesses,
            created_at: Some(now),
            last_connection_at: None,
        };
        rooms.insert(room.id, record.clone());
        Ok(record)
    }

    async fn get_room(&self, room_id: &DocId) -> Result<Option<DocumentRecord>> {
        self.ensure_available()?;
        Ok(self.rooms.read().get(room_id).cloned())
    }

    async fn update_room(
        &self,
        room_id: &DocId,
        update: RoomUpdate,
    ) -> Result<Option<DocumentRecord>> {
        self.ensure_writable()?;
        let mut rooms = self.rooms.write();
        let Some(record) = rooms.get_mut(room_id) else {
            return Ok(None);
        };

        if let Some(title) = update.metadata.and_then(|m| m.title) {
            record.metadata.title = title;
        }
        for (user_id, capabilities) in update.users_accesses {
            match capabilities {
                Some(capabilities) => {
                    record.users_accesses.insert(user_id, capabilities);
                }
                None => {
                    record.users_accesses.remove(&user_id);
                }
            }
        }

        Ok(Some(record.clone()))
    }

    async fn delete_room(&self, room_id: &DocId) -> Result<bool> {
        self.ensure_writable()?;
        let removed = self.rooms.write().remove(room_id).is_some();
        if removed {
            self.threads.write().retain(|(room, _), _| room != room_id);
        }
        Ok(removed)
    }

    async fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<DocumentRecord>> {
        self.ensure_available()?;
        let mut rooms: Vec<DocumentRecord> = self
            .rooms
            .read()
            .values()
            .filter(|record| match filter.user_id.as_ref() {
                Some(user_id) => {
                    record.is_creator(user_id) || record.users_accesses.contains_key(user_id)
                }
                None => true,
            })
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }
}

#[async_trait]
impl CommentStore for InMemoryRoomService {
    async fn create_thread(&self, thread: CommentThreadRecord) -> Result<CommentThreadRecord> {
        self.ensure_writable()?;
        if !self.rooms.read().contains_key(&thread.room_id) {
            bail!("room {} does not exist", thread.room_id);
        }
        self.threads
            .write()
            .insert((thread.room_id.clone(), thread.id.clone()), thread.clone());
        Ok(thread)
    }

    async fn find_thread(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
    ) -> Result<Option<CommentThreadRecord>> {
        self.ensure_available()?;
        Ok(self
            .threads
            .read()
            .get(&(room_id.clone(), thread_id.clone()))
            .cloned())
    }

    async fn list_threads(
        &self,
        room_id: &DocId,
        bloq_id: &BlockId,
    ) -> Result<Vec<CommentThreadRecord>> {
        self.ensure_available()?;
        Ok(self
            .threads
            .read()
            .iter()
            .filter(|((room, _), thread)| room == room_id && &thread.metadata.bloq_id == bloq_id)
            .map(|(_, thread)| thread.clone())
            .collect())
    }

    async fn set_resolved(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
        resolved: bool,
        _actor_id: &UserId,
    ) -> Result<Option<CommentThreadRecord>> {
        self.ensure_writable()?;
        let mut threads = self.threads.write();
        let Some(thread) = threads.get_mut(&(room_id.clone(), thread_id.clone())) else {
            return Ok(None);
        };
        thread.metadata.resolved = resolved;
        thread.updated_at = Utc::now();
        Ok(Some(thread.clone()))
    }

    async fn add_reply(
        &self,
        room_id: &DocId,
        thread_id: &ThreadId,
        reply: CommentReplyRecord,
    ) -> Result<Option<CommentThreadRecord>> {
        self.ensure_writable()?;
        let mut threads = self.threads.write();
        let Some(thread) = threads.get_mut(&(room_id.clone(), thread_id.clone())) else {
            return Ok(None);
        };
        thread.updated_at = reply.created_at;
        thread.replies.push(reply);
        Ok(Some(thread.clone()))
    }
}

#[async_trait]
impl NotificationCenter for InMemoryRoomService {
    async fn trigger(&self, notification: NotificationTrigger) -> Result<()> {
        self.trigger_attempts.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        let failing = self
            .failing_triggers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failing {
            bail!("notification service rejected trigger");
        }

        let mut notifications = self.notifications.write();
        // Retries reuse the id; the service keeps the first submission.
        if notifications.iter().any(|n| n.id == notification.id) {
            return Ok(());
        }
        notifications.push(NotificationRecord::from_trigger(notification, Utc::now()));
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>> {
        self.ensure_available()?;
        let mut records: Vec<NotificationRecord> = self
            .notifications
            .read()
            .iter()
            .filter(|n| &n.user_id == user_id && (!unread_only || n.is_unread()))
            .cloned()
            .collect();
        records.reverse();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn mark_read(
        &self,
        user_id: &UserId,
        notification_id: &NotificationId,
    ) -> Result<Option<NotificationRecord>> {
        self.ensure_available()?;
        let mut notifications = self.notifications.write();
        let Some(record) = notifications
            .iter_mut()
            .find(|n| &n.id == notification_id && &n.user_id == user_id)
        else {
            return Ok(None);
        };
        record.mark_read(Utc::now());
        Ok(Some(record.clone()))
    }

    async fn mark_all_read(&self, user_id: &UserId) -> Result<u64> {
        self.ensure_available()?;
        let now = Utc::now();
        let mut updated = 0;
        for record in self
            .notifications
            .write()
            .iter_mut()
            .filter(|n| &n.user_id == user_id && n.is_unread())
        {
            record.mark_read(now);
            updated += 1;
        }
        Ok(updated)
    }
}

/// Identity directory keyed by user id, with issued session tokens.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<BTreeMap<UserId, UserProfile>>,
    sessions: RwLock<HashMap<String, UserId>>,
    unavailable: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users.write().insert(profile.id.clone(), profile);
    }

    pub fn issue_session(&self, token: impl Into<String>, user_id: &UserId) {
        self.sessions.write().insert(token.into(), user_id.clone());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("identity service unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for InMemoryDirectory {
    async fn resolve_user_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        self.ensure_available()?;
        let wanted = normalize_email(email);
        Ok(self
            .users
            .read()
            .values()
            .find(|profile| normalize_email(&profile.email) == wanted)
            .cloned())
    }

    async fn resolve_user_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        self.ensure_available()?;
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn resolve_users_by_ids(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>> {
        self.ensure_available()?;
        let users = self.users.read();
        Ok(user_ids
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect())
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<UserProfile>> {
        self.ensure_available()?;
        let Some(user_id) = self.sessions.read().get(token).cloned() else {
            return Ok(None);
        };
        Ok(self.users.read().get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::{CapabilitySet, GrantLevel, UserAccesses},
        document::DocumentMetadata,
        notification::{ActivityData, NotificationKind},
    };

    fn new_room(id: &str, creator: &str) -> NewRoom {
        let mut users_accesses = UserAccesses::new();
        users_accesses.insert(UserId::from(creator), GrantLevel::Editor.capabilities());
        NewRoom {
            id: DocId::from(id),
            metadata: DocumentMetadata {
                creator_id: UserId::from(creator),
                email: format!("{creator}@x.com"),
                title: "Untitled".into(),
            },
            users_accesses,
            default_accesses: CapabilitySet::empty(),
        }
    }

    #[tokio::test]
    async fn room_updates_apply_grants_and_revocations() {
        let store = InMemoryRoomService::new();
        store.create_room(new_room("r1", "owner")).await.unwrap();

        let room_id = DocId::from("r1");
        let guest = UserId::from("guest");
        store
            .update_room(&room_id, RoomUpdate::grant(guest.clone(), GrantLevel::Viewer.capabilities()))
            .await
            .unwrap();
        assert!(store.room(&room_id).unwrap().users_accesses.contains_key(&guest));

        let updated = store
            .update_room(&room_id, RoomUpdate::revoke(guest.clone()))
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.users_accesses.contains_key(&guest));

        assert!(
            store
                .update_room(&DocId::from("missing"), RoomUpdate::title("x"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_room_ids_are_rejected() {
        let store = InMemoryRoomService::new();
        store.create_room(new_room("r1", "owner")).await.unwrap();
        assert!(store.create_room(new_room("r1", "owner")).await.is_err());
    }

    #[tokio::test]
    async fn failing_triggers_are_counted_down() {
        let store = InMemoryRoomService::new();
        store.fail_next_triggers(1);
        let trigger = NotificationTrigger::new(
            NotificationKind::DocumentAccess,
            UserId::from("u2"),
            DocId::from("r1"),
            ActivityData::default(),
        );

        assert!(store.trigger(trigger.clone()).await.is_err());
        store.trigger(trigger.clone()).await.unwrap();
        store.trigger(trigger).await.unwrap();

        assert_eq!(store.trigger_attempts(), 3);
        assert_eq!(store.notifications().len(), 1);
    }

    #[tokio::test]
    async fn directory_resolves_email_case_insensitively() {
        let directory = InMemoryDirectory::new();
        directory.insert(UserProfile::new("u1", "Ada", "Ada@Example.com", ""));
        directory.issue_session("token-1", &UserId::from("u1"));

        let found = directory
            .resolve_user_by_email("ada@example.com")
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(UserId::from("u1")));
        assert!(directory.resolve_session("token-1").await.unwrap().is_some());
        assert!(directory.resolve_session("nope").await.unwrap().is_none());

        directory.set_unavailable(true);
        assert!(directory.resolve_user_by_id(&UserId::from("u1")).await.is_err());
    }
}
