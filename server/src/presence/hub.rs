use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::extract::FromRef;
use dashmap::{DashMap, mapref::entry::Entry};
use lessonroom_core::{
    ids::{BlockId, DocId, SessionId, UserId},
    presence::{Cursor, OthersByBlock, Presence, PresenceSnapshot, PresenceUser, others_by_block},
};
use tokio::time::Instant;
use tracing::debug;

use crate::{AppError, state::AppState};

/// Latest presence of every live session in one document.
#[derive(Default)]
struct Room {
    sessions: PresenceSnapshot,
    last_seen: HashMap<SessionId, Instant>,
}

impl Room {
    fn upsert(&mut self, session_id: &SessionId, presence: Presence, now: Instant) {
        self.sessions.insert(session_id.clone(), presence);
        self.last_seen.insert(session_id.clone(), now);
    }

    fn remove(&mut self, session_id: &SessionId) -> bool {
        self.last_seen.remove(session_id);
        self.sessions.remove(session_id).is_some()
    }

    /// Drops sessions not seen within `ttl`. Returns how many went away.
    fn prune(&mut self, now: Instant, ttl: Duration) -> usize {
        let stale: Vec<SessionId> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= ttl)
            .map(|(session_id, _)| session_id.clone())
            .collect();
        for session_id in &stale {
            self.remove(session_id);
        }
        stale.len()
    }

    fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Per-document presence rooms. Every change happens while the room's map
/// entry is held, so a join can never land in a room that a concurrent leave
/// is dropping. Sessions that stop writing expire after the configured ttl.
#[derive(Clone)]
pub struct PresenceHub {
    rooms: Arc<DashMap<DocId, Room>>,
    ttl: Duration,
}

impl PresenceHub {
    pub fn new(ttl: Duration) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn snapshot(&self, doc_id: &DocId) -> PresenceSnapshot {
        let now = Instant::now();
        match self.rooms.entry(doc_id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().prune(now, self.ttl);
                if entry.get().is_empty() {
                    entry.remove();
                    PresenceSnapshot::new()
                } else {
                    entry.get().sessions.clone()
                }
            }
            Entry::Vacant(_) => PresenceSnapshot::new(),
        }
    }

    /// Starts (or restarts) a session with no cursor and no focused block.
    pub fn join(
        &self,
        doc_id: &DocId,
        session_id: &SessionId,
        user: PresenceUser,
    ) -> Result<(), AppError> {
        self.publish(doc_id, session_id, Presence::joined(user))?;
        debug!(doc_id = %doc_id, session_id = %session_id, "presence session joined");
        Ok(())
    }

    /// Replaces the session's own entry, joining it if needed. A session id
    /// already held by another user is rejected.
    pub fn publish(
        &self,
        doc_id: &DocId,
        session_id: &SessionId,
        presence: Presence,
    ) -> Result<(), AppError> {
        let now = Instant::now();
        let mut room = self.rooms.entry(doc_id.clone()).or_default();
        room.prune(now, self.ttl);
        if let Some(existing) = room.sessions.get(session_id) {
            ensure_session_owner(&existing.user.id, &presence.user.id)?;
        }
        room.upsert(session_id, presence, now);
        Ok(())
    }

    pub fn focus_block(&self, doc_id: &DocId, session_id: &SessionId, block_id: &BlockId) -> bool {
        self.update_own(doc_id, session_id, |presence| {
            presence.active_block_id = Some(block_id.clone());
        })
    }

    pub fn blur_block(&self, doc_id: &DocId, session_id: &SessionId) -> bool {
        self.update_own(doc_id, session_id, |presence| {
            presence.active_block_id = None;
        })
    }

    pub fn move_cursor(&self, doc_id: &DocId, session_id: &SessionId, cursor: Option<Cursor>) -> bool {
        self.update_own(doc_id, session_id, |presence| {
            presence.cursor = cursor;
        })
    }

    /// Removes the session. The room goes away with the last session.
    pub fn leave(
        &self,
        doc_id: &DocId,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<bool, AppError> {
        let Entry::Occupied(mut entry) = self.rooms.entry(doc_id.clone()) else {
            return Ok(false);
        };

        let room = entry.get_mut();
        room.prune(Instant::now(), self.ttl);
        let owner = room
            .sessions
            .get(session_id)
            .map(|existing| existing.user.id.clone());
        let left = match owner {
            Some(owner) => {
                ensure_session_owner(&owner, user_id)?;
                room.remove(session_id)
            }
            None => false,
        };

        if entry.get().is_empty() {
            entry.remove();
        }
        if left {
            debug!(doc_id = %doc_id, session_id = %session_id, "presence session left");
        }
        Ok(left)
    }

    pub fn others_by_block(&self, doc_id: &DocId, session_id: &SessionId) -> OthersByBlock {
        others_by_block(&self.snapshot(doc_id), session_id)
    }

    /// Expires stale sessions in every room and drops rooms left empty.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut expired = 0;
        self.rooms.retain(|_, room| {
            expired += room.prune(now, self.ttl);
            !room.is_empty()
        });
        if expired > 0 {
            debug!(expired, "expired idle presence sessions");
        }
        expired
    }

    pub fn active_documents(&self) -> usize {
        self.rooms.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn update_own(
        &self,
        doc_id: &DocId,
        session_id: &SessionId,
        apply: impl FnOnce(&mut Presence),
    ) -> bool {
        let Some(mut room) = self.rooms.get_mut(doc_id) else {
            return false;
        };
        let now = Instant::now();
        room.prune(now, self.ttl);
        let Some(presence) = room.sessions.get_mut(session_id) else {
            return false;
        };
        apply(presence);
        room.last_seen.insert(session_id.clone(), now);
        true
    }
}

fn ensure_session_owner(owner: &UserId, caller: &UserId) -> Result<(), AppError> {
    if owner == caller {
        Ok(())
    } else {
        Err(AppError::forbidden("This presence session belongs to another user."))
    }
}

impl FromRef<AppState> for PresenceHub {
    fn from_ref(state: &AppState) -> PresenceHub {
        state.presence_hub.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use lessonroom_core::identity::UserProfile;

    const TTL: Duration = Duration::from_secs(60);

    fn user(id: &str) -> PresenceUser {
        PresenceUser::from(&UserProfile::new(id, id.to_uppercase(), format!("{id}@x.com"), ""))
    }

    #[test]
    fn others_by_block_excludes_own_session_and_allows_shared_blocks() {
        let hub = PresenceHub::new(TTL);
        let doc = DocId::from("doc");
        let (a, b, c) = (SessionId::from("a"), SessionId::from("b"), SessionId::from("c"));
        hub.join(&doc, &a, user("ana")).unwrap();
        hub.join(&doc, &b, user("ben")).unwrap();
        hub.join(&doc, &c, user("cai")).unwrap();

        let intro = BlockId::from("intro");
        assert!(hub.focus_block(&doc, &a, &intro));
        assert!(hub.focus_block(&doc, &b, &intro));

        let for_c = hub.others_by_block(&doc, &c);
        let sessions: Vec<_> = for_c[&intro].iter().map(|p| p.session_id.as_str()).collect();
        assert_eq!(sessions, vec!["a", "b"]);

        let for_a = hub.others_by_block(&doc, &a);
        assert_eq!(for_a[&intro].len(), 1);
        assert_eq!(for_a[&intro][0].session_id, b);

        assert!(hub.blur_block(&doc, &b));
        assert!(!hub.others_by_block(&doc, &a).contains_key(&intro));
    }

    #[test]
    fn updates_for_unknown_sessions_are_ignored() {
        let hub = PresenceHub::new(TTL);
        let doc = DocId::from("doc");
        assert!(!hub.focus_block(&doc, &SessionId::from("ghost"), &BlockId::from("x")));
        assert!(!hub.move_cursor(&doc, &SessionId::from("ghost"), None));
        assert_eq!(hub.active_documents(), 0);
    }

    #[test]
    fn sessions_cannot_overwrite_each_other() {
        let hub = PresenceHub::new(TTL);
        let doc = DocId::from("doc");
        let session = SessionId::from("s1");
        hub.join(&doc, &session, user("ana")).unwrap();

        let err = hub
            .publish(&doc, &session, Presence::joined(user("ben")))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
        assert!(hub.leave(&doc, &session, &UserId::from("ben")).is_err());
        assert_eq!(hub.snapshot(&doc)[&session].user.name, "ANA");
    }

    #[test]
    fn last_leave_drops_the_room() {
        let hub = PresenceHub::new(TTL);
        let doc = DocId::from("doc");
        let (a, b) = (SessionId::from("a"), SessionId::from("b"));
        hub.join(&doc, &a, user("ana")).unwrap();
        hub.join(&doc, &b, user("ben")).unwrap();

        assert!(hub.leave(&doc, &a, &UserId::from("ana")).unwrap());
        assert_eq!(hub.active_documents(), 1);
        assert!(hub.leave(&doc, &b, &UserId::from("ben")).unwrap());
        assert_eq!(hub.active_documents(), 0);
        assert!(!hub.leave(&doc, &b, &UserId::from("ben")).unwrap());
    }

    #[test]
    fn join_racing_the_last_leave_keeps_the_joined_session() {
        let hub = PresenceHub::new(TTL);
        let doc = DocId::from("doc");
        let (a, b) = (SessionId::from("a"), SessionId::from("b"));

        for _ in 0..2_000 {
            hub.join(&doc, &a, user("ana")).unwrap();

            let leaver = {
                let (hub, doc, a) = (hub.clone(), doc.clone(), a.clone());
                thread::spawn(move || hub.leave(&doc, &a, &UserId::from("ana")).unwrap())
            };
            let joiner = {
                let (hub, doc, b) = (hub.clone(), doc.clone(), b.clone());
                thread::spawn(move || hub.join(&doc, &b, user("ben")).unwrap())
            };
            assert!(leaver.join().unwrap());
            joiner.join().unwrap();

            assert!(hub.snapshot(&doc).contains_key(&b));
            assert!(hub.focus_block(&doc, &b, &BlockId::from("intro")));
            assert!(hub.leave(&doc, &b, &UserId::from("ben")).unwrap());
            assert_eq!(hub.active_documents(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sessions_expire_after_ttl() {
        let hub = PresenceHub::new(Duration::from_secs(30));
        let doc = DocId::from("doc");
        let (a, b) = (SessionId::from("a"), SessionId::from("b"));
        let intro = BlockId::from("intro");
        hub.join(&doc, &a, user("ana")).unwrap();
        hub.join(&doc, &b, user("ben")).unwrap();
        assert!(hub.focus_block(&doc, &a, &intro));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(hub.move_cursor(&doc, &b, Some(Cursor { x: 1.0, y: 2.0 })));
        assert_eq!(hub.others_by_block(&doc, &b)[&intro].len(), 1);

        tokio::time::advance(Duration::from_secs(15)).await;
        let snapshot = hub.snapshot(&doc);
        assert!(!snapshot.contains_key(&a));
        assert!(snapshot.contains_key(&b));
        assert!(hub.others_by_block(&doc, &b).is_empty());
        assert!(!hub.focus_block(&doc, &a, &intro));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(hub.prune_expired(), 1);
        assert_eq!(hub.active_documents(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_id_can_be_claimed_again() {
        let hub = PresenceHub::new(Duration::from_secs(30));
        let doc = DocId::from("doc");
        let session = SessionId::from("s1");
        hub.join(&doc, &session, user("ana")).unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        hub.publish(&doc, &session, Presence::joined(user("ben")))
            .unwrap();
        assert_eq!(hub.snapshot(&doc)[&session].user.name, "BEN");
    }
}
