//! Per-session presence and the "who is editing this block" projection.
//!
//! Presence is ephemeral broadcast state. Each session only ever writes its
//! own entry; the projection is recomputed from the latest snapshot with no
//! memory of earlier ones. Two sessions on the same block is a normal state,
//! not a conflict: there is no locking here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    identity::UserProfile,
    ids::{BlockId, SessionId, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
}

/// Badge data copied from the user profile when the session joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub id: UserId,
    pub name: String,
    pub color: String,
    pub avatar: String,
}

impl From<&UserProfile> for PresenceUser {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            color: profile.color.clone(),
            avatar: profile.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub cursor: Option<Cursor>,
    pub active_block_id: Option<BlockId>,
    pub user: PresenceUser,
}

impl Presence {
    pub fn joined(user: PresenceUser) -> Self {
        Self {
            cursor: None,
            active_block_id: None,
            user,
        }
    }
}

/// Latest presence of every session connected to one document.
pub type PresenceSnapshot = BTreeMap<SessionId, Presence>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPresence {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub presence: Presence,
}

/// Other sessions grouped by the block they are focused on.
pub type OthersByBlock = BTreeMap<BlockId, Vec<SessionPresence>>;

/// Groups every session except `own_session` by its active block. Sessions
/// without a focused block are left out. Within a block, sessions are ordered
/// by session id.
pub fn others_by_block(snapshot: &PresenceSnapshot, own_session: &SessionId) -> OthersByBlock {
    let mut grouped = OthersByBlock::new();
    for (session_id, presence) in snapshot {
        if session_id == own_session {
            continue;
        }
        let Some(block_id) = presence.active_block_id.as_ref() else {
            continue;
        };
        grouped
            .entry(block_id.clone())
            .or_default()
            .push(SessionPresence {
                session_id: session_id.clone(),
                presence: presence.clone(),
            });
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(user: &str, block: Option<&str>) -> Presence {
        Presence {
            cursor: None,
            active_block_id: block.map(BlockId::from),
            user: PresenceUser {
                id: UserId::from(user),
                name: user.to_owned(),
                color: "#000000".into(),
                avatar: String::new(),
            },
        }
    }

    fn snapshot(entries: &[(&str, Presence)]) -> PresenceSnapshot {
        entries
            .iter()
            .map(|(session, presence)| (SessionId::from(*session), presence.clone()))
            .collect()
    }

    #[test]
    fn groups_other_sessions_by_active_block() {
        let snap = snapshot(&[
            ("s1", presence("ada", Some("b1"))),
            ("s2", presence("bob", Some("b1"))),
            ("s3", presence("cy", Some("b2"))),
            ("s4", presence("di", None)),
        ]);

        let grouped = others_by_block(&snap, &SessionId::from("s1"));
        let b1: Vec<&str> = grouped[&BlockId::from("b1")]
            .iter()
            .map(|entry| entry.session_id.as_str())
            .collect();
        assert_eq!(b1, vec!["s2"]);
        assert_eq!(grouped[&BlockId::from("b2")].len(), 1);
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn same_block_from_many_sessions_is_not_exclusive() {
        let snap = snapshot(&[
            ("s1", presence("ada", Some("b1"))),
            ("s2", presence("ada", Some("b1"))),
            ("s3", presence("bob", Some("b1"))),
        ]);

        let seen_from_outside = others_by_block(&snap, &SessionId::from("observer"));
        assert_eq!(seen_from_outside[&BlockId::from("b1")].len(), 3);
        assert_eq!(
            others_by_block(&snap, &SessionId::from("s3"))[&BlockId::from("b1")].len(),
            2
        );
    }

    #[test]
    fn projection_only_depends_on_latest_snapshot() {
        let before = snapshot(&[("s2", presence("bob", Some("b1")))]);
        let after = snapshot(&[("s2", presence("bob", None))]);
        let own = SessionId::from("s1");

        assert_eq!(others_by_block(&before, &own).len(), 1);
        assert!(others_by_block(&after, &own).is_empty());
    }
}
