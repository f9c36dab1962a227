use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    access::{AccessLevel, AccessPatch, CapabilitySet, UserAccesses},
    ids::{DocId, UserId},
};

pub const DEFAULT_DOCUMENT_TITLE: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub creator_id: UserId,
    pub email: String,
    pub title: String,
}

/// A room record as held by the external room store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: DocId,
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub users_accesses: UserAccesses,
    #[serde(default)]
    pub default_accesses: CapabilitySet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connection_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn creator_id(&self) -> &UserId {
        &self.metadata.creator_id
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn access_level(&self, user_id: &UserId) -> AccessLevel {
        AccessLevel::derive(&self.metadata.creator_id, &self.users_accesses, user_id)
    }

    pub fn is_creator(&self, user_id: &UserId) -> bool {
        &self.metadata.creator_id == user_id
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub id: DocId,
    pub metadata: DocumentMetadata,
    pub users_accesses: UserAccesses,
    pub default_accesses: CapabilitySet,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Partial room update. Only the fields that are set are written.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataPatch>,
    #[serde(skip_serializing_if = "AccessPatch::is_empty")]
    pub users_accesses: AccessPatch,
}

impl RoomUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            metadata: Some(MetadataPatch {
                title: Some(title.into()),
            }),
            ..Self::default()
        }
    }

    pub fn grant(user_id: UserId, capabilities: CapabilitySet) -> Self {
        let mut users_accesses = AccessPatch::new();
        users_accesses.insert(user_id, Some(capabilities));
        Self {
            metadata: None,
            users_accesses,
        }
    }

    pub fn revoke(user_id: UserId) -> Self {
        let mut users_accesses = AccessPatch::new();
        users_accesses.insert(user_id, None);
        Self {
            metadata: None,
            users_accesses,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
    pub user_id: Option<UserId>,
}

/// The external room store, as seen by the access service.
#[async_trait]
pub trait DocumentAccessRepository: Send + Sync {
    async fn create_room(&self, room: NewRoom) -> Result<DocumentRecord>;
    async fn get_room(&self, room_id: &DocId) -> Result<Option<DocumentRecord>>;
    /// Returns `None` when the room does not exist.
    async fn update_room(
        &self,
        room_id: &DocId,
        update: RoomUpdate,
    ) -> Result<Option<DocumentRecord>>;
    /// Returns `false` when the room did not exist.
    async fn delete_room(&self, room_id: &DocId) -> Result<bool>;
    async fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<DocumentRecord>>;
}

pub type DocumentAccessRepositoryRef = Arc<dyn DocumentAccessRepository>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: DocId,
    pub title: String,
    pub access: AccessLevel,
    pub creator_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection_at: Option<DateTime<Utc>>,
}

impl DocumentSummary {
    pub fn for_user(record: &DocumentRecord, user_id: &UserId) -> Self {
        Self {
            id: record.id.clone(),
            title: record.metadata.title.clone(),
            access: record.access_level(user_id),
            creator_id: record.metadata.creator_id.clone(),
            created_at: record.created_at,
            last_connection_at: record.last_connection_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn room_record_decodes_store_payload() {
        let record: DocumentRecord = serde_json::from_value(json!({
            "id": "room-1",
            "metadata": { "creatorId": "u1", "email": "a@x.com", "title": "Fractions" },
            "usersAccesses": { "u1": ["room:write"], "u2": ["room:read"] },
            "defaultAccesses": [],
            "createdAt": "2026-01-02T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(record.title(), "Fractions");
        assert!(record.access_level(&UserId::from("u1")).is_owner());
        assert_eq!(record.access_level(&UserId::from("u2")).label(), "viewer");
        assert!(record.created_at.is_some());
    }

    #[test]
    fn revoke_update_serializes_null_entry() {
        let update = RoomUpdate::revoke(UserId::from("u2"));
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({ "usersAccesses": { "u2": null } })
        );

        let rename = RoomUpdate::title("Algebra");
        assert_eq!(
            serde_json::to_value(&rename).unwrap(),
            json!({ "metadata": { "title": "Algebra" } })
        );
    }
}
