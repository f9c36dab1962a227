//! Inbox notifications: records, the external notification center, and
//! display rendering.

use std::{fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{
    document::DEFAULT_DOCUMENT_TITLE,
    ids::{DocId, NotificationId, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    DocumentAccess,
    DocumentShared,
    DocumentComment,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::DocumentAccess => "documentAccess",
            NotificationKind::DocumentShared => "documentShared",
            NotificationKind::DocumentComment => "documentComment",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form activity payload. Known keys are typed; anything else the
/// service sends back is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// Access level granted to the recipient (`editor` / `viewer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_user_type: Option<String>,
    #[serde(default)]
    pub is_removal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
    /// Custom message; wins over the synthesized title when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloq_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// One submission to the external notification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTrigger {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub user_id: UserId,
    pub room_id: DocId,
    /// Grouping key on the external service; we use the notification id.
    pub subject_id: String,
    pub activity_data: ActivityData,
}

impl NotificationTrigger {
    pub fn new(
        kind: NotificationKind,
        user_id: UserId,
        room_id: DocId,
        activity_data: ActivityData,
    ) -> Self {
        let id = NotificationId::generate();
        Self {
            subject_id: id.as_str().to_owned(),
            id,
            kind,
            user_id,
            room_id,
            activity_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub user_id: UserId,
    pub room_id: DocId,
    #[serde(default)]
    pub activity_data: ActivityData,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn from_trigger(trigger: NotificationTrigger, created_at: DateTime<Utc>) -> Self {
        Self {
            id: trigger.id,
            kind: trigger.kind,
            user_id: trigger.user_id,
            room_id: trigger.room_id,
            activity_data: trigger.activity_data,
            read_at: None,
            created_at,
        }
    }

    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    /// One-way transition; an already-read notification keeps its timestamp.
    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        if self.read_at.is_none() {
            self.read_at = Some(now);
        }
    }
}

#[async_trait]
pub trait NotificationCenter: Send + Sync {
    async fn trigger(&self, notification: NotificationTrigger) -> Result<()>;
    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>>;
    /// `None` if the notification does not exist for this user.
    async fn mark_read(
        &self,
        user_id: &UserId,
        notification_id: &NotificationId,
    ) -> Result<Option<NotificationRecord>>;
    async fn mark_all_read(&self, user_id: &UserId) -> Result<u64>;
}

pub type NotificationCenterRef = Arc<dyn NotificationCenter>;

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Human readable headline for an inbox entry.
pub fn derive_title(kind: NotificationKind, activity: &ActivityData) -> String {
    if let Some(custom) = non_empty(activity.title.as_ref()) {
        return custom.to_owned();
    }

    let actor = non_empty(activity.user_name.as_ref()).unwrap_or("Someone");
    let document = non_empty(activity.document_title.as_ref()).unwrap_or(DEFAULT_DOCUMENT_TITLE);

    match kind {
        NotificationKind::DocumentAccess => {
            if activity.is_removal {
                return format!("{actor} removed you from \"{document}\"");
            }
            let granted = non_empty(activity.user_type.as_ref());
            let previous = non_empty(activity.previous_user_type.as_ref());
            match (previous, granted) {
                (Some(previous), Some(granted)) if previous != granted => format!(
                    "{actor} changed your access to \"{document}\" from {previous} to {granted}"
                ),
                (_, Some(granted)) => {
                    format!("{actor} gave you {granted} access to \"{document}\"")
                }
                (_, None) => format!("{actor} updated your access to \"{document}\""),
            }
        }
        NotificationKind::DocumentShared => format!("{actor} shared \"{document}\" with you"),
        NotificationKind::DocumentComment => format!("{actor} commented on \"{document}\""),
    }
}

/// Where clicking the notification takes the user.
pub fn notification_target(notification: &NotificationRecord) -> String {
    let base = format!("/documents/{}", notification.room_id);
    match (
        notification.kind,
        non_empty(notification.activity_data.bloq_id.as_ref()),
    ) {
        (NotificationKind::DocumentComment, Some(bloq_id)) => format!("{base}#bloq-{bloq_id}"),
        _ => base,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub unread: bool,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

pub fn render(notification: &NotificationRecord) -> NotificationView {
    NotificationView {
        id: notification.id.clone(),
        kind: notification.kind,
        title: derive_title(notification.kind, &notification.activity_data),
        unread: notification.is_unread(),
        target: notification_target(notification),
        avatar: notification.activity_data.user_avatar.clone(),
        created_at: notification.created_at,
        read_at: notification.read_at,
    }
}
