use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;
use lessonroom_core::{
    access::{AccessLevel, GrantLevel},
    config::NotificationConfig,
    identity::UserProfile,
    ids::{DocId, NotificationId, UserId},
    notification::{
        ActivityData, NotificationCenterRef, NotificationKind, NotificationTrigger,
        NotificationView, render,
    },
};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{AppError, state::AppState};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&NotificationConfig::default())
    }
}

/// Result of a best-effort submission. Never turned into an error for the
/// mutation that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DispatchOutcome {
    #[serde(rename_all = "camelCase")]
    Delivered {
        notification_id: NotificationId,
        attempts: u32,
    },
    /// The recipient is the actor, or the change leaves their level as it was.
    Skipped,
    #[serde(rename_all = "camelCase")]
    Failed {
        notification_id: NotificationId,
        attempts: u32,
        error: String,
    },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    /// Non-fatal warning to show next to a successful mutation.
    pub fn warning(&self) -> Option<String> {
        match self {
            DispatchOutcome::Failed { .. } => Some(
                "The change was saved, but the collaborator could not be notified.".to_owned(),
            ),
            _ => None,
        }
    }
}

/// Describes one access mutation for the recipient's inbox.
pub struct AccessChange<'a> {
    pub actor: &'a UserProfile,
    pub document_title: &'a str,
    pub granted: Option<GrantLevel>,
    pub previous: &'a AccessLevel,
    pub is_removal: bool,
}

impl AccessChange<'_> {
    pub fn activity_data(&self) -> ActivityData {
        ActivityData {
            user_name: Some(self.actor.name.clone()),
            user_avatar: Some(self.actor.avatar.clone()),
            user_email: Some(self.actor.email.clone()),
            user_type: self.granted.map(|level| level.as_str().to_owned()),
            previous_user_type: self
                .previous
                .can_open()
                .then(|| self.previous.label().to_owned()),
            is_removal: self.is_removal,
            document_title: Some(self.document_title.to_owned()),
            ..ActivityData::default()
        }
    }
}

pub struct NotificationDispatcher {
    center: NotificationCenterRef,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(center: NotificationCenterRef, retry: RetryPolicy) -> Self {
        Self { center, retry }
    }

    pub async fn notify_access_change(
        &self,
        recipient_id: &UserId,
        room_id: &DocId,
        change: AccessChange<'_>,
    ) -> DispatchOutcome {
        if recipient_id == &change.actor.id {
            return DispatchOutcome::Skipped;
        }

        let trigger = NotificationTrigger::new(
            NotificationKind::DocumentAccess,
            recipient_id.clone(),
            room_id.clone(),
            change.activity_data(),
        );
        self.submit(trigger).await
    }

    pub async fn notify_comment(
        &self,
        recipient_id: &UserId,
        actor_id: &UserId,
        room_id: &DocId,
        activity_data: ActivityData,
    ) -> DispatchOutcome {
        if recipient_id == actor_id {
            return DispatchOutcome::Skipped;
        }

        let trigger = NotificationTrigger::new(
            NotificationKind::DocumentComment,
            recipient_id.clone(),
            room_id.clone(),
            activity_data,
        );
        self.submit(trigger).await
    }

    /// Submits with retries. Every attempt reuses the same notification id so
    /// the service can drop duplicates.
    pub async fn submit(&self, trigger: NotificationTrigger) -> DispatchOutcome {
        let notification_id = trigger.id.clone();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.center.trigger(trigger.clone()).await {
                Ok(()) => {
                    info!(
                        notification_id = %notification_id,
                        recipient_id = %trigger.user_id,
                        kind = %trigger.kind,
                        attempts = attempt,
                        "inbox notification submitted"
                    );
                    return DispatchOutcome::Delivered {
                        notification_id,
                        attempts: attempt,
                    };
                }
                Err(error) if attempt < self.retry.max_attempts => {
                    debug!(
                        notification_id = %notification_id,
                        attempt,
                        ?error,
                        "inbox notification failed, retrying"
                    );
                    sleep(self.retry.backoff * attempt).await;
                }
                Err(error) => {
                    warn!(
                        notification_id = %notification_id,
                        recipient_id = %trigger.user_id,
                        attempts = attempt,
                        ?error,
                        "inbox notification dropped"
                    );
                    return DispatchOutcome::Failed {
                        notification_id,
                        attempts: attempt,
                        error: error.to_string(),
                    };
                }
            }
        }
    }

    pub async fn list_for_user(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationView>, AppError> {
        let records = self
            .center
            .list_for_user(user_id, unread_only)
            .await
            .map_err(AppError::from_anyhow)?;
        Ok(records.iter().map(render).collect())
    }

    pub async fn count_unread(&self, user_id: &UserId) -> Result<usize, AppError> {
        Ok(self
            .center
            .list_for_user(user_id, true)
            .await
            .map_err(AppError::from_anyhow)?
            .len())
    }

    /// Idempotent: marking an already-read notification keeps its `readAt`.
    pub async fn mark_read(
        &self,
        user_id: &UserId,
        notification_id: &NotificationId,
    ) -> Result<NotificationView, AppError> {
        self.center
            .mark_read(user_id, notification_id)
            .await
            .map_err(AppError::from_anyhow)?
            .map(|record| render(&record))
            .ok_or_else(|| AppError::notification_not_found(notification_id))
    }

    pub async fn mark_all_read(&self, user_id: &UserId) -> Result<u64, AppError> {
        self.center
            .mark_all_read(user_id)
            .await
            .map_err(AppError::from_anyhow)
    }
}

impl FromRef<AppState> for Arc<NotificationDispatcher> {
    fn from_ref(state: &AppState) -> Arc<NotificationDispatcher> {
        Arc::clone(&state.notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessonroom_core::{access::Capability, access::CapabilitySet, memory::InMemoryRoomService};

    fn dispatcher(store: Arc<InMemoryRoomService>, max_attempts: u32) -> NotificationDispatcher {
        NotificationDispatcher::new(
            store,
            RetryPolicy {
                max_attempts,
                backoff: Duration::from_millis(1),
            },
        )
    }

    fn actor() -> UserProfile {
        UserProfile::new("owner", "Olga", "olga@x.com", "https://img/olga.png")
    }

    #[tokio::test]
    async fn retries_reuse_the_same_notification_id() {
        let store = Arc::new(InMemoryRoomService::new());
        store.fail_next_triggers(2);
        let dispatcher = dispatcher(store.clone(), 3);
        let actor = actor();

        let outcome = dispatcher
            .notify_access_change(
                &UserId::from("guest"),
                &DocId::from("room"),
                AccessChange {
                    actor: &actor,
                    document_title: "Fractions",
                    granted: Some(GrantLevel::Viewer),
                    previous: &AccessLevel::None,
                    is_removal: false,
                },
            )
            .await;

        assert!(matches!(outcome, DispatchOutcome::Delivered { attempts: 3, .. }));
        assert_eq!(store.trigger_attempts(), 3);
        let stored = store.notifications();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].activity_data.user_type.as_deref(), Some("viewer"));
        assert_eq!(stored[0].activity_data.previous_user_type, None);
    }

    #[tokio::test]
    async fn exhausted_retries_report_failure_with_warning() {
        let store = Arc::new(InMemoryRoomService::new());
        store.fail_next_triggers(u32::MAX);
        let dispatcher = dispatcher(store.clone(), 2);
        let actor = actor();
        let previous = AccessLevel::Editor(CapabilitySet::new([Capability::Write]));

        let outcome = dispatcher
            .notify_access_change(
                &UserId::from("guest"),
                &DocId::from("room"),
                AccessChange {
                    actor: &actor,
                    document_title: "Fractions",
                    granted: None,
                    previous: &previous,
                    is_removal: true,
                },
            )
            .await;

        assert!(matches!(outcome, DispatchOutcome::Failed { attempts: 2, .. }));
        assert!(outcome.warning().is_some());
        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn actor_is_never_notified_about_their_own_action() {
        let store = Arc::new(InMemoryRoomService::new());
        let dispatcher = dispatcher(store.clone(), 1);
        let actor = actor();

        let outcome = dispatcher
            .notify_comment(&actor.id, &actor.id, &DocId::from("room"), ActivityData::default())
            .await;

        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert_eq!(store.trigger_attempts(), 0);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_missing_ids_are_not_found() {
        let store = Arc::new(InMemoryRoomService::new());
        let dispatcher = dispatcher(store.clone(), 1);
        let recipient = UserId::from("guest");
        let trigger = NotificationTrigger::new(
            NotificationKind::DocumentShared,
            recipient.clone(),
            DocId::from("room"),
            ActivityData::default(),
        );
        let id = trigger.id.clone();
        assert!(dispatcher.submit(trigger).await.is_delivered());
        assert_eq!(dispatcher.count_unread(&recipient).await.unwrap(), 1);

        let first = dispatcher.mark_read(&recipient, &id).await.unwrap();
        let second = dispatcher.mark_read(&recipient, &id).await.unwrap();
        assert!(!first.unread);
        assert_eq!(first.read_at, second.read_at);
        assert_eq!(dispatcher.count_unread(&recipient).await.unwrap(), 0);

        let err = dispatcher
            .mark_read(&UserId::from("someone-else"), &id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }
}
