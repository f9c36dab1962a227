use std::sync::Arc;

use axum::extract::FromRef;
use lessonroom_core::{
    access::{AccessLevel, CapabilitySet, GrantLevel, UserAccesses},
    document::{
        DocumentAccessRepositoryRef, DocumentMetadata, DocumentRecord, DocumentSummary, NewRoom,
        RoomFilter, RoomUpdate,
    },
    identity::UserProfile,
    ids::{DocId, UserId},
    policy::{AccessAction, AccessRequest, Decision, decide},
};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    AppError,
    notification::{DispatchOutcome, NotificationDispatcher, dispatcher::AccessChange},
    state::AppState,
    user::service::UserService,
};

/// A document as loaded for one user, with that user's level resolved once.
#[derive(Debug, Clone)]
pub struct OpenedDocument {
    pub record: DocumentRecord,
    pub access: AccessLevel,
}

impl OpenedDocument {
    pub fn ensure_can_edit(&self) -> Result<(), AppError> {
        if self.access.can_edit() {
            Ok(())
        } else {
            Err(AppError::forbidden("Viewers cannot edit this document."))
        }
    }
}

/// Outcome of a committed share/remove. The notification outcome is reported
/// alongside and never fails the mutation.
#[derive(Debug, Clone)]
pub struct AccessMutation {
    pub document: DocumentRecord,
    pub target: UserProfile,
    pub previous: AccessLevel,
    pub notification: DispatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    #[serde(flatten)]
    pub user: UserProfile,
    pub access: AccessLevel,
}

pub struct DocAccessService {
    rooms: DocumentAccessRepositoryRef,
    users: Arc<UserService>,
    notifications: Arc<NotificationDispatcher>,
    default_title: String,
}

impl DocAccessService {
    pub fn new(
        rooms: DocumentAccessRepositoryRef,
        users: Arc<UserService>,
        notifications: Arc<NotificationDispatcher>,
        default_title: impl Into<String>,
    ) -> Self {
        Self {
            rooms,
            users,
            notifications,
            default_title: default_title.into(),
        }
    }

    pub async fn create(
        &self,
        owner_id: &UserId,
        owner_email: &str,
    ) -> Result<DocumentRecord, AppError> {
        let mut users_accesses = UserAccesses::new();
        users_accesses.insert(owner_id.clone(), GrantLevel::Editor.capabilities());

        let room = NewRoom {
            id: DocId::generate(),
            metadata: DocumentMetadata {
                creator_id: owner_id.clone(),
                email: owner_email.to_owned(),
                title: self.default_title.clone(),
            },
            users_accesses,
            default_accesses: CapabilitySet::empty(),
        };

        let record = self
            .rooms
            .create_room(room)
            .await
            .map_err(AppError::creation_failed)?;
        info!(doc_id = %record.id, owner_id = %owner_id, "document created");
        Ok(record)
    }

    pub async fn fetch(&self, doc_id: &DocId) -> Result<DocumentRecord, AppError> {
        self.rooms
            .get_room(doc_id)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::doc_not_found(doc_id))
    }

    /// Loads the document and resolves the caller's level. Callers without an
    /// entry who are not the creator get `AccessDenied`.
    pub async fn open(
        &self,
        doc_id: &DocId,
        requesting_user_id: &UserId,
    ) -> Result<OpenedDocument, AppError> {
        let record = self.fetch(doc_id).await?;
        let access = record.access_level(requesting_user_id);
        if !access.can_open() {
            debug!(doc_id = %doc_id, user_id = %requesting_user_id, "document open denied");
            return Err(AppError::doc_access_denied(doc_id));
        }
        Ok(OpenedDocument { record, access })
    }

    /// Only touches `metadata.title`. Whether the caller may rename is decided
    /// by the calling context.
    pub async fn rename(
        &self,
        doc_id: &DocId,
        new_title: &str,
    ) -> Result<DocumentRecord, AppError> {
        self.rooms
            .update_room(doc_id, RoomUpdate::title(new_title))
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::doc_not_found(doc_id))
    }

    pub async fn share(
        &self,
        doc_id: &DocId,
        target_email: &str,
        new_level: GrantLevel,
        actor: &UserProfile,
    ) -> Result<AccessMutation, AppError> {
        let record = self.fetch(doc_id).await?;
        let target = self.users.fetch_by_email(target_email).await?;
        let actor_level = record.access_level(&actor.id);
        let previous = record.access_level(&target.id);

        self.authorize(AccessAction::Share, &record, actor, &actor_level, &target.id)?;

        // The creator stays owner whatever their entry says, so the grant
        // would change nothing they can see.
        if record.is_creator(&target.id) {
            debug!(
                doc_id = %doc_id,
                actor_id = %actor.id,
                target_id = %target.id,
                "share to document creator left unchanged"
            );
            return Ok(AccessMutation {
                document: record,
                target,
                previous,
                notification: DispatchOutcome::Skipped,
            });
        }

        let document = self
            .rooms
            .update_room(
                doc_id,
                RoomUpdate::grant(target.id.clone(), new_level.capabilities()),
            )
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::doc_not_found(doc_id))?;
        info!(
            doc_id = %doc_id,
            actor_id = %actor.id,
            target_id = %target.id,
            level = %new_level,
            "document shared"
        );

        let notification = self
            .notifications
            .notify_access_change(
                &target.id,
                doc_id,
                AccessChange {
                    actor,
                    document_title: document.title(),
                    granted: Some(new_level),
                    previous: &previous,
                    is_removal: false,
                },
            )
            .await;

        Ok(AccessMutation {
            document,
            target,
            previous,
            notification,
        })
    }

    pub async fn remove(
        &self,
        doc_id: &DocId,
        target_email: &str,
        actor: &UserProfile,
    ) -> Result<AccessMutation, AppError> {
        let record = self.fetch(doc_id).await?;
        let target = self.users.fetch_by_email(target_email).await?;
        let actor_level = record.access_level(&actor.id);
        let previous = record.access_level(&target.id);

        self.authorize(AccessAction::Remove, &record, actor, &actor_level, &target.id)?;

        let document = self
            .rooms
            .update_room(doc_id, RoomUpdate::revoke(target.id.clone()))
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::doc_not_found(doc_id))?;
        info!(
            doc_id = %doc_id,
            actor_id = %actor.id,
            target_id = %target.id,
            "collaborator removed"
        );

        let notification = self
            .notifications
            .notify_access_change(
                &target.id,
                doc_id,
                AccessChange {
                    actor,
                    document_title: document.title(),
                    granted: None,
                    previous: &previous,
                    is_removal: true,
                },
            )
            .await;

        Ok(AccessMutation {
            document,
            target,
            previous,
            notification,
        })
    }

    /// Creator only. A second delete of the same id yields `NotFound`.
    pub async fn delete(&self, doc_id: &DocId, requesting_user_id: &UserId) -> Result<(), AppError> {
        let record = self.fetch(doc_id).await?;
        if !record.is_creator(requesting_user_id) {
            return Err(AppError::forbidden(
                "Only the document owner can delete this document.",
            ));
        }

        let deleted = self
            .rooms
            .delete_room(doc_id)
            .await
            .map_err(AppError::from_anyhow)?;
        if !deleted {
            return Err(AppError::doc_not_found(doc_id));
        }

        info!(doc_id = %doc_id, user_id = %requesting_user_id, "document deleted");
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<DocumentSummary>, AppError> {
        let filter = RoomFilter {
            user_id: Some(user_id.clone()),
        };
        let records = self
            .rooms
            .list_rooms(&filter)
            .await
            .map_err(AppError::from_anyhow)?;

        let mut summaries: Vec<DocumentSummary> = records
            .iter()
            .map(|record| DocumentSummary::for_user(record, user_id))
            .filter(|summary| summary.access.can_open())
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// Creator first, then everyone with explicit access by name.
    pub async fn collaborators(
        &self,
        doc_id: &DocId,
        actor_id: &UserId,
    ) -> Result<Vec<Collaborator>, AppError> {
        let opened = self.open(doc_id, actor_id).await?;
        let record = &opened.record;

        let mut ids = vec![record.creator_id().clone()];
        ids.extend(
            record
                .users_accesses
                .iter()
                .filter(|(id, caps)| !caps.is_empty() && *id != record.creator_id())
                .map(|(id, _)| id.clone()),
        );

        let profiles = self.users.fetch_users(&ids).await?;
        let mut collaborators: Vec<Collaborator> = profiles
            .into_iter()
            .map(|user| Collaborator {
                access: record.access_level(&user.id),
                user,
            })
            .collect();
        collaborators.sort_by(|a, b| {
            b.access
                .is_owner()
                .cmp(&a.access.is_owner())
                .then_with(|| a.user.name.to_lowercase().cmp(&b.user.name.to_lowercase()))
        });
        Ok(collaborators)
    }

    fn authorize(
        &self,
        action: AccessAction,
        record: &DocumentRecord,
        actor: &UserProfile,
        actor_level: &AccessLevel,
        target_id: &UserId,
    ) -> Result<(), AppError> {
        let decision = decide(&AccessRequest {
            action,
            actor_id: &actor.id,
            actor_level,
            target_id,
            creator_id: record.creator_id(),
        });

        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                debug!(
                    doc_id = %record.id,
                    actor_id = %actor.id,
                    target_id = %target_id,
                    ?action,
                    reason = reason.code(),
                    "access mutation denied"
                );
                Err(AppError::access_denied(reason))
            }
        }
    }
}

impl FromRef<AppState> for Arc<DocAccessService> {
    fn from_ref(state: &AppState) -> Arc<DocAccessService> {
        Arc::clone(&state.doc_access_service)
    }
}
