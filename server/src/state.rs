use std::sync::Arc;

use anyhow::{Result as AnyResult, bail};
use serde::Serialize;
use tracing::{info, warn};

use lessonroom_core::{
    comment::CommentStoreRef,
    config::AppConfig,
    document::DocumentAccessRepositoryRef,
    identity::IdentityProviderRef,
    memory::{InMemoryDirectory, InMemoryRoomService},
    notification::NotificationCenterRef,
};

use crate::{
    comment::CommentThreadGateway,
    doc::service::DocAccessService,
    notification::{NotificationDispatcher, RetryPolicy},
    presence::PresenceHub,
    remote::{IdentityServiceClient, RoomServiceClient, build_http_client},
    user::service::UserService,
};

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub doc_access_service: Arc<DocAccessService>,
    pub comment_gateway: Arc<CommentThreadGateway>,
    pub notifications: Arc<NotificationDispatcher>,
    pub presence_hub: PresenceHub,
    pub metadata: ServerMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Ephemeral,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub backend: BackendKind,
}

/// The external collaborators every service is built on.
#[derive(Clone)]
pub struct Backends {
    pub kind: BackendKind,
    pub rooms: DocumentAccessRepositoryRef,
    pub comments: CommentStoreRef,
    pub notifications: NotificationCenterRef,
    pub identity: IdentityProviderRef,
}

impl Backends {
    /// HTTP adapters for the configured room and identity services.
    pub fn remote(config: &AppConfig) -> AnyResult<Self> {
        if config.room_service.secret_key.is_empty() {
            bail!("room service secret key is not configured");
        }
        if config.identity.secret_key.is_empty() {
            bail!("identity service secret key is not configured");
        }

        let client = build_http_client(config.http.timeout())?;
        let rooms = Arc::new(RoomServiceClient::new(
            client.clone(),
            &config.room_service.base_url,
            &config.room_service.secret_key,
        )?);
        let identity = Arc::new(IdentityServiceClient::new(
            client,
            &config.identity.base_url,
            &config.identity.secret_key,
        )?);

        info!(
            room_service = %config.room_service.base_url,
            identity_service = %config.identity.base_url,
            "using remote collaboration backends"
        );
        Ok(Self {
            kind: BackendKind::Remote,
            rooms: rooms.clone(),
            comments: rooms.clone(),
            notifications: rooms,
            identity,
        })
    }

    pub fn in_memory(rooms: Arc<InMemoryRoomService>, directory: Arc<InMemoryDirectory>) -> Self {
        warn!("using in-memory backends; nothing is persisted");
        Self {
            kind: BackendKind::Ephemeral,
            rooms: rooms.clone(),
            comments: rooms.clone(),
            notifications: rooms,
            identity: directory,
        }
    }
}

pub fn build_state(backends: Backends, config: &AppConfig) -> AppState {
    let user_service = Arc::new(UserService::new(backends.identity));
    let notifications = Arc::new(NotificationDispatcher::new(
        backends.notifications,
        RetryPolicy::from_config(&config.notifications),
    ));
    let doc_access_service = Arc::new(DocAccessService::new(
        backends.rooms,
        user_service.clone(),
        notifications.clone(),
        config.documents.default_title.clone(),
    ));
    let comment_gateway = Arc::new(CommentThreadGateway::new(
        backends.comments,
        notifications.clone(),
    ));

    AppState {
        user_service,
        doc_access_service,
        comment_gateway,
        notifications,
        presence_hub: PresenceHub::new(config.presence.ttl()),
        metadata: ServerMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: backends.kind,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_backends_require_secrets() {
        let config = AppConfig::default();
        let err = Backends::remote(&config).err().unwrap();
        assert!(err.to_string().contains("room service secret key"));

        let mut config = AppConfig::default();
        config.room_service.secret_key = "sk_room".into();
        config.identity.secret_key = "sk_identity".into();
        let backends = Backends::remote(&config).unwrap();
        assert_eq!(backends.kind, BackendKind::Remote);
    }

    #[test]
    fn ephemeral_state_reports_backend_kind() {
        let backends = Backends::in_memory(
            Arc::new(InMemoryRoomService::new()),
            Arc::new(InMemoryDirectory::new()),
        );
        let state = build_state(backends, &AppConfig::default());
        assert_eq!(state.metadata.backend, BackendKind::Ephemeral);
        assert_eq!(state.presence_hub.active_documents(), 0);
    }
}
