use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use lessonroom_core::{
    identity::{IdentityProviderRef, UserProfile},
    ids::UserId,
};
use tracing::debug;

use crate::{
    AppError, observability::record_authenticated_identity, state::AppState,
    utils::users::is_valid_email,
};

/// Identity adapter: every lookup the other services need from the identity
/// service goes through here.
pub struct UserService {
    identity: IdentityProviderRef,
}

impl UserService {
    pub fn new(identity: IdentityProviderRef) -> Self {
        Self { identity }
    }

    pub async fn fetch_by_email(&self, email: &str) -> Result<UserProfile, AppError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(AppError::bad_request("a valid email address is required"));
        }

        self.identity
            .resolve_user_by_email(email)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::user_not_found(email))
    }

    pub async fn fetch_users(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>, AppError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let profiles = self
            .identity
            .resolve_users_by_ids(user_ids)
            .await
            .map_err(AppError::from_anyhow)?;

        for id in user_ids {
            if !profiles.iter().any(|profile| &profile.id == id) {
                debug!(user_id = %id, "identity service did not resolve collaborator");
            }
        }

        Ok(profiles)
    }

    pub async fn authenticate_rest_request(
        &self,
        headers: &HeaderMap,
    ) -> Result<UserProfile, AppError> {
        let Some(token) = extract_bearer_token(headers) else {
            return Err(AppError::unauthorized("authentication required"));
        };

        self.identity
            .resolve_session(token)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::unauthorized("session expired"))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

impl FromRef<AppState> for Arc<UserService> {
    fn from_ref(state: &AppState) -> Arc<UserService> {
        Arc::clone(&state.user_service)
    }
}

/// The calling user, resolved from the bearer session token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserProfile);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<UserService>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let service = Arc::<UserService>::from_ref(state);
        let user = service.authenticate_rest_request(&parts.headers).await?;
        record_authenticated_identity(user.id.as_str());
        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use lessonroom_core::memory::InMemoryDirectory;

    fn service_with_user() -> UserService {
        let directory = InMemoryDirectory::new();
        directory.insert(UserProfile::new("u1", "Ada", "ada@x.com", ""));
        directory.issue_session("tok", &UserId::from("u1"));
        UserService::new(Arc::new(directory))
    }

    #[tokio::test]
    async fn unknown_email_is_user_not_found() {
        let service = service_with_user();
        let err = service.fetch_by_email("ghost@x.com").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UserNotFound);

        let err = service.fetch_by_email("not-an-email").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::BadRequest);

        let found = service.fetch_by_email(" Ada@X.com ").await.unwrap();
        assert_eq!(found.id.as_str(), "u1");
    }

    #[tokio::test]
    async fn bearer_token_resolves_current_user() {
        let service = service_with_user();
        let mut headers = HeaderMap::new();
        assert_eq!(
            service
                .authenticate_rest_request(&headers)
                .await
                .unwrap_err()
                .kind(),
            crate::ErrorKind::Unauthorized
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        let user = service.authenticate_rest_request(&headers).await.unwrap();
        assert_eq!(user.name, "Ada");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        assert!(service.authenticate_rest_request(&headers).await.is_err());
    }
}
