use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

const USER_COLORS: [&str; 10] = [
    "#DC2626", "#D97706", "#059669", "#7C3AED", "#DB2777", "#2563EB", "#0891B2", "#65A30D",
    "#EA580C", "#4F46E5",
];

/// Stable badge colour for a collaborator; every session derives the same one.
pub fn user_color(user_id: &str) -> &'static str {
    let sum: u64 = user_id.chars().map(|ch| ch as u64).sum();
    USER_COLORS[(sum % USER_COLORS.len() as u64) as usize]
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Identity service projection of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub color: String,
}

impl UserProfile {
    pub fn new(
        id: impl Into<UserId>,
        name: impl Into<String>,
        email: impl Into<String>,
        avatar: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let color = user_color(id.as_str()).to_owned();
        Self {
            id,
            name: name.into(),
            email: email.into(),
            avatar: avatar.into(),
            color,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_user_by_email(&self, email: &str) -> Result<Option<UserProfile>>;
    async fn resolve_user_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>>;
    /// Unknown ids are left out of the result.
    async fn resolve_users_by_ids(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>>;
    /// Current user behind a session token issued by the identity service.
    async fn resolve_session(&self, token: &str) -> Result<Option<UserProfile>>;
}

pub type IdentityProviderRef = Arc<dyn IdentityProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_deterministic_per_id() {
        assert_eq!(user_color("user_abc"), user_color("user_abc"));
        let profile = UserProfile::new("user_abc", "Ada", "ada@x.com", "");
        assert_eq!(profile.color, user_color("user_abc"));
        assert!(USER_COLORS.contains(&user_color("")));
    }

    #[test]
    fn emails_are_compared_case_insensitively() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
