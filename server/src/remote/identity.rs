use anyhow::Result;
use async_trait::async_trait;
use lessonroom_core::{
    identity::{IdentityProvider, UserProfile, normalize_email},
    ids::UserId,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::RestClient;

/// Clerk-style identity service. Session tokens are session ids whose owning
/// user is looked up on every request.
#[derive(Clone)]
pub struct IdentityServiceClient {
    rest: RestClient,
}

impl IdentityServiceClient {
    pub fn new(client: Client, base_url: &str, secret_key: &str) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(client, "identity service", base_url, secret_key)?,
        })
    }

    async fn query_users(&self, key: &str, values: &[&str]) -> Result<Vec<WireUser>> {
        let mut url = self.rest.endpoint(&["users"]);
        {
            let mut query = url.query_pairs_mut();
            for value in values {
                query.append_pair(key, value);
            }
        }
        let users: Option<Vec<WireUser>> = self.rest.get_json(url).await?;
        Ok(users.unwrap_or_default())
    }
}

#[async_trait]
impl IdentityProvider for IdentityServiceClient {
    async fn resolve_user_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let email = normalize_email(email);
        let users = self.query_users("email_address", &[email.as_str()]).await?;
        Ok(find_by_email(users, &email))
    }

    async fn resolve_user_by_id(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        let url = self.rest.endpoint(&["users", user_id.as_str()]);
        let user: Option<WireUser> = self.rest.get_json(url).await?;
        Ok(user.and_then(WireUser::into_profile))
    }

    async fn resolve_users_by_ids(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = user_ids.iter().map(UserId::as_str).collect();
        let users = self.query_users("user_id", &ids).await?;
        Ok(users.into_iter().filter_map(WireUser::into_profile).collect())
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<UserProfile>> {
        let url = self.rest.endpoint(&["sessions", token]);
        let Some(session) = self.rest.get_json::<WireSession>(url).await? else {
            return Ok(None);
        };
        if session.status != "active" {
            debug!(session_status = %session.status, "identity session is not active");
            return Ok(None);
        }
        self.resolve_user_by_id(&session.user_id).await
    }
}

#[derive(Debug, Deserialize)]
struct WireSession {
    user_id: UserId,
    status: String,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: UserId,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    primary_email_address_id: Option<String>,
    #[serde(default)]
    email_addresses: Vec<WireEmail>,
}

#[derive(Debug, Deserialize)]
struct WireEmail {
    id: String,
    email_address: String,
}

/// The user holding `email` among any of their addresses. The profile still
/// carries the primary address.
fn find_by_email(users: Vec<WireUser>, email: &str) -> Option<UserProfile> {
    users
        .into_iter()
        .find(|user| user.has_email(email))
        .and_then(WireUser::into_profile)
}

impl WireUser {
    fn has_email(&self, normalized: &str) -> bool {
        self.email_addresses
            .iter()
            .any(|email| normalize_email(&email.email_address) == normalized)
    }

    fn primary_email(&self) -> Option<&str> {
        let primary = self.primary_email_address_id.as_deref();
        self.email_addresses
            .iter()
            .find(|email| Some(email.id.as_str()) == primary)
            .or_else(|| self.email_addresses.first())
            .map(|email| email.email_address.as_str())
    }

    /// Users without any email address cannot be collaborators.
    fn into_profile(self) -> Option<UserProfile> {
        let email = self.primary_email()?.to_owned();
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = if !full_name.is_empty() {
            full_name
        } else if let Some(username) = self.username.filter(|u| !u.trim().is_empty()) {
            username
        } else {
            email.clone()
        };

        Some(UserProfile::new(
            self.id,
            name,
            email,
            self.image_url.unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessonroom_core::identity::user_color;
    use serde_json::json;

    #[test]
    fn user_payload_prefers_primary_email_and_full_name() {
        let wire: WireUser = serde_json::from_value(json!({
            "id": "user_1",
            "first_name": "Olga",
            "last_name": "Owner",
            "image_url": "https://img/olga.png",
            "primary_email_address_id": "em_2",
            "email_addresses": [
                { "id": "em_1", "email_address": "old@school.edu" },
                { "id": "em_2", "email_address": "olga@school.edu" }
            ]
        }))
        .unwrap();

        let profile = wire.into_profile().unwrap();
        assert_eq!(profile.name, "Olga Owner");
        assert_eq!(profile.email, "olga@school.edu");
        assert_eq!(profile.avatar, "https://img/olga.png");
        assert_eq!(profile.color, user_color("user_1"));
    }

    #[test]
    fn name_falls_back_to_username_then_email() {
        let wire: WireUser = serde_json::from_value(json!({
            "id": "user_2",
            "first_name": " ",
            "username": "eli",
            "email_addresses": [{ "id": "em_1", "email_address": "eli@school.edu" }]
        }))
        .unwrap();
        assert_eq!(wire.into_profile().unwrap().name, "eli");

        let wire: WireUser = serde_json::from_value(json!({
            "id": "user_3",
            "email_addresses": [{ "id": "em_1", "email_address": "vera@school.edu" }]
        }))
        .unwrap();
        assert_eq!(wire.into_profile().unwrap().name, "vera@school.edu");

        let wire: WireUser = serde_json::from_value(json!({ "id": "user_4" })).unwrap();
        assert!(wire.into_profile().is_none());
    }

    #[test]
    fn email_lookup_matches_secondary_addresses() {
        let users: Vec<WireUser> = serde_json::from_value(json!([
            {
                "id": "user_5",
                "first_name": "Tom",
                "primary_email_address_id": "em_1",
                "email_addresses": [
                    { "id": "em_1", "email_address": "tom@school.edu" },
                    { "id": "em_2", "email_address": "Tom.Teacher@Home.org" }
                ]
            }
        ]))
        .unwrap();

        let email = normalize_email(" tom.teacher@home.org ");
        let profile = find_by_email(users, &email).unwrap();
        assert_eq!(profile.id.as_str(), "user_5");
        assert_eq!(profile.email, "tom@school.edu");
    }

    #[test]
    fn email_lookup_ignores_users_without_the_address() {
        let users: Vec<WireUser> = serde_json::from_value(json!([
            {
                "id": "user_6",
                "email_addresses": [{ "id": "em_1", "email_address": "ann@school.edu" }]
            }
        ]))
        .unwrap();
        assert!(find_by_email(users, "other@school.edu").is_none());
    }
}
