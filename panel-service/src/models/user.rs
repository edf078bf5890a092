//! User accounts. One shape covers global users and tenant admins; the
//! organization/site/tenant bindings are only set for the latter.

use super::role::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    /// Always lowercased and trimmed, so the unique index is case-insensitive.
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: &str,
        password_hash: String,
        name: Option<&str>,
        role: Role,
        now: DateTime<Utc>,
    ) -> Self {
        let email = normalize_email(email);
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.clone());

        Self {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            name,
            role,
            organization_id: None,
            site_id: None,
            tenant_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Binds the account to a provisioned tenant.
    pub fn scoped_to(mut self, organization_id: &str, site_id: &str, tenant_id: &str) -> Self {
        self.organization_id = Some(organization_id.to_string());
        self.site_id = Some(site_id.to_string());
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    /// Convert to sanitized response (no sensitive fields).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub organization_id: Option<String>,
    pub site_id: Option<String>,
    pub tenant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
            organization_id: u.organization_id.clone(),
            site_id: u.site_id.clone(),
            tenant_id: u.tenant_id.clone(),
            created_at: u.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized_and_name_defaults_to_it() {
        let user = User::new("  Owner@Example.COM ", "hash".into(), Some("   "), Role::User, Utc::now());
        assert_eq!(user.email, "owner@example.com");
        assert_eq!(user.name, "owner@example.com");

        let user = User::new("a@b.co", "hash".into(), Some(" Ada "), Role::User, Utc::now());
        assert_eq!(user.name, "Ada");
    }

    #[test]
    fn test_sanitized_response_has_no_hash() {
        let user = User::new("a@b.co", "$argon2id$secret".into(), None, Role::User, Utc::now());
        let json = serde_json::to_string(&user.sanitized()).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
    }
}
