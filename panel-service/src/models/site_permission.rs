use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Per-site role. Ordered so that `Viewer < Editor < Owner`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SiteRole {
    Viewer,
    Editor,
    Owner,
}

impl SiteRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteRole::Viewer => "viewer",
            SiteRole::Editor => "editor",
            SiteRole::Owner => "owner",
        }
    }

    pub fn can_read(&self) -> bool {
        true
    }

    pub fn can_write(&self) -> bool {
        *self >= SiteRole::Editor
    }
}

impl FromStr for SiteRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "viewer" => Ok(SiteRole::Viewer),
            "editor" => Ok(SiteRole::Editor),
            "owner" => Ok(SiteRole::Owner),
            _ => Err(format!("Invalid site role: {}", s)),
        }
    }
}

/// Grant of a site role to a user. At most one per (site, user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitePermission {
    #[serde(rename = "_id")]
    pub id: String,
    pub site_id: String,
    pub user_id: String,
    pub role: SiteRole,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl SitePermission {
    pub fn new(site_id: String, user_id: String, role: SiteRole, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            site_id,
            user_id,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_are_ordered() {
        assert!(SiteRole::Viewer < SiteRole::Editor);
        assert!(SiteRole::Editor < SiteRole::Owner);
    }

    #[test]
    fn test_read_write_matrix() {
        assert!(SiteRole::Viewer.can_read() && !SiteRole::Viewer.can_write());
        assert!(SiteRole::Editor.can_read() && SiteRole::Editor.can_write());
        assert!(SiteRole::Owner.can_read() && SiteRole::Owner.can_write());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(" Owner ".parse::<SiteRole>(), Ok(SiteRole::Owner));
        assert!("admin".parse::<SiteRole>().is_err());
    }
}
