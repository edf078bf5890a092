use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Draft,
    Published,
}

/// A site document. `content` is opaque to the backend and must be a JSON object.
///
/// `published_at` is set exactly when `status` is `Published`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub status: SiteStatus,
    pub content: serde_json::Value,
    #[serde(default)]
    pub is_provisioned: bool,
    #[serde(default, with = "super::optional_bson_datetime")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn new(
        name: String,
        slug: String,
        organization_id: Option<String>,
        content: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            organization_id,
            name,
            slug,
            status: SiteStatus::Draft,
            content,
            is_provisioned: false,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == SiteStatus::Published
    }
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Draft => "draft",
            SiteStatus::Published => "published",
        }
    }

    /// The `published_at` value a site in this status must carry.
    pub fn published_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            SiteStatus::Published => Some(now),
            SiteStatus::Draft => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SiteResponse {
    pub id: String,
    pub organization_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub status: SiteStatus,
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
    pub is_provisioned: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Site> for SiteResponse {
    fn from(s: Site) -> Self {
        Self {
            id: s.id,
            organization_id: s.organization_id,
            name: s.name,
            slug: s.slug,
            status: s.status,
            content: s.content,
            is_provisioned: s.is_provisioned,
            published_at: s.published_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// What the public site endpoint exposes of a published site.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicSiteResponse {
    pub slug: String,
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl From<Site> for PublicSiteResponse {
    fn from(s: Site) -> Self {
        Self {
            slug: s.slug,
            content: s.content,
            updated_at: s.updated_at,
        }
    }
}
