use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing and branding unit created when a tenant is provisioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub brand_name: String,
    pub slug: String,
    /// Placeholder until plans exist.
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: String, slug: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            brand_name: name.clone(),
            name,
            slug,
            plan_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
