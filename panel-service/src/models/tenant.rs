use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Binds a provisioned site to the panel address its admins sign in on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(rename = "_id")]
    pub id: String,
    pub site_id: String,
    pub panel_slug: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(site_id: String, panel_slug: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            site_id,
            panel_slug,
            created_at: now,
        }
    }
}
