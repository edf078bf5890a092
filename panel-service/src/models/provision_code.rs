use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the operator asked to provision when the code was issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionPayload {
    pub site_name: String,
    pub site_slug: String,
}

/// A one-time invite code. Only the hash of the code is ever stored.
///
/// `used_at` moves from null to a timestamp exactly once and never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionCode {
    #[serde(rename = "_id")]
    pub id: String,
    pub code_hash: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, with = "super::optional_bson_datetime")]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub used_by_ip: Option<String>,
    pub payload: ProvisionPayload,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ProvisionCode {
    pub fn new(
        code_hash: String,
        payload: ProvisionPayload,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            code_hash,
            expires_at: now + ttl,
            used_at: None,
            used_by_ip: None,
            payload,
            created_at: now,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        !self.is_used() && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(now: DateTime<Utc>) -> ProvisionCode {
        ProvisionCode::new(
            "hash".to_string(),
            ProvisionPayload {
                site_name: "Acme".to_string(),
                site_slug: "acme".to_string(),
            },
            Duration::minutes(15),
            now,
        )
    }

    #[test]
    fn test_fresh_code_is_consumable() {
        let now = Utc::now();
        let code = code(now);
        assert!(code.is_consumable(now));
        assert!(code.is_consumable(now + Duration::minutes(14)));
    }

    #[test]
    fn test_code_expires_at_deadline() {
        let now = Utc::now();
        let code = code(now);
        assert!(!code.is_consumable(now + Duration::minutes(15)));
        assert!(code.is_expired(now + Duration::minutes(16)));
    }

    #[test]
    fn test_used_code_is_not_consumable() {
        let now = Utc::now();
        let mut code = code(now);
        code.used_at = Some(now);
        assert!(!code.is_consumable(now));
    }
}
