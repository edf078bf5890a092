pub mod organization;
pub mod principal;
pub mod provision_code;
pub mod role;
pub mod site;
pub mod site_permission;
pub mod tenant;
pub mod user;

pub use organization::Organization;
pub use principal::Principal;
pub use provision_code::{ProvisionCode, ProvisionPayload};
pub use role::{Capability, Role};
pub use site::{PublicSiteResponse, Site, SiteResponse, SiteStatus};
pub use site_permission::{SitePermission, SiteRole};
pub use tenant::Tenant;
pub use user::{User, UserResponse};

/// Serde adapter storing `Option<DateTime<Utc>>` as a BSON datetime or null.
pub mod optional_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(bson::DateTime::from_chrono).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<bson::DateTime>::deserialize(deserializer)?.map(|dt| dt.to_chrono()))
    }
}
