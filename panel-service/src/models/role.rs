//! Account roles and the capabilities they carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Role attached to a user account.
///
/// `user` and `superadmin` are global roles; `TENANT_ADMIN` and `reseller`
/// are scoped to the organization the account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "superadmin")]
    Superadmin,
    #[serde(rename = "TENANT_ADMIN")]
    TenantAdmin,
    #[serde(rename = "reseller")]
    Reseller,
}

/// Actions that are not tied to a single site grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Implies every other capability and every site permission.
    All,
    CreateSite,
    ManageUsers,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Superadmin => "superadmin",
            Role::TenantAdmin => "TENANT_ADMIN",
            Role::Reseller => "reseller",
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Superadmin => &[Capability::All],
            Role::TenantAdmin | Role::Reseller => &[Capability::CreateSite],
            Role::User => &[],
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        let caps = self.capabilities();
        caps.contains(&Capability::All) || caps.contains(&capability)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "superadmin" => Ok(Role::Superadmin),
            "TENANT_ADMIN" => Ok(Role::TenantAdmin),
            "reseller" => Ok(Role::Reseller),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superadmin_implies_every_capability() {
        assert!(Role::Superadmin.has_capability(Capability::CreateSite));
        assert!(Role::Superadmin.has_capability(Capability::ManageUsers));
    }

    #[test]
    fn test_scoped_roles_can_only_create_sites() {
        for role in [Role::TenantAdmin, Role::Reseller] {
            assert!(role.has_capability(Capability::CreateSite));
            assert!(!role.has_capability(Capability::ManageUsers));
            assert!(!role.has_capability(Capability::All));
        }
        assert!(!Role::User.has_capability(Capability::CreateSite));
    }

    #[test]
    fn test_wire_names_round_trip() {
        for role in [Role::User, Role::Superadmin, Role::TenantAdmin, Role::Reseller] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
            assert_eq!(
                serde_json::to_value(role).unwrap(),
                serde_json::Value::String(role.as_str().to_string())
            );
        }
    }
}
