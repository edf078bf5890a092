use super::role::{Capability, Role};

/// The authenticated caller, rebuilt from a verified access token on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    pub organization_id: Option<String>,
    pub site_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl Principal {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.role.has_capability(capability)
    }

    pub fn is_superadmin(&self) -> bool {
        self.has_capability(Capability::All)
    }
}
