//! Site-level access decisions.
//!
//! Superadmins (`Capability::All`) pass every check here and nowhere else.
//! Everyone else needs a grant on the site; grants are read from the store on
//! every call, so a revoked or changed grant takes effect on the next request.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::error::ServiceError;
use super::store::Store;
use crate::models::{Capability, Principal, SiteRole};

/// Which sites a principal may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteVisibility {
    All,
    Only(BTreeSet<String>),
}

#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn Store>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn site_role(
        &self,
        principal: &Principal,
        site_id: &str,
    ) -> Result<Option<SiteRole>, ServiceError> {
        Ok(self
            .store
            .find_grant(site_id, &principal.user_id)
            .await?
            .map(|grant| grant.role))
    }

    pub async fn can_read(&self, principal: &Principal, site_id: &str) -> Result<bool, ServiceError> {
        if principal.has_capability(Capability::All) {
            return Ok(true);
        }
        Ok(self
            .site_role(principal, site_id)
            .await?
            .is_some_and(|role| role.can_read()))
    }

    pub async fn can_write(
        &self,
        principal: &Principal,
        site_id: &str,
    ) -> Result<bool, ServiceError> {
        if principal.has_capability(Capability::All) {
            return Ok(true);
        }
        Ok(self
            .site_role(principal, site_id)
            .await?
            .is_some_and(|role| role.can_write()))
    }

    pub async fn visible_sites(&self, principal: &Principal) -> Result<SiteVisibility, ServiceError> {
        if principal.has_capability(Capability::All) {
            return Ok(SiteVisibility::All);
        }

        let ids = self
            .store
            .list_grants_for_user(&principal.user_id)
            .await?
            .into_iter()
            .filter(|grant| grant.role.can_read())
            .map(|grant| grant.site_id)
            .collect();
        Ok(SiteVisibility::Only(ids))
    }

    pub async fn authorize_read(
        &self,
        principal: &Principal,
        site_id: &str,
    ) -> Result<(), ServiceError> {
        if self.can_read(principal, site_id).await? {
            Ok(())
        } else {
            tracing::warn!(user_id = %principal.user_id, site_id = %site_id, "Site read denied");
            Err(ServiceError::forbidden())
        }
    }

    pub async fn authorize_write(
        &self,
        principal: &Principal,
        site_id: &str,
    ) -> Result<(), ServiceError> {
        if self.can_write(principal, site_id).await? {
            Ok(())
        } else {
            tracing::warn!(user_id = %principal.user_id, site_id = %site_id, "Site write denied");
            Err(ServiceError::forbidden())
        }
    }
}
