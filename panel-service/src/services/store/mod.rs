//! Document store abstraction.
//!
//! Every domain service talks to the store through [`Store`]. Writes that
//! must land together (provisioning, site creation with its owner grant,
//! self-registration) go through a [`StoreTx`] obtained from [`Store::begin`]:
//! either `commit` applies all of them or none are visible.

mod memory;
mod mongo;

pub use memory::{CollectionSizes, MemoryStore};
pub use mongo::MongoStore;

use crate::models::{
    Organization, ProvisionCode, Site, SitePermission, SiteRole, SiteStatus, Tenant, User, Role,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const USERS: &str = "users";
pub const SITES: &str = "sites";
pub const SITE_PERMISSIONS: &str = "site_permissions";
pub const ORGANIZATIONS: &str = "organizations";
pub const TENANTS: &str = "tenants";
pub const PROVISION_CODES: &str = "provision_codes";

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the collection name.
    #[error("Duplicate key in {0}")]
    DuplicateKey(String),

    /// A concurrent transaction touched the same documents.
    #[error("Write conflict")]
    WriteConflict,

    #[error("Store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Opens a transaction. Dropping it without `commit` discards its writes.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    /// Returns false when no user has this id.
    async fn update_user_credentials(
        &self,
        id: &str,
        password_hash: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn insert_site(&self, site: &Site) -> Result<(), StoreError>;
    async fn find_site_by_id(&self, id: &str) -> Result<Option<Site>, StoreError>;
    async fn find_site_by_slug(&self, slug: &str) -> Result<Option<Site>, StoreError>;
    async fn list_all_sites(&self) -> Result<Vec<Site>, StoreError>;
    async fn list_sites_by_ids(&self, ids: &[String]) -> Result<Vec<Site>, StoreError>;
    /// Replaces the content document. Returns false when the site is missing.
    async fn replace_site_content(
        &self,
        id: &str,
        content: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    /// Sets status and `published_at` together. Returns false when the site is missing.
    async fn set_site_status(
        &self,
        id: &str,
        status: SiteStatus,
        published_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn find_grant(
        &self,
        site_id: &str,
        user_id: &str,
    ) -> Result<Option<SitePermission>, StoreError>;
    async fn list_grants_for_user(&self, user_id: &str) -> Result<Vec<SitePermission>, StoreError>;
    async fn list_grants_for_site(&self, site_id: &str) -> Result<Vec<SitePermission>, StoreError>;
    /// Creates the (site, user) grant or changes its role.
    async fn upsert_grant(
        &self,
        site_id: &str,
        user_id: &str,
        role: SiteRole,
        now: DateTime<Utc>,
    ) -> Result<SitePermission, StoreError>;

    async fn insert_provision_code(&self, code: &ProvisionCode) -> Result<(), StoreError>;
    /// Finds an unused code with this hash whose `expires_at` is after `now`.
    async fn find_active_provision_code(
        &self,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ProvisionCode>, StoreError>;
}

/// Reads and writes that share one atomic unit of work.
#[async_trait]
pub trait StoreTx: Send {
    async fn find_provision_code(&mut self, id: &str) -> Result<Option<ProvisionCode>, StoreError>;
    async fn find_site_by_slug(&mut self, slug: &str) -> Result<Option<Site>, StoreError>;
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;
    /// Users holding `TENANT_ADMIN` for the site.
    async fn count_site_admins(&mut self, site_id: &str) -> Result<u64, StoreError>;

    async fn insert_organization(&mut self, org: &Organization) -> Result<(), StoreError>;
    async fn insert_site(&mut self, site: &Site) -> Result<(), StoreError>;
    async fn insert_tenant(&mut self, tenant: &Tenant) -> Result<(), StoreError>;
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;
    async fn insert_grant(&mut self, grant: &SitePermission) -> Result<(), StoreError>;

    /// Flips `used_at` from null to `used_at`. Returns false if it was
    /// already set, which means another caller consumed the code first.
    async fn mark_provision_code_used(
        &mut self,
        id: &str,
        used_at: DateTime<Utc>,
        used_by_ip: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}
