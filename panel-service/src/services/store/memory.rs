//! In-process store used by tests and `STORE_BACKEND=memory` runs.
//!
//! A transaction holds the store lock for its whole lifetime and works on a
//! staged copy of the collections, so transactions are serializable and a
//! dropped or aborted transaction leaves nothing behind.

use super::{
    Store, StoreError, StoreTx, ORGANIZATIONS, PROVISION_CODES, SITES, SITE_PERMISSIONS, TENANTS,
    USERS,
};
use crate::models::{
    Organization, ProvisionCode, Role, Site, SitePermission, SiteRole, SiteStatus, Tenant, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Collections {
    users: HashMap<String, User>,
    sites: HashMap<String, Site>,
    grants: HashMap<String, SitePermission>,
    organizations: HashMap<String, Organization>,
    tenants: HashMap<String, Tenant>,
    provision_codes: HashMap<String, ProvisionCode>,
}

/// Document counts per collection, for assertions in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionSizes {
    pub users: usize,
    pub sites: usize,
    pub site_permissions: usize,
    pub organizations: usize,
    pub tenants: usize,
    pub provision_codes: usize,
}

fn sorted_by_creation<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (DateTime<Utc>, String),
{
    items.sort_by_key(|item| key(item));
    items
}

impl Collections {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    fn site_by_slug(&self, slug: &str) -> Option<&Site> {
        self.sites.values().find(|s| s.slug == slug)
    }

    fn grant(&self, site_id: &str, user_id: &str) -> Option<&SitePermission> {
        self.grants
            .values()
            .find(|g| g.site_id == site_id && g.user_id == user_id)
    }

    fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        if self.users.contains_key(&user.id) || self.user_by_email(&user.email).is_some() {
            return Err(StoreError::DuplicateKey(USERS.to_string()));
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn insert_site(&mut self, site: &Site) -> Result<(), StoreError> {
        if self.sites.contains_key(&site.id) || self.site_by_slug(&site.slug).is_some() {
            return Err(StoreError::DuplicateKey(SITES.to_string()));
        }
        self.sites.insert(site.id.clone(), site.clone());
        Ok(())
    }

    fn insert_grant(&mut self, grant: &SitePermission) -> Result<(), StoreError> {
        if self.grants.contains_key(&grant.id)
            || self.grant(&grant.site_id, &grant.user_id).is_some()
        {
            return Err(StoreError::DuplicateKey(SITE_PERMISSIONS.to_string()));
        }
        self.grants.insert(grant.id.clone(), grant.clone());
        Ok(())
    }

    fn insert_organization(&mut self, org: &Organization) -> Result<(), StoreError> {
        if self.organizations.contains_key(&org.id) {
            return Err(StoreError::DuplicateKey(ORGANIZATIONS.to_string()));
        }
        self.organizations.insert(org.id.clone(), org.clone());
        Ok(())
    }

    fn insert_tenant(&mut self, tenant: &Tenant) -> Result<(), StoreError> {
        if self.tenants.contains_key(&tenant.id)
            || self.tenants.values().any(|t| t.site_id == tenant.site_id)
        {
            return Err(StoreError::DuplicateKey(TENANTS.to_string()));
        }
        self.tenants.insert(tenant.id.clone(), tenant.clone());
        Ok(())
    }

    fn insert_provision_code(&mut self, code: &ProvisionCode) -> Result<(), StoreError> {
        // Same sweep as the Mongo TTL index, anchored on the new code's clock
        self.provision_codes
            .retain(|_, c| c.expires_at > code.created_at);

        if self.provision_codes.contains_key(&code.id)
            || self
                .provision_codes
                .values()
                .any(|c| c.code_hash == code.code_hash)
        {
            return Err(StoreError::DuplicateKey(PROVISION_CODES.to_string()));
        }
        self.provision_codes.insert(code.id.clone(), code.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn collection_sizes(&self) -> CollectionSizes {
        let data = self.inner.lock().await;
        CollectionSizes {
            users: data.users.len(),
            sites: data.sites.len(),
            site_permissions: data.grants.len(),
            organizations: data.organizations.len(),
            tenants: data.tenants.len(),
            provision_codes: data.provision_codes.len(),
        }
    }

    pub async fn find_provision_code(&self, id: &str) -> Option<ProvisionCode> {
        self.inner.lock().await.provision_codes.get(id).cloned()
    }

    pub async fn list_tenants(&self) -> Vec<Tenant> {
        let data = self.inner.lock().await;
        sorted_by_creation(data.tenants.values().cloned().collect(), |t| {
            (t.created_at, t.id.clone())
        })
    }

    pub async fn list_organizations(&self) -> Vec<Organization> {
        let data = self.inner.lock().await;
        sorted_by_creation(data.organizations.values().cloned().collect(), |o| {
            (o.created_at, o.id.clone())
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.inner.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.lock().await.insert_user(user)
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.user_by_email(email).cloned())
    }

    async fn find_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        let data = self.inner.lock().await;
        Ok(ids.iter().filter_map(|id| data.users.get(id).cloned()).collect())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let data = self.inner.lock().await;
        Ok(sorted_by_creation(
            data.users.values().cloned().collect(),
            |u| (u.created_at, u.id.clone()),
        ))
    }

    async fn update_user_credentials(
        &self,
        id: &str,
        password_hash: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().await;
        match data.users.get_mut(id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.role = role;
                user.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_site(&self, site: &Site) -> Result<(), StoreError> {
        self.inner.lock().await.insert_site(site)
    }

    async fn find_site_by_id(&self, id: &str) -> Result<Option<Site>, StoreError> {
        Ok(self.inner.lock().await.sites.get(id).cloned())
    }

    async fn find_site_by_slug(&self, slug: &str) -> Result<Option<Site>, StoreError> {
        Ok(self.inner.lock().await.site_by_slug(slug).cloned())
    }

    async fn list_all_sites(&self) -> Result<Vec<Site>, StoreError> {
        let data = self.inner.lock().await;
        Ok(sorted_by_creation(
            data.sites.values().cloned().collect(),
            |s| (s.created_at, s.id.clone()),
        ))
    }

    async fn list_sites_by_ids(&self, ids: &[String]) -> Result<Vec<Site>, StoreError> {
        let data = self.inner.lock().await;
        Ok(sorted_by_creation(
            ids.iter().filter_map(|id| data.sites.get(id).cloned()).collect(),
            |s| (s.created_at, s.id.clone()),
        ))
    }

    async fn replace_site_content(
        &self,
        id: &str,
        content: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().await;
        match data.sites.get_mut(id) {
            Some(site) => {
                site.content = content.clone();
                site.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_site_status(
        &self,
        id: &str,
        status: SiteStatus,
        published_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().await;
        match data.sites.get_mut(id) {
            Some(site) => {
                site.status = status;
                site.published_at = published_at;
                site.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_grant(
        &self,
        site_id: &str,
        user_id: &str,
    ) -> Result<Option<SitePermission>, StoreError> {
        Ok(self.inner.lock().await.grant(site_id, user_id).cloned())
    }

    async fn list_grants_for_user(&self, user_id: &str) -> Result<Vec<SitePermission>, StoreError> {
        let data = self.inner.lock().await;
        Ok(sorted_by_creation(
            data.grants
                .values()
                .filter(|g| g.user_id == user_id)
                .cloned()
                .collect(),
            |g| (g.created_at, g.id.clone()),
        ))
    }

    async fn list_grants_for_site(&self, site_id: &str) -> Result<Vec<SitePermission>, StoreError> {
        let data = self.inner.lock().await;
        Ok(sorted_by_creation(
            data.grants
                .values()
                .filter(|g| g.site_id == site_id)
                .cloned()
                .collect(),
            |g| (g.created_at, g.id.clone()),
        ))
    }

    async fn upsert_grant(
        &self,
        site_id: &str,
        user_id: &str,
        role: SiteRole,
        now: DateTime<Utc>,
    ) -> Result<SitePermission, StoreError> {
        let mut data = self.inner.lock().await;
        if let Some(grant) = data
            .grants
            .values_mut()
            .find(|g| g.site_id == site_id && g.user_id == user_id)
        {
            grant.role = role;
            grant.updated_at = now;
            return Ok(grant.clone());
        }

        let grant = SitePermission::new(site_id.to_string(), user_id.to_string(), role, now);
        data.insert_grant(&grant)?;
        Ok(grant)
    }

    async fn insert_provision_code(&self, code: &ProvisionCode) -> Result<(), StoreError> {
        self.inner.lock().await.insert_provision_code(code)
    }

    async fn find_active_provision_code(
        &self,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ProvisionCode>, StoreError> {
        let data = self.inner.lock().await;
        Ok(data
            .provision_codes
            .values()
            .find(|c| c.code_hash == code_hash && c.is_consumable(now))
            .cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Collections>,
    staged: Collections,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_provision_code(&mut self, id: &str) -> Result<Option<ProvisionCode>, StoreError> {
        Ok(self.staged.provision_codes.get(id).cloned())
    }

    async fn find_site_by_slug(&mut self, slug: &str) -> Result<Option<Site>, StoreError> {
        Ok(self.staged.site_by_slug(slug).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.staged.user_by_email(email).cloned())
    }

    async fn count_site_admins(&mut self, site_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .staged
            .users
            .values()
            .filter(|u| u.role == Role::TenantAdmin && u.site_id.as_deref() == Some(site_id))
            .count() as u64)
    }

    async fn insert_organization(&mut self, org: &Organization) -> Result<(), StoreError> {
        self.staged.insert_organization(org)
    }

    async fn insert_site(&mut self, site: &Site) -> Result<(), StoreError> {
        self.staged.insert_site(site)
    }

    async fn insert_tenant(&mut self, tenant: &Tenant) -> Result<(), StoreError> {
        self.staged.insert_tenant(tenant)
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.staged.insert_user(user)
    }

    async fn insert_grant(&mut self, grant: &SitePermission) -> Result<(), StoreError> {
        self.staged.insert_grant(grant)
    }

    async fn mark_provision_code_used(
        &mut self,
        id: &str,
        used_at: DateTime<Utc>,
        used_by_ip: Option<&str>,
    ) -> Result<bool, StoreError> {
        match self.staged.provision_codes.get_mut(id) {
            Some(code) if code.used_at.is_none() => {
                code.used_at = Some(used_at);
                code.used_by_ip = used_by_ip.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Organization, ProvisionPayload};
    use chrono::Duration;

    fn user(email: &str) -> User {
        User::new(email, "hash".to_string(), None, Role::User, Utc::now())
    }

    fn site(slug: &str) -> Site {
        Site::new(
            slug.to_string(),
            slug.to_string(),
            None,
            serde_json::json!({}),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_unique_email_and_slug() {
        let store = MemoryStore::new();
        store.insert_user(&user("a@example.com")).await.unwrap();
        assert!(matches!(
            store.insert_user(&user("A@Example.com")).await,
            Err(StoreError::DuplicateKey(c)) if c == USERS
        ));

        store.insert_site(&site("acme")).await.unwrap();
        assert!(matches!(
            store.insert_site(&site("acme")).await,
            Err(StoreError::DuplicateKey(c)) if c == SITES
        ));
    }

    #[tokio::test]
    async fn test_upsert_grant_keeps_one_grant_per_pair() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.upsert_grant("s1", "u1", SiteRole::Viewer, now).await.unwrap();
        let grant = store.upsert_grant("s1", "u1", SiteRole::Owner, now).await.unwrap();

        assert_eq!(grant.role, SiteRole::Owner);
        assert_eq!(store.list_grants_for_site("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_site(&site("ghost")).await.unwrap();
            tx.insert_organization(&Organization::new("Ghost".into(), "ghost".into(), Utc::now()))
                .await
                .unwrap();
        }
        let tx = store.begin().await.unwrap();
        tx.abort().await.unwrap();

        assert_eq!(store.collection_sizes().await, CollectionSizes::default());
        assert!(store.find_site_by_slug("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_site(&site("acme")).await.unwrap();
        tx.insert_user(&user("a@example.com")).await.unwrap();
        assert!(tx.find_site_by_slug("acme").await.unwrap().is_some());
        tx.commit().await.unwrap();

        let sizes = store.collection_sizes().await;
        assert_eq!((sizes.sites, sizes.users), (1, 1));
    }

    #[tokio::test]
    async fn test_mark_used_is_compare_and_swap() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let code = ProvisionCode::new(
            "h".to_string(),
            ProvisionPayload {
                site_name: "Acme".to_string(),
                site_slug: "acme".to_string(),
            },
            Duration::minutes(15),
            now,
        );
        store.insert_provision_code(&code).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.mark_provision_code_used(&code.id, now, Some("10.0.0.1")).await.unwrap());
        assert!(!tx.mark_provision_code_used(&code.id, now, None).await.unwrap());
        tx.commit().await.unwrap();

        let stored = store.find_provision_code(&code.id).await.unwrap();
        assert_eq!(stored.used_at, Some(now));
        assert_eq!(stored.used_by_ip.as_deref(), Some("10.0.0.1"));
        assert!(store.find_active_provision_code("h", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_code_lookup_respects_expiry() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let code = ProvisionCode::new(
            "h".to_string(),
            ProvisionPayload {
                site_name: "Acme".to_string(),
                site_slug: "acme".to_string(),
            },
            Duration::minutes(15),
            now,
        );
        store.insert_provision_code(&code).await.unwrap();

        assert!(store.find_active_provision_code("h", now).await.unwrap().is_some());
        assert!(store
            .find_active_provision_code("h", now + Duration::minutes(15))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_insert_provision_code_sweeps_expired_codes() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let payload = || ProvisionPayload {
            site_name: "Acme".to_string(),
            site_slug: "acme".to_string(),
        };
        let stale = ProvisionCode::new("old".to_string(), payload(), Duration::minutes(15), now);
        let live = ProvisionCode::new(
            "live".to_string(),
            payload(),
            Duration::minutes(15),
            now + Duration::minutes(5),
        );
        store.insert_provision_code(&stale).await.unwrap();
        store.insert_provision_code(&live).await.unwrap();
        assert_eq!(store.collection_sizes().await.provision_codes, 2);

        let fresh = ProvisionCode::new(
            "fresh".to_string(),
            payload(),
            Duration::minutes(15),
            now + Duration::minutes(16),
        );
        store.insert_provision_code(&fresh).await.unwrap();

        assert_eq!(store.collection_sizes().await.provision_codes, 2);
        assert!(store.find_provision_code(&stale.id).await.is_none());
        assert!(store.find_provision_code(&live.id).await.is_some());
    }

    #[tokio::test]
    async fn test_one_tenant_per_site() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut tx = store.begin().await.unwrap();
        tx.insert_tenant(&Tenant::new("site-1".to_string(), "acme".to_string(), now))
            .await
            .unwrap();
        assert!(matches!(
            tx.insert_tenant(&Tenant::new("site-1".to_string(), "acme-2".to_string(), now))
                .await,
            Err(StoreError::DuplicateKey(c)) if c == TENANTS
        ));
    }
}
