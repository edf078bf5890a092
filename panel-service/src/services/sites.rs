use serde_json::Value;
use std::sync::Arc;

use super::clock::Clock;
use super::error::ServiceError;
use super::permissions::{PermissionResolver, SiteVisibility};
use super::store::{Store, StoreError, StoreTx};
use crate::models::{Capability, Principal, Site, SitePermission, SiteRole, SiteStatus};
use crate::utils::{is_valid_slug, normalize_slug};

const SLUG_TAKEN: &str = "site slug already exists";

fn slug_conflict(err: StoreError) -> ServiceError {
    match err {
        StoreError::DuplicateKey(_) => ServiceError::conflict(SLUG_TAKEN),
        other => ServiceError::Store(other),
    }
}

fn require_object(content: &Value) -> Result<(), ServiceError> {
    if content.is_object() {
        Ok(())
    } else {
        Err(ServiceError::invalid_input("content must be a JSON object"))
    }
}

/// Site CRUD and publishing. Every call checks permissions before touching
/// the site itself.
#[derive(Clone)]
pub struct SiteService {
    store: Arc<dyn Store>,
    permissions: PermissionResolver,
    clock: Arc<dyn Clock>,
}

impl SiteService {
    pub fn new(store: Arc<dyn Store>, permissions: PermissionResolver, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            permissions,
            clock,
        }
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<Site>, ServiceError> {
        let sites = match self.permissions.visible_sites(principal).await? {
            SiteVisibility::All => self.store.list_all_sites().await?,
            SiteVisibility::Only(ids) if ids.is_empty() => Vec::new(),
            SiteVisibility::Only(ids) => {
                let ids: Vec<String> = ids.into_iter().collect();
                self.store.list_sites_by_ids(&ids).await?
            }
        };
        Ok(sites)
    }

    pub async fn create(
        &self,
        principal: &Principal,
        name: &str,
        slug: &str,
        content: Option<Value>,
    ) -> Result<Site, ServiceError> {
        if !principal.has_capability(Capability::CreateSite) {
            tracing::warn!(user_id = %principal.user_id, "Site creation denied");
            return Err(ServiceError::forbidden());
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::invalid_input("site name is required"));
        }
        let slug = normalize_slug(slug);
        if !is_valid_slug(&slug) {
            return Err(ServiceError::invalid_input("invalid site slug"));
        }
        let content = content.unwrap_or_else(|| serde_json::json!({}));
        require_object(&content)?;

        let now = self.clock.now();
        let site = Site::new(
            name.to_string(),
            slug,
            principal.organization_id.clone(),
            content,
            now,
        );

        let mut tx = self.store.begin().await?;
        match self.create_in_tx(tx.as_mut(), principal, &site).await {
            Ok(()) => tx.commit().await.map_err(slug_conflict)?,
            Err(e) => {
                if let Err(abort_err) = tx.abort().await {
                    tracing::warn!(error = %abort_err, "Failed to abort site transaction");
                }
                return Err(e);
            }
        }

        tracing::info!(site_id = %site.id, slug = %site.slug, user_id = %principal.user_id, "Site created");
        Ok(site)
    }

    pub async fn get(&self, principal: &Principal, site_id: &str) -> Result<Site, ServiceError> {
        self.permissions.authorize_read(principal, site_id).await?;
        self.load(site_id).await
    }

    /// Replaces the whole content document. Last write wins.
    pub async fn update_content(
        &self,
        principal: &Principal,
        site_id: &str,
        content: Value,
    ) -> Result<Site, ServiceError> {
        self.permissions.authorize_write(principal, site_id).await?;
        require_object(&content)?;

        if !self
            .store
            .replace_site_content(site_id, &content, self.clock.now())
            .await?
        {
            return Err(ServiceError::not_found("Site"));
        }
        tracing::info!(site_id = %site_id, user_id = %principal.user_id, "Site content updated");
        self.load(site_id).await
    }

    pub async fn publish(&self, principal: &Principal, site_id: &str) -> Result<Site, ServiceError> {
        self.set_status(principal, site_id, SiteStatus::Published).await
    }

    pub async fn unpublish(&self, principal: &Principal, site_id: &str) -> Result<Site, ServiceError> {
        self.set_status(principal, site_id, SiteStatus::Draft).await
    }

    /// Published site by slug, for anonymous delivery.
    pub async fn public_by_slug(&self, slug: &str) -> Result<Site, ServiceError> {
        self.store
            .find_site_by_slug(&normalize_slug(slug))
            .await?
            .filter(Site::is_published)
            .ok_or_else(|| ServiceError::not_found("Site"))
    }

    async fn create_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        principal: &Principal,
        site: &Site,
    ) -> Result<(), ServiceError> {
        if tx.find_site_by_slug(&site.slug).await?.is_some() {
            return Err(ServiceError::conflict(SLUG_TAKEN));
        }
        tx.insert_site(site).await.map_err(slug_conflict)?;

        // Superadmins reach every site already
        if !principal.is_superadmin() {
            tx.insert_grant(&SitePermission::new(
                site.id.clone(),
                principal.user_id.clone(),
                SiteRole::Owner,
                site.created_at,
            ))
            .await?;
        }
        Ok(())
    }

    async fn set_status(
        &self,
        principal: &Principal,
        site_id: &str,
        status: SiteStatus,
    ) -> Result<Site, ServiceError> {
        self.permissions.authorize_write(principal, site_id).await?;

        let now = self.clock.now();
        if !self
            .store
            .set_site_status(site_id, status, status.published_at(now), now)
            .await?
        {
            return Err(ServiceError::not_found("Site"));
        }
        tracing::info!(site_id = %site_id, status = status.as_str(), "Site status changed");
        self.load(site_id).await
    }

    async fn load(&self, site_id: &str) -> Result<Site, ServiceError> {
        self.store
            .find_site_by_id(site_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Site"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::clock::ManualClock;
    use crate::services::store::MemoryStore;
    use chrono::Duration;
    use serde_json::json;

    struct Fixture {
        sites: SiteService,
        store: MemoryStore,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = ManualClock::default();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let sites = SiteService::new(
            shared.clone(),
            PermissionResolver::new(shared),
            Arc::new(clock.clone()),
        );
        Fixture { sites, store, clock }
    }

    fn principal(user_id: &str, role: Role) -> Principal {
        Principal {
            user_id: user_id.to_string(),
            role,
            organization_id: Some("org-1".to_string()),
            site_id: None,
            tenant_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_grants_owner_and_inherits_org() {
        let f = fixture();
        let admin = principal("admin", Role::TenantAdmin);

        let site = f.sites.create(&admin, "Acme", "Acme Co!", None).await.unwrap();

        assert_eq!(site.slug, "acme-co");
        assert_eq!(site.status, SiteStatus::Draft);
        assert_eq!(site.organization_id.as_deref(), Some("org-1"));
        let grant = f.store.find_grant(&site.id, "admin").await.unwrap().unwrap();
        assert_eq!(grant.role, SiteRole::Owner);
    }

    #[tokio::test]
    async fn test_plain_user_cannot_create() {
        let f = fixture();
        let err = f
            .sites
            .create(&principal("u1", Role::User), "Acme", "acme", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_non_object_content_and_bad_slug() {
        let f = fixture();
        let root = principal("root", Role::Superadmin);

        assert!(matches!(
            f.sites.create(&root, "Acme", "acme", Some(json!([1, 2]))).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            f.sites.create(&root, "Acme", "---", None).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_same_slug_creates_one_site() {
        let f = fixture();
        let a = principal("a", Role::TenantAdmin);
        let b = principal("b", Role::TenantAdmin);

        let (first, second) = tokio::join!(
            f.sites.create(&a, "One", "shared", None),
            f.sites.create(&b, "Two", "shared", None),
        );

        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(
            first.err().or(second.err()).unwrap(),
            ServiceError::Conflict(_)
        ));
        let sizes = f.store.collection_sizes().await;
        assert_eq!((sizes.sites, sizes.site_permissions), (1, 1));
    }

    #[tokio::test]
    async fn test_publish_and_unpublish() {
        let f = fixture();
        let root = principal("root", Role::Superadmin);
        let site = f.sites.create(&root, "Acme", "acme", None).await.unwrap();

        f.clock.advance(Duration::minutes(1));
        let published = f.sites.publish(&root, &site.id).await.unwrap();
        assert_eq!(published.status, SiteStatus::Published);
        assert_eq!(published.published_at, Some(f.clock.now()));
        assert!(f.sites.public_by_slug("acme").await.is_ok());

        let draft = f.sites.unpublish(&root, &site.id).await.unwrap();
        assert_eq!(draft.status, SiteStatus::Draft);
        assert!(draft.published_at.is_none());
        assert!(matches!(
            f.sites.public_by_slug("acme").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_viewer_reads_but_cannot_write() {
        let f = fixture();
        let root = principal("root", Role::Superadmin);
        let site = f.sites.create(&root, "Acme", "acme", None).await.unwrap();
        f.store
            .upsert_grant(&site.id, "viewer", SiteRole::Viewer, f.clock.now())
            .await
            .unwrap();
        let viewer = principal("viewer", Role::User);

        assert_eq!(f.sites.get(&viewer, &site.id).await.unwrap().id, site.id);
        assert_eq!(f.sites.list(&viewer).await.unwrap().len(), 1);
        assert!(matches!(
            f.sites
                .update_content(&viewer, &site.id, json!({"title": "x"}))
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            f.sites.publish(&viewer, &site.id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_update_content_replaces_document() {
        let f = fixture();
        let admin = principal("admin", Role::TenantAdmin);
        let site = f
            .sites
            .create(&admin, "Acme", "acme", Some(json!({"a": 1, "b": 2})))
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(5));
        let updated = f
            .sites
            .update_content(&admin, &site.id, json!({"c": 3}))
            .await
            .unwrap();
        assert_eq!(updated.content, json!({"c": 3}));
        assert_eq!(updated.updated_at, f.clock.now());

        assert!(matches!(
            f.sites.update_content(&admin, &site.id, json!("text")).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_superadmin_gets_not_found_for_missing_site() {
        let f = fixture();
        let root = principal("root", Role::Superadmin);
        assert!(matches!(
            f.sites.get(&root, "missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.sites.get(&principal("u1", Role::User), "missing").await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
