//! Idempotent bootstrap data for fresh deployments.

use chrono::{DateTime, Utc};

use super::error::ServiceError;
use super::store::Store;
use crate::config::SeedConfig;
use crate::models::{Role, Site, SiteRole, User};
use crate::utils::{is_valid_slug, normalize_slug, Password, PasswordHasher};

#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub superadmin_id: Option<String>,
    pub demo_user_id: Option<String>,
    pub demo_site_id: String,
}

/// Upserts the superadmin, the demo user and the demo site, then grants the
/// demo user `editor` on the site. Accounts with an empty email or password
/// are skipped. Running it twice changes nothing but passwords and timestamps.
pub async fn run_seed(
    store: &dyn Store,
    hasher: &PasswordHasher,
    config: &SeedConfig,
    now: DateTime<Utc>,
) -> Result<SeedReport, ServiceError> {
    let superadmin_id = upsert_user(
        store,
        hasher,
        &config.superadmin_email,
        &config.superadmin_password,
        Role::Superadmin,
        now,
    )
    .await?;
    let demo_user_id = upsert_user(
        store,
        hasher,
        &config.demo_email,
        &config.demo_password,
        Role::User,
        now,
    )
    .await?;

    let demo_site_id = upsert_site(store, &config.demo_site_slug, now).await?;

    if let Some(user_id) = &demo_user_id {
        store
            .upsert_grant(&demo_site_id, user_id, SiteRole::Editor, now)
            .await?;
    }

    tracing::info!(
        superadmin = superadmin_id.is_some(),
        demo_user = demo_user_id.is_some(),
        site_id = %demo_site_id,
        "Seed completed"
    );

    Ok(SeedReport {
        superadmin_id,
        demo_user_id,
        demo_site_id,
    })
}

async fn upsert_user(
    store: &dyn Store,
    hasher: &PasswordHasher,
    email: &str,
    password: &str,
    role: Role,
    now: DateTime<Utc>,
) -> Result<Option<String>, ServiceError> {
    if email.trim().is_empty() || password.is_empty() {
        return Ok(None);
    }

    let password_hash = hasher
        .hash(&Password::new(password.to_string()))?
        .into_string();

    let user = User::new(email, password_hash, None, role, now);
    match store.find_user_by_email(&user.email).await? {
        Some(existing) => {
            store
                .update_user_credentials(&existing.id, &user.password_hash, role, now)
                .await?;
            Ok(Some(existing.id))
        }
        None => {
            store.insert_user(&user).await?;
            Ok(Some(user.id))
        }
    }
}

async fn upsert_site(
    store: &dyn Store,
    slug: &str,
    now: DateTime<Utc>,
) -> Result<String, ServiceError> {
    let slug = normalize_slug(slug);
    if !is_valid_slug(&slug) {
        return Err(ServiceError::invalid_input("invalid demo site slug"));
    }

    if let Some(site) = store.find_site_by_slug(&slug).await? {
        return Ok(site.id);
    }

    let site = Site::new(
        "Demo Site".to_string(),
        slug,
        None,
        serde_json::json!({}),
        now,
    );
    store.insert_site(&site).await?;
    Ok(site.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;

    fn config() -> SeedConfig {
        SeedConfig {
            superadmin_email: "Admin@Example.com".to_string(),
            superadmin_password: "admin12345".to_string(),
            demo_email: "demo@example.com".to_string(),
            demo_password: "demo12345".to_string(),
            demo_site_slug: "Demo Site".to_string(),
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = MemoryStore::new();
        let hasher = PasswordHasher::new(1024, 1, 1).unwrap();

        let first = run_seed(&store, &hasher, &config(), Utc::now()).await.unwrap();
        let second = run_seed(&store, &hasher, &config(), Utc::now()).await.unwrap();

        assert_eq!(first.superadmin_id, second.superadmin_id);
        assert_eq!(first.demo_site_id, second.demo_site_id);
        let sizes = store.collection_sizes().await;
        assert_eq!((sizes.users, sizes.sites, sizes.site_permissions), (2, 1, 1));

        let admin = store.find_user_by_email("admin@example.com").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Superadmin);
        let site = store.find_site_by_slug("demo-site").await.unwrap().unwrap();
        let demo_id = first.demo_user_id.unwrap();
        let grant = store.find_grant(&site.id, &demo_id).await.unwrap().unwrap();
        assert_eq!(grant.role, SiteRole::Editor);
    }

    #[tokio::test]
    async fn test_seed_skips_blank_accounts() {
        let store = MemoryStore::new();
        let hasher = PasswordHasher::new(1024, 1, 1).unwrap();
        let mut config = config();
        config.demo_password = String::new();

        let report = run_seed(&store, &hasher, &config, Utc::now()).await.unwrap();

        assert!(report.demo_user_id.is_none());
        let sizes = store.collection_sizes().await;
        assert_eq!((sizes.users, sizes.sites, sizes.site_permissions), (1, 1, 0));
    }
}
