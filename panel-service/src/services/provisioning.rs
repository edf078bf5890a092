//! Invite-code tenant provisioning.
//!
//! An operator requests a one-time code for a site name and slug. The new
//! tenant exchanges the code for a short-lived setup token, then registers
//! the first admin. Registration creates the organization, site, tenant,
//! admin user and owner grant and consumes the code in one store
//! transaction; the compare-and-swap on `used_at` makes sure at most one
//! registration per code ever commits.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::sync::Arc;

use super::clock::Clock;
use super::error::ServiceError;
use super::jwt::{SetupClaims, TokenResponse, TokenService};
use super::store::{Store, StoreError, StoreTx};
use crate::models::user::normalize_email;
use crate::models::{
    Organization, ProvisionCode, ProvisionPayload, Role, Site, SitePermission, SiteRole, Tenant,
    User,
};
use crate::utils::{
    generate_setup_code, hash_setup_code, is_valid_slug, normalize_slug, Password,
    PasswordHasher,
};

const SLUG_TAKEN: &str = "site slug already exists";
const CODE_USED: &str = "setup code already used";
const EMAIL_TAKEN: &str = "email already registered";
const CODE_ALLOCATION_ATTEMPTS: usize = 3;

/// A freshly issued code. The plaintext is returned exactly once.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub site_slug: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SetupSession {
    pub setup_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SetupRegistration {
    pub email: String,
    pub password: Password,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProvisionedTenant {
    pub tokens: TokenResponse,
    pub user_id: String,
    pub organization_id: String,
    pub site_id: String,
    pub tenant_id: String,
}

fn conflict_on_duplicate(err: StoreError, msg: &str) -> ServiceError {
    match err {
        StoreError::DuplicateKey(_) => ServiceError::conflict(msg),
        StoreError::WriteConflict => ServiceError::conflict(CODE_USED),
        other => ServiceError::Store(other),
    }
}

#[derive(Clone)]
pub struct ProvisioningService {
    store: Arc<dyn Store>,
    tokens: TokenService,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
    code_ttl: Duration,
}

impl ProvisioningService {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: TokenService,
        hasher: PasswordHasher,
        clock: Arc<dyn Clock>,
        code_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            tokens,
            hasher,
            clock,
            code_ttl: Duration::minutes(code_ttl_minutes),
        }
    }

    pub async fn request_code(
        &self,
        site_name: &str,
        site_slug: &str,
    ) -> Result<IssuedCode, ServiceError> {
        let site_name = site_name.trim();
        if site_name.is_empty() {
            return Err(ServiceError::invalid_input("site name is required"));
        }

        let slug = normalize_slug(site_slug);
        if !is_valid_slug(&slug) {
            return Err(ServiceError::invalid_input("invalid site slug"));
        }

        if self.store.find_site_by_slug(&slug).await?.is_some() {
            return Err(ServiceError::conflict(SLUG_TAKEN));
        }

        let payload = ProvisionPayload {
            site_name: site_name.to_string(),
            site_slug: slug.clone(),
        };
        let now = self.clock.now();

        // A fresh code colliding with a stored hash is rare but not impossible
        for _ in 0..CODE_ALLOCATION_ATTEMPTS {
            let code = generate_setup_code();
            let record =
                ProvisionCode::new(hash_setup_code(&code), payload.clone(), self.code_ttl, now);

            match self.store.insert_provision_code(&record).await {
                Ok(()) => {
                    tracing::info!(
                        provision_id = %record.id,
                        site_slug = %slug,
                        expires_at = %record.expires_at,
                        "Provision code issued"
                    );
                    counter!("provision_codes_issued_total").increment(1);
                    return Ok(IssuedCode {
                        code,
                        site_slug: slug,
                        expires_at: record.expires_at,
                    });
                }
                Err(StoreError::DuplicateKey(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "Could not allocate a unique setup code"
        )))
    }

    pub async fn setup_login(&self, code: &str) -> Result<SetupSession, ServiceError> {
        let now = self.clock.now();
        let record = self
            .store
            .find_active_provision_code(&hash_setup_code(code), now)
            .await?
            .filter(|record| record.is_consumable(now))
            .ok_or_else(|| {
                tracing::warn!("Setup login with unknown, used or expired code");
                ServiceError::InvalidSetupCode
            })?;

        let (setup_token, expires_at) = self
            .tokens
            .issue_setup_token(&record.id, &record.payload.site_slug)?;

        tracing::info!(provision_id = %record.id, "Setup token issued");
        Ok(SetupSession {
            setup_token,
            expires_at,
        })
    }

    pub async fn setup_register(
        &self,
        setup: &SetupClaims,
        registration: SetupRegistration,
        client_ip: Option<String>,
    ) -> Result<ProvisionedTenant, ServiceError> {
        let email = normalize_email(&registration.email);
        if email.is_empty() {
            return Err(ServiceError::invalid_input("email is required"));
        }
        // Hash before opening the transaction to keep it short
        let password_hash = self.hasher.hash(&registration.password)?.into_string();

        let mut tx = self.store.begin().await?;
        let result = self
            .register_in_tx(
                tx.as_mut(),
                setup,
                &email,
                password_hash,
                registration.name.as_deref(),
                client_ip.as_deref(),
            )
            .await;

        match result {
            Ok(provisioned) => {
                tx.commit()
                    .await
                    .map_err(|e| conflict_on_duplicate(e, SLUG_TAKEN))?;

                tracing::info!(
                    provision_id = %setup.provision_id,
                    organization_id = %provisioned.organization_id,
                    site_id = %provisioned.site_id,
                    tenant_id = %provisioned.tenant_id,
                    user_id = %provisioned.user_id,
                    "Tenant provisioned"
                );
                counter!("provisioning_registrations_total", "outcome" => "success").increment(1);
                Ok(provisioned)
            }
            Err(e) => {
                if let Err(abort_err) = tx.abort().await {
                    tracing::warn!(error = %abort_err, "Failed to abort provisioning transaction");
                }
                tracing::warn!(provision_id = %setup.provision_id, error = %e, "Setup register rejected");
                counter!("provisioning_registrations_total", "outcome" => "rejected").increment(1);
                Err(e)
            }
        }
    }

    async fn register_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        setup: &SetupClaims,
        email: &str,
        password_hash: String,
        name: Option<&str>,
        client_ip: Option<&str>,
    ) -> Result<ProvisionedTenant, ServiceError> {
        let now = self.clock.now();

        let record = tx
            .find_provision_code(&setup.provision_id)
            .await?
            .filter(|record| record.payload.site_slug == setup.site_slug)
            .ok_or(ServiceError::InvalidSetupToken)?;

        if record.is_used() {
            return Err(ServiceError::conflict(CODE_USED));
        }
        if record.is_expired(now) {
            return Err(ServiceError::SetupExpired);
        }

        let slug = record.payload.site_slug.clone();
        if tx.find_site_by_slug(&slug).await?.is_some() {
            return Err(ServiceError::conflict(SLUG_TAKEN));
        }
        if tx.find_user_by_email(email).await?.is_some() {
            return Err(ServiceError::conflict(EMAIL_TAKEN));
        }

        let organization = Organization::new(record.payload.site_name.clone(), slug.clone(), now);
        tx.insert_organization(&organization).await?;

        let mut site = Site::new(
            record.payload.site_name.clone(),
            slug.clone(),
            Some(organization.id.clone()),
            serde_json::json!({}),
            now,
        );
        site.is_provisioned = true;
        tx.insert_site(&site)
            .await
            .map_err(|e| conflict_on_duplicate(e, SLUG_TAKEN))?;

        let tenant = Tenant::new(site.id.clone(), slug, now);
        tx.insert_tenant(&tenant).await?;

        if tx.count_site_admins(&site.id).await? > 0 {
            return Err(ServiceError::conflict("first admin already exists for site"));
        }

        let user = User::new(email, password_hash, name, Role::TenantAdmin, now).scoped_to(
            &organization.id,
            &site.id,
            &tenant.id,
        );
        tx.insert_user(&user)
            .await
            .map_err(|e| conflict_on_duplicate(e, EMAIL_TAKEN))?;

        tx.insert_grant(&SitePermission::new(
            site.id.clone(),
            user.id.clone(),
            SiteRole::Owner,
            now,
        ))
        .await?;

        let claimed = tx
            .mark_provision_code_used(&record.id, now, client_ip)
            .await
            .map_err(|e| conflict_on_duplicate(e, CODE_USED))?;
        if !claimed {
            return Err(ServiceError::conflict(CODE_USED));
        }

        let tokens = self.tokens.issue_session_pair(&user)?;

        Ok(ProvisionedTenant {
            tokens,
            user_id: user.id,
            organization_id: organization.id,
            site_id: site.id,
            tenant_id: tenant.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::services::clock::ManualClock;
    use crate::services::store::MemoryStore;

    struct Fixture {
        service: ProvisioningService,
        tokens: TokenService,
        store: MemoryStore,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = ManualClock::default();
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let tokens = TokenService::new(
            &JwtConfig {
                access_secret: "access-secret-for-tests-0123456789".to_string(),
                refresh_secret: "refresh-secret-for-tests-0123456789".to_string(),
                access_token_expiry_minutes: 15,
                refresh_token_expiry_days: 30,
                setup_token_expiry_minutes: 15,
            },
            clock_arc.clone(),
        );
        let service = ProvisioningService::new(
            Arc::new(store.clone()),
            tokens.clone(),
            PasswordHasher::new(1024, 1, 1).unwrap(),
            clock_arc,
            15,
        );
        Fixture {
            service,
            tokens,
            store,
            clock,
        }
    }

    fn registration(email: &str) -> SetupRegistration {
        SetupRegistration {
            email: email.to_string(),
            password: Password::new("correct horse".to_string()),
            name: Some("Ada".to_string()),
        }
    }

    async fn setup_claims(f: &Fixture, code: &str) -> SetupClaims {
        let session = f.service.setup_login(code).await.unwrap();
        f.tokens.verify_setup(&session.setup_token).unwrap()
    }

    #[tokio::test]
    async fn test_request_code_normalizes_slug_and_stores_hash_only() {
        let f = fixture();
        let issued = f.service.request_code("Acme", "Acme Co!").await.unwrap();

        assert_eq!(issued.site_slug, "acme-co");
        assert_eq!(issued.expires_at, f.clock.now() + Duration::minutes(15));
        let stored = f
            .store
            .find_active_provision_code(&hash_setup_code(&issued.code), f.clock.now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payload.site_slug, "acme-co");
        assert_ne!(stored.code_hash, issued.code);
    }

    #[tokio::test]
    async fn test_request_code_rejects_bad_input() {
        let f = fixture();
        assert!(matches!(
            f.service.request_code("Acme", "!!!").await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            f.service.request_code("   ", "acme").await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_request_code_conflicts_with_existing_site() {
        let f = fixture();
        f.store
            .insert_site(&Site::new(
                "Acme".into(),
                "acme".into(),
                None,
                serde_json::json!({}),
                f.clock.now(),
            ))
            .await
            .unwrap();

        assert!(matches!(
            f.service.request_code("Acme", "ACME").await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(f.store.collection_sizes().await.provision_codes, 0);
    }

    #[tokio::test]
    async fn test_setup_login_rejects_expired_code() {
        let f = fixture();
        let issued = f.service.request_code("Acme", "acme").await.unwrap();

        f.clock.advance(Duration::minutes(16));
        assert!(matches!(
            f.service.setup_login(&issued.code).await,
            Err(ServiceError::InvalidSetupCode)
        ));
    }

    #[tokio::test]
    async fn test_register_creates_tenant_and_consumes_code() {
        let f = fixture();
        let issued = f.service.request_code("Acme", "acme").await.unwrap();
        let claims = setup_claims(&f, &issued.code.to_lowercase()).await;

        let tenant = f
            .service
            .setup_register(&claims, registration("Admin@Acme.test"), Some("10.1.1.1".into()))
            .await
            .unwrap();

        let sizes = f.store.collection_sizes().await;
        assert_eq!(
            (sizes.organizations, sizes.sites, sizes.tenants, sizes.users, sizes.site_permissions),
            (1, 1, 1, 1, 1)
        );

        let site = f.store.find_site_by_id(&tenant.site_id).await.unwrap().unwrap();
        assert!(site.is_provisioned);
        assert_eq!(site.organization_id.as_deref(), Some(tenant.organization_id.as_str()));

        let user = f.store.find_user_by_email("admin@acme.test").await.unwrap().unwrap();
        assert_eq!(user.role, Role::TenantAdmin);
        assert_eq!(user.tenant_id.as_deref(), Some(tenant.tenant_id.as_str()));

        let code = f.store.find_provision_code(&claims.provision_id).await.unwrap();
        assert_eq!(code.used_at, Some(f.clock.now()));
        assert_eq!(code.used_by_ip.as_deref(), Some("10.1.1.1"));

        let access = f.tokens.verify_access(&tenant.tokens.access_token).unwrap();
        assert_eq!(access.tenant_id.as_deref(), Some(tenant.tenant_id.as_str()));

        // The code is spent
        assert!(matches!(
            f.service.setup_login(&issued.code).await,
            Err(ServiceError::InvalidSetupCode)
        ));
    }

    #[tokio::test]
    async fn test_second_register_with_same_token_conflicts() {
        let f = fixture();
        let issued = f.service.request_code("Acme", "acme").await.unwrap();
        let claims = setup_claims(&f, &issued.code).await;

        f.service
            .setup_register(&claims, registration("a@acme.test"), None)
            .await
            .unwrap();
        let err = f
            .service
            .setup_register(&claims, registration("b@acme.test"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Conflict(ref m) if m == CODE_USED));
        assert_eq!(f.store.collection_sizes().await.users, 1);
    }

    #[tokio::test]
    async fn test_register_after_code_expiry_fails_without_side_effects() {
        let f = fixture();
        let issued = f.service.request_code("Acme", "acme").await.unwrap();
        f.clock.advance(Duration::minutes(10));
        let claims = setup_claims(&f, &issued.code).await;

        // Setup token outlives the code by ten minutes
        f.clock.advance(Duration::minutes(5));
        let err = f
            .service
            .setup_register(&claims, registration("a@acme.test"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::SetupExpired));
        let sizes = f.store.collection_sizes().await;
        assert_eq!((sizes.sites, sizes.users, sizes.organizations), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_slug_taken_between_code_and_register_rolls_back() {
        let f = fixture();
        let issued = f.service.request_code("Acme", "acme").await.unwrap();
        let claims = setup_claims(&f, &issued.code).await;

        f.store
            .insert_site(&Site::new(
                "Squatter".into(),
                "acme".into(),
                None,
                serde_json::json!({}),
                f.clock.now(),
            ))
            .await
            .unwrap();

        let err = f
            .service
            .setup_register(&claims, registration("a@acme.test"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m == SLUG_TAKEN));

        let sizes = f.store.collection_sizes().await;
        assert_eq!((sizes.sites, sizes.organizations, sizes.tenants), (1, 0, 0));
        let code = f.store.find_provision_code(&claims.provision_id).await.unwrap();
        assert!(code.used_at.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_registers_admit_exactly_one() {
        let f = fixture();
        let issued = f.service.request_code("Acme", "acme").await.unwrap();
        let claims = setup_claims(&f, &issued.code).await;

        let (first, second) = tokio::join!(
            f.service
                .setup_register(&claims, registration("a@acme.test"), None),
            f.service
                .setup_register(&claims, registration("b@acme.test"), None),
        );

        let outcomes = [first.is_ok(), second.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let failure = first.err().or(second.err()).unwrap();
        assert!(matches!(failure, ServiceError::Conflict(_)));

        let sizes = f.store.collection_sizes().await;
        assert_eq!(
            (sizes.organizations, sizes.sites, sizes.tenants, sizes.users),
            (1, 1, 1, 1)
        );
    }
}
