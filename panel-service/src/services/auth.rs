use metrics::counter;
use serde_json::{json, Value};
use std::sync::Arc;

use super::clock::Clock;
use super::error::ServiceError;
use super::jwt::{TokenResponse, TokenService};
use super::store::{Store, StoreError, StoreTx};
use crate::models::user::normalize_email;
use crate::models::{Principal, Role, Site, SitePermission, SiteRole, User};
use crate::utils::{normalize_slug, Password, PasswordHashString, PasswordHasher};

const EMAIL_TAKEN: &str = "email already registered";
const FALLBACK_SLUG: &str = "site";
const SLUG_SUFFIX_ATTEMPTS: usize = 200;

/// Account plus starter site created by self-service registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub tokens: TokenResponse,
    pub user: User,
    pub site: Site,
}

fn starter_content() -> Value {
    json!({
        "sections": [
            { "type": "hero", "data": { "title": "Welcome", "subtitle": "Your site is ready" } },
            { "type": "cta", "data": { "title": "Contact", "buttonText": "Get a quote", "buttonHref": "#contact" } },
        ]
    })
}

/// "jane.doe" -> "Jane.doe Site"
fn starter_site_name(local_part: &str) -> String {
    let mut chars = local_part.trim().chars();
    match chars.next() {
        Some(first) => format!("{}{} Site", first.to_uppercase(), chars.as_str()),
        None => "My Site".to_string(),
    }
}

fn slug_base(email: &str) -> String {
    let local_part = email.split('@').next().unwrap_or_default();
    let slug = normalize_slug(local_part);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: TokenService,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: TokenService,
        hasher: PasswordHasher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            tokens,
            hasher,
            clock,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &Password,
    ) -> Result<TokenResponse, ServiceError> {
        let email = normalize_email(email);

        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                tracing::warn!("Login failed: unknown email");
                counter!("logins_total", "outcome" => "failure").increment(1);
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if self
            .hasher
            .verify(password, &PasswordHashString::new(user.password_hash.clone()))
            .is_err()
        {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            counter!("logins_total", "outcome" => "failure").increment(1);
            return Err(ServiceError::InvalidCredentials);
        }

        let tokens = self.tokens.issue_session_pair(&user)?;
        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
        counter!("logins_total", "outcome" => "success").increment(1);
        Ok(tokens)
    }

    /// Issues a fresh pair. The presented refresh token stays valid until it
    /// expires on its own.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ServiceError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;

        // Reload so deleted users cannot refresh and role changes apply
        let user = self
            .store
            .find_user_by_id(&claims.sub)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        tracing::debug!(user_id = %user.id, "Session refreshed");
        Ok(self.tokens.issue_session_pair(&user)?)
    }

    pub async fn me(&self, principal: &Principal) -> Result<User, ServiceError> {
        self.store
            .find_user_by_id(&principal.user_id)
            .await?
            .ok_or(ServiceError::InvalidToken)
    }

    /// Creates a `user` account with its own draft site and owner grant.
    pub async fn register(
        &self,
        email: &str,
        password: &Password,
        name: Option<&str>,
    ) -> Result<Registration, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ServiceError::invalid_input("email is required"));
        }
        let password_hash = self.hasher.hash(password)?.into_string();
        let now = self.clock.now();

        let user = User::new(&email, password_hash, name, Role::User, now);

        let mut tx = self.store.begin().await?;
        let site = match self.register_in_tx(tx.as_mut(), &user).await {
            Ok(site) => {
                tx.commit().await.map_err(|e| match e {
                    StoreError::DuplicateKey(_) => ServiceError::conflict(EMAIL_TAKEN),
                    other => ServiceError::Store(other),
                })?;
                site
            }
            Err(e) => {
                if let Err(abort_err) = tx.abort().await {
                    tracing::warn!(error = %abort_err, "Failed to abort registration transaction");
                }
                return Err(e);
            }
        };

        let tokens = self.tokens.issue_session_pair(&user)?;
        tracing::info!(user_id = %user.id, site_id = %site.id, slug = %site.slug, "User registered");

        Ok(Registration { tokens, user, site })
    }

    async fn register_in_tx(&self, tx: &mut dyn StoreTx, user: &User) -> Result<Site, ServiceError> {
        if tx.find_user_by_email(&user.email).await?.is_some() {
            return Err(ServiceError::conflict(EMAIL_TAKEN));
        }
        tx.insert_user(user).await.map_err(|e| match e {
            StoreError::DuplicateKey(_) => ServiceError::conflict(EMAIL_TAKEN),
            other => ServiceError::Store(other),
        })?;

        let base = slug_base(&user.email);
        let slug = self.free_slug(tx, &base).await?;
        let local_part = user.email.split('@').next().unwrap_or_default();

        let site = Site::new(
            starter_site_name(local_part),
            slug,
            None,
            starter_content(),
            user.created_at,
        );
        tx.insert_site(&site).await?;
        tx.insert_grant(&SitePermission::new(
            site.id.clone(),
            user.id.clone(),
            SiteRole::Owner,
            user.created_at,
        ))
        .await?;

        Ok(site)
    }

    /// `base`, then `base-1` .. `base-200`, first one not taken.
    async fn free_slug(&self, tx: &mut dyn StoreTx, base: &str) -> Result<String, ServiceError> {
        for attempt in 0..=SLUG_SUFFIX_ATTEMPTS {
            let candidate = if attempt == 0 {
                base.to_string()
            } else {
                format!("{}-{}", base, attempt)
            };
            if tx.find_site_by_slug(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(ServiceError::conflict("unable to find a free site slug"))
    }
}
