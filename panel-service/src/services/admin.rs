use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::collections::HashMap;
use std::sync::Arc;

use super::clock::Clock;
use super::error::ServiceError;
use super::store::{Store, StoreError};
use crate::models::user::normalize_email;
use crate::models::{Role, SitePermission, SiteRole, User};
use crate::utils::{Password, PasswordHasher};

const EMAIL_TAKEN: &str = "email already registered";

/// A grant on a site joined with the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteMember {
    pub user_id: String,
    pub email: String,
    pub global_role: Role,
    pub role: SiteRole,
}

/// Password nobody knows. Accounts created on the fly by a grant get one
/// until they go through a reset.
fn unusable_password() -> Password {
    let secret: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect();
    Password::new(secret)
}

/// User management for superadmins. Callers gate on `Capability::ManageUsers`.
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>, hasher: PasswordHasher, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hasher,
            clock,
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self.store.list_users().await?)
    }

    /// Only the global roles can be handed out here; tenant admins come from
    /// provisioning.
    pub async fn create_user(
        &self,
        email: &str,
        password: &Password,
        name: Option<&str>,
        role: Role,
    ) -> Result<User, ServiceError> {
        if !matches!(role, Role::User | Role::Superadmin) {
            return Err(ServiceError::invalid_input(
                "role must be one of: user, superadmin",
            ));
        }
        self.insert_user(email, password, name, role).await
    }

    pub async fn grant_site_access(
        &self,
        site_id: &str,
        email: &str,
        role: SiteRole,
        create_if_missing: bool,
    ) -> Result<SitePermission, ServiceError> {
        if self.store.find_site_by_id(site_id).await?.is_none() {
            return Err(ServiceError::not_found("Site"));
        }

        let email = normalize_email(email);
        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) => user,
            None if create_if_missing => {
                let user = self
                    .insert_user(&email, &unusable_password(), None, Role::User)
                    .await?;
                tracing::info!(user_id = %user.id, "Created user for site grant");
                user
            }
            None => return Err(ServiceError::not_found("User")),
        };

        let grant = self
            .store
            .upsert_grant(site_id, &user.id, role, self.clock.now())
            .await?;

        tracing::info!(
            site_id = %site_id,
            user_id = %user.id,
            role = role.as_str(),
            "Site access granted"
        );
        Ok(grant)
    }

    pub async fn list_site_users(&self, site_id: &str) -> Result<Vec<SiteMember>, ServiceError> {
        if self.store.find_site_by_id(site_id).await?.is_none() {
            return Err(ServiceError::not_found("Site"));
        }

        let grants = self.store.list_grants_for_site(site_id).await?;
        let ids: Vec<String> = grants.iter().map(|g| g.user_id.clone()).collect();
        let users: HashMap<String, User> = self
            .store
            .find_users_by_ids(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        // Grants whose user is gone are skipped
        Ok(grants
            .into_iter()
            .filter_map(|grant| {
                users.get(&grant.user_id).map(|user| SiteMember {
                    user_id: user.id.clone(),
                    email: user.email.clone(),
                    global_role: user.role,
                    role: grant.role,
                })
            })
            .collect())
    }

    async fn insert_user(
        &self,
        email: &str,
        password: &Password,
        name: Option<&str>,
        role: Role,
    ) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ServiceError::invalid_input("email is required"));
        }
        let password_hash = self.hasher.hash(password)?.into_string();
        let user = User::new(&email, password_hash, name, role, self.clock.now());

        self.store.insert_user(&user).await.map_err(|e| match e {
            StoreError::DuplicateKey(_) => ServiceError::conflict(EMAIL_TAKEN),
            other => ServiceError::Store(other),
        })?;

        tracing::info!(user_id = %user.id, role = %user.role, "User created");
        Ok(user)
    }
}
