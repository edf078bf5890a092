use super::{
    Store, StoreError, StoreTx, ORGANIZATIONS, PROVISION_CODES, SITES, SITE_PERMISSIONS, TENANTS,
    USERS,
};
use crate::models::{
    Organization, ProvisionCode, Role, Site, SitePermission, SiteRole, SiteStatus, Tenant, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, ClientSession, Collection, Database, IndexModel,
};
use std::time::Duration;
use uuid::Uuid;

const DUPLICATE_KEY: i32 = 11000;
const WRITE_CONFLICT: i32 = 112;
const NAMESPACE_EXISTS: i32 = 48;

fn error_code(e: &mongodb::error::Error) -> Option<i32> {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => Some(we.code),
        ErrorKind::Command(ce) => Some(ce.code),
        _ => None,
    }
}

fn map_err(collection: &str, e: mongodb::error::Error) -> StoreError {
    match error_code(&e) {
        Some(DUPLICATE_KEY) => StoreError::DuplicateKey(collection.to_string()),
        Some(WRITE_CONFLICT) => StoreError::WriteConflict,
        _ => {
            tracing::error!(collection = %collection, "MongoDB operation failed: {}", e);
            StoreError::Backend(anyhow::Error::new(e))
        }
    }
}

/// Collections written inside transactions. Servers before 4.4 cannot create
/// a collection implicitly within a transaction, so they must exist up front.
const COLLECTIONS: [&str; 6] = [
    USERS,
    SITES,
    SITE_PERMISSIONS,
    PROVISION_CODES,
    ORGANIZATIONS,
    TENANTS,
];

fn missing_collections(existing: &[String]) -> Vec<&'static str> {
    COLLECTIONS
        .into_iter()
        .filter(|name| !existing.iter().any(|e| e == name))
        .collect()
}

fn created_order() -> Document {
    doc! { "created_at": 1, "_id": 1 }
}

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            StoreError::Backend(anyhow::Error::new(e))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn sites(&self) -> Collection<Site> {
        self.db.collection(SITES)
    }

    fn grants(&self) -> Collection<SitePermission> {
        self.db.collection(SITE_PERMISSIONS)
    }

    fn provision_codes(&self) -> Collection<ProvisionCode> {
        self.db.collection(PROVISION_CODES)
    }

    fn organizations(&self) -> Collection<Organization> {
        self.db.collection(ORGANIZATIONS)
    }

    fn tenants(&self) -> Collection<Tenant> {
        self.db.collection(TENANTS)
    }

    async fn ensure_collections(&self) -> Result<(), StoreError> {
        let existing = self
            .db
            .list_collection_names(None)
            .await
            .map_err(|e| map_err("collections", e))?;

        for name in missing_collections(&existing) {
            match self.db.create_collection(name, None).await {
                Ok(()) => tracing::info!(collection = %name, "Created collection"),
                // NamespaceExists: another instance won the race
                Err(e) if error_code(&e) == Some(NAMESPACE_EXISTS) => {}
                Err(e) => return Err(map_err(name, e)),
            }
        }
        Ok(())
    }

    async fn create_index<T: Send + Sync>(
        collection: &Collection<T>,
        name: &str,
        keys: Document,
        options: IndexOptions,
    ) -> Result<(), StoreError> {
        let mut options = options;
        options.name = Some(name.to_string());
        let index = IndexModel::builder().keys(keys).options(options).build();

        collection.create_index(index, None).await.map_err(|e| {
            tracing::error!("Failed to create {} index: {}", name, e);
            StoreError::Backend(anyhow::Error::new(e))
        })?;
        Ok(())
    }

    /// Slugs that occur on more than one site. A non-empty result blocks the unique index.
    async fn duplicate_slugs(&self) -> Result<Vec<String>, StoreError> {
        let pipeline = vec![
            doc! { "$group": { "_id": "$slug", "count": { "$sum": 1 } } },
            doc! { "$match": { "count": { "$gt": 1 } } },
            doc! { "$limit": 20 },
        ];

        let docs: Vec<Document> = self
            .db
            .collection::<Document>(SITES)
            .aggregate(pipeline, None)
            .await
            .map_err(|e| map_err(SITES, e))?
            .try_collect()
            .await
            .map_err(|e| map_err(SITES, e))?;

        Ok(docs
            .iter()
            .filter_map(|d| d.get_str("_id").ok().map(str::to_string))
            .collect())
    }

    pub async fn initialize_indexes(&self) -> Result<(), StoreError> {
        tracing::info!("Creating MongoDB indexes for panel-service");

        self.ensure_collections().await?;

        let duplicates = self.duplicate_slugs().await?;
        if !duplicates.is_empty() {
            tracing::error!(slugs = ?duplicates, "Duplicate site slugs found");
            return Err(StoreError::Backend(anyhow::anyhow!(
                "Cannot create unique slug index, duplicate slugs: {}",
                duplicates.join(", ")
            )));
        }

        let unique = || IndexOptions::builder().unique(true).build();
        let plain = || IndexOptions::builder().build();

        Self::create_index(&self.users(), "email_unique", doc! { "email": 1 }, unique()).await?;
        Self::create_index(
            &self.users(),
            "site_role_idx",
            doc! { "site_id": 1, "role": 1 },
            IndexOptions::builder().sparse(true).build(),
        )
        .await?;

        Self::create_index(&self.sites(), "slug_unique", doc! { "slug": 1 }, unique()).await?;

        Self::create_index(
            &self.grants(),
            "site_user_unique",
            doc! { "site_id": 1, "user_id": 1 },
            unique(),
        )
        .await?;
        Self::create_index(&self.grants(), "user_idx", doc! { "user_id": 1 }, plain()).await?;

        Self::create_index(
            &self.provision_codes(),
            "code_hash_unique",
            doc! { "code_hash": 1 },
            unique(),
        )
        .await?;
        Self::create_index(
            &self.tenants(),
            "site_id_unique",
            doc! { "site_id": 1 },
            unique(),
        )
        .await?;
        Self::create_index(&self.organizations(), "slug_idx", doc! { "slug": 1 }, plain())
            .await?;

        // Sweeps stale codes; reads never rely on it
        Self::create_index(
            &self.provision_codes(),
            "expires_at_ttl",
            doc! { "expires_at": 1 },
            IndexOptions::builder()
                .expire_after(Duration::from_secs(0))
                .build(),
        )
        .await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                StoreError::Backend(anyhow::Error::new(e))
            })?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut session = self
            .client
            .start_session(None)
            .await
            .map_err(|e| map_err("session", e))?;
        session
            .start_transaction(None)
            .await
            .map_err(|e| map_err("session", e))?;

        Ok(Box::new(MongoTx {
            session,
            db: self.db.clone(),
        }))
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users()
            .insert_one(user, None)
            .await
            .map_err(|e| map_err(USERS, e))?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.users()
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| map_err(USERS, e))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.users()
            .find_one(doc! { "email": email }, None)
            .await
            .map_err(|e| map_err(USERS, e))
    }

    async fn find_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        self.users()
            .find(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await
            .map_err(|e| map_err(USERS, e))?
            .try_collect()
            .await
            .map_err(|e| map_err(USERS, e))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let options = FindOptions::builder().sort(created_order()).build();
        self.users()
            .find(doc! {}, options)
            .await
            .map_err(|e| map_err(USERS, e))?
            .try_collect()
            .await
            .map_err(|e| map_err(USERS, e))
    }

    async fn update_user_credentials(
        &self,
        id: &str,
        password_hash: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = self
            .users()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "password_hash": password_hash,
                    "role": role.as_str(),
                    "updated_at": BsonDateTime::from_chrono(now),
                } },
                None,
            )
            .await
            .map_err(|e| map_err(USERS, e))?;
        Ok(result.matched_count == 1)
    }

    async fn insert_site(&self, site: &Site) -> Result<(), StoreError> {
        self.sites()
            .insert_one(site, None)
            .await
            .map_err(|e| map_err(SITES, e))?;
        Ok(())
    }

    async fn find_site_by_id(&self, id: &str) -> Result<Option<Site>, StoreError> {
        self.sites()
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| map_err(SITES, e))
    }

    async fn find_site_by_slug(&self, slug: &str) -> Result<Option<Site>, StoreError> {
        self.sites()
            .find_one(doc! { "slug": slug }, None)
            .await
            .map_err(|e| map_err(SITES, e))
    }

    async fn list_all_sites(&self) -> Result<Vec<Site>, StoreError> {
        let options = FindOptions::builder().sort(created_order()).build();
        self.sites()
            .find(doc! {}, options)
            .await
            .map_err(|e| map_err(SITES, e))?
            .try_collect()
            .await
            .map_err(|e| map_err(SITES, e))
    }

    async fn list_sites_by_ids(&self, ids: &[String]) -> Result<Vec<Site>, StoreError> {
        let options = FindOptions::builder().sort(created_order()).build();
        self.sites()
            .find(doc! { "_id": { "$in": ids.to_vec() } }, options)
            .await
            .map_err(|e| map_err(SITES, e))?
            .try_collect()
            .await
            .map_err(|e| map_err(SITES, e))
    }

    async fn replace_site_content(
        &self,
        id: &str,
        content: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let content = mongodb::bson::to_bson(content)
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?;

        let result = self
            .sites()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "content": content,
                    "updated_at": BsonDateTime::from_chrono(now),
                } },
                None,
            )
            .await
            .map_err(|e| map_err(SITES, e))?;
        Ok(result.matched_count == 1)
    }

    async fn set_site_status(
        &self,
        id: &str,
        status: SiteStatus,
        published_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = self
            .sites()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "status": status.as_str(),
                    "published_at": published_at.map(BsonDateTime::from_chrono),
                    "updated_at": BsonDateTime::from_chrono(now),
                } },
                None,
            )
            .await
            .map_err(|e| map_err(SITES, e))?;
        Ok(result.matched_count == 1)
    }

    async fn find_grant(
        &self,
        site_id: &str,
        user_id: &str,
    ) -> Result<Option<SitePermission>, StoreError> {
        self.grants()
            .find_one(doc! { "site_id": site_id, "user_id": user_id }, None)
            .await
            .map_err(|e| map_err(SITE_PERMISSIONS, e))
    }

    async fn list_grants_for_user(&self, user_id: &str) -> Result<Vec<SitePermission>, StoreError> {
        let options = FindOptions::builder().sort(created_order()).build();
        self.grants()
            .find(doc! { "user_id": user_id }, options)
            .await
            .map_err(|e| map_err(SITE_PERMISSIONS, e))?
            .try_collect()
            .await
            .map_err(|e| map_err(SITE_PERMISSIONS, e))
    }

    async fn list_grants_for_site(&self, site_id: &str) -> Result<Vec<SitePermission>, StoreError> {
        let options = FindOptions::builder().sort(created_order()).build();
        self.grants()
            .find(doc! { "site_id": site_id }, options)
            .await
            .map_err(|e| map_err(SITE_PERMISSIONS, e))?
            .try_collect()
            .await
            .map_err(|e| map_err(SITE_PERMISSIONS, e))
    }

    async fn upsert_grant(
        &self,
        site_id: &str,
        user_id: &str,
        role: SiteRole,
        now: DateTime<Utc>,
    ) -> Result<SitePermission, StoreError> {
        let now = BsonDateTime::from_chrono(now);
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        self.grants()
            .find_one_and_update(
                doc! { "site_id": site_id, "user_id": user_id },
                doc! {
                    "$set": { "role": role.as_str(), "updated_at": now },
                    "$setOnInsert": { "_id": Uuid::new_v4().to_string(), "created_at": now },
                },
                options,
            )
            .await
            .map_err(|e| map_err(SITE_PERMISSIONS, e))?
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("Upsert returned no grant")))
    }

    async fn insert_provision_code(&self, code: &ProvisionCode) -> Result<(), StoreError> {
        self.provision_codes()
            .insert_one(code, None)
            .await
            .map_err(|e| map_err(PROVISION_CODES, e))?;
        Ok(())
    }

    async fn find_active_provision_code(
        &self,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ProvisionCode>, StoreError> {
        self.provision_codes()
            .find_one(
                doc! {
                    "code_hash": code_hash,
                    "used_at": null,
                    "expires_at": { "$gt": BsonDateTime::from_chrono(now) },
                },
                None,
            )
            .await
            .map_err(|e| map_err(PROVISION_CODES, e))
    }
}

/// Multi-document transaction on one client session. Requires a replica set.
/// Dropping the session without committing aborts the transaction server-side.
struct MongoTx {
    session: ClientSession,
    db: Database,
}

impl MongoTx {
    async fn insert<T: serde::Serialize + Send + Sync>(
        &mut self,
        collection: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        self.db
            .collection::<T>(collection)
            .insert_one_with_session(value, None, &mut self.session)
            .await
            .map_err(|e| map_err(collection, e))?;
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MongoTx {
    async fn find_provision_code(&mut self, id: &str) -> Result<Option<ProvisionCode>, StoreError> {
        self.db
            .collection::<ProvisionCode>(PROVISION_CODES)
            .find_one_with_session(doc! { "_id": id }, None, &mut self.session)
            .await
            .map_err(|e| map_err(PROVISION_CODES, e))
    }

    async fn find_site_by_slug(&mut self, slug: &str) -> Result<Option<Site>, StoreError> {
        self.db
            .collection::<Site>(SITES)
            .find_one_with_session(doc! { "slug": slug }, None, &mut self.session)
            .await
            .map_err(|e| map_err(SITES, e))
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        self.db
            .collection::<User>(USERS)
            .find_one_with_session(doc! { "email": email }, None, &mut self.session)
            .await
            .map_err(|e| map_err(USERS, e))
    }

    async fn count_site_admins(&mut self, site_id: &str) -> Result<u64, StoreError> {
        self.db
            .collection::<User>(USERS)
            .count_documents_with_session(
                doc! { "site_id": site_id, "role": Role::TenantAdmin.as_str() },
                None,
                &mut self.session,
            )
            .await
            .map_err(|e| map_err(USERS, e))
    }

    async fn insert_organization(&mut self, org: &Organization) -> Result<(), StoreError> {
        self.insert(ORGANIZATIONS, org).await
    }

    async fn insert_site(&mut self, site: &Site) -> Result<(), StoreError> {
        self.insert(SITES, site).await
    }

    async fn insert_tenant(&mut self, tenant: &Tenant) -> Result<(), StoreError> {
        self.insert(TENANTS, tenant).await
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.insert(USERS, user).await
    }

    async fn insert_grant(&mut self, grant: &SitePermission) -> Result<(), StoreError> {
        self.insert(SITE_PERMISSIONS, grant).await
    }

    async fn mark_provision_code_used(
        &mut self,
        id: &str,
        used_at: DateTime<Utc>,
        used_by_ip: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = self
            .db
            .collection::<ProvisionCode>(PROVISION_CODES)
            .update_one_with_session(
                doc! { "_id": id, "used_at": null },
                doc! { "$set": {
                    "used_at": BsonDateTime::from_chrono(used_at),
                    "used_by_ip": used_by_ip,
                } },
                None,
                &mut self.session,
            )
            .await
            .map_err(|e| map_err(PROVISION_CODES, e))?;
        Ok(result.matched_count == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = *self;
        tx.session
            .commit_transaction()
            .await
            .map_err(|e| map_err("transaction", e))
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = *self;
        tx.session
            .abort_transaction()
            .await
            .map_err(|e| map_err("transaction", e))
    }
}
