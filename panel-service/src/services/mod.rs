//! Services layer for panel-service.
//!
//! Business logic for sessions, provisioning, sites and user administration.
//! Services depend on the `Store` and `Clock` traits, never on transport types.

mod admin;
mod auth;
pub mod clock;
pub mod error;
mod jwt;
pub mod metrics;
mod permissions;
mod provisioning;
pub mod seed;
mod sites;
pub mod store;

pub use admin::{AdminService, SiteMember};
pub use auth::{AuthService, Registration};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ServiceError;
pub use jwt::{SessionClaims, SetupClaims, TokenError, TokenKind, TokenResponse, TokenService};
pub use permissions::{PermissionResolver, SiteVisibility};
pub use provisioning::{
    IssuedCode, ProvisionedTenant, ProvisioningService, SetupRegistration, SetupSession,
};
pub use sites::SiteService;
pub use store::{MemoryStore, MongoStore, Store, StoreError, StoreTx};
