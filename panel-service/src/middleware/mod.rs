pub mod admin;
pub mod api_key;
pub mod auth;
pub mod setup;

pub use admin::require_manage_users;
pub use api_key::provision_api_key_middleware;
pub use auth::{auth_middleware, AuthUser};
pub use setup::{setup_token_middleware, SetupContext};
