use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::services::TokenResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RequestCodeRequest {
    #[validate(length(min = 1, max = 200, message = "Site name is required"))]
    #[schema(example = "Acme")]
    pub site_name: String,

    #[validate(length(min = 1, max = 100, message = "Site slug is required"))]
    #[schema(example = "Acme Co!")]
    pub site_slug: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestCodeResponse {
    /// Shown once; only its hash is stored.
    #[schema(example = "K7QM-2XPA")]
    pub code: String,
    #[schema(example = "acme-co")]
    pub site_slug: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetupLoginRequest {
    #[validate(length(min = 1, max = 64, message = "Code is required"))]
    #[schema(example = "k7qm-2xpa")]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetupLoginResponse {
    pub setup_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetupRegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "owner@acme.test")]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    #[schema(example = "password123", min_length = 8, max_length = 128)]
    pub password: String,

    #[schema(example = "Ada Owner")]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetupRegisterResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    pub user_id: String,
    pub organization_id: String,
    pub site_id: String,
    pub tenant_id: String,
}
