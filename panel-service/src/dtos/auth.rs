use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Site, SiteStatus};
use crate::services::TokenResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, max = 128, message = "Password must be 1 to 128 characters"))]
    #[schema(example = "password123", max_length = 128)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    #[schema(example = "password123", min_length = 8, max_length = 128)]
    pub password: String,

    #[schema(example = "Jane Doe")]
    pub name: Option<String>,
}

/// The starter site created with a self-service account.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SiteSummary {
    pub id: String,
    #[schema(example = "jane")]
    pub slug: String,
    #[schema(example = "Jane Site")]
    pub name: String,
    pub status: SiteStatus,
}

impl From<&Site> for SiteSummary {
    fn from(site: &Site) -> Self {
        Self {
            id: site.id.clone(),
            slug: site.slug.clone(),
            name: site.name.clone(),
            status: site.status,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    pub user_id: String,
    pub site: SiteSummary,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    #[schema(example = "eyJhbGciOiJIUzI1NiJ9...")]
    pub refresh_token: String,
}
