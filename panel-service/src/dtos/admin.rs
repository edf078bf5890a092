use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Role, SitePermission, SiteRole};
use crate::services::SiteMember;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "editor@example.com")]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    #[schema(example = "password123", min_length = 8, max_length = 128)]
    pub password: String,

    pub name: Option<String>,

    /// `user` (default) or `superadmin`.
    #[schema(example = "user")]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantAccessRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "editor@example.com")]
    pub email: String,

    /// `viewer`, `editor` or `owner`.
    #[schema(example = "editor")]
    pub role: String,

    /// Create a `user` account with an unusable password if the email is unknown.
    #[serde(default)]
    pub create_if_missing: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantResponse {
    pub site_id: String,
    pub user_id: String,
    pub role: SiteRole,
}

impl From<SitePermission> for GrantResponse {
    fn from(grant: SitePermission) -> Self {
        Self {
            site_id: grant.site_id,
            user_id: grant.user_id,
            role: grant.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SiteMemberResponse {
    pub user_id: String,
    pub email: String,
    pub global_role: Role,
    pub role: SiteRole,
}

impl From<SiteMember> for SiteMemberResponse {
    fn from(member: SiteMember) -> Self {
        Self {
            user_id: member.user_id,
            email: member.email,
            global_role: member.global_role,
            role: member.role,
        }
    }
}
