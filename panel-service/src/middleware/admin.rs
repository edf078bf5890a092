use axum::{extract::Request, middleware::Next, response::Response};
use service_core::error::AppError;

use crate::models::{Capability, Principal};

/// Runs after `auth_middleware`; lets only callers that can manage users through.
pub async fn require_manage_users(request: Request, next: Next) -> Result<Response, AppError> {
    let allowed = request
        .extensions()
        .get::<Principal>()
        .is_some_and(|principal| principal.has_capability(Capability::ManageUsers));

    if !allowed {
        tracing::warn!("Admin route denied");
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Insufficient permissions"
        )));
    }

    Ok(next.run(request).await)
}
