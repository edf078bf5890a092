use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::AppState;

pub const PROVISION_API_KEY_HEADER: &str = "x-api-key";

/// Guards the operator-only provisioning endpoints with the shared
/// `X-API-Key`. An unset key disables the endpoints instead of opening them.
pub async fn provision_api_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.config.provisioning.api_key.as_bytes();
    if expected.is_empty() {
        tracing::error!("PROVISION_API_KEY is not configured");
        return Err(AppError::InternalError(anyhow::anyhow!(
            "provision endpoint misconfigured"
        )));
    }

    let presented = request
        .headers()
        .get(PROVISION_API_KEY_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();

    if bool::from(presented.ct_eq(expected)) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Failed provisioning API key check");
        Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid or missing API key"
        )))
    }
}
