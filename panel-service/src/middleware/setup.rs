use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use super::auth::bearer_token;
use crate::{services::SetupClaims, AppState};

/// Requires a setup token (from setup-login) instead of a session token.
pub async fn setup_token_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_token(req.headers())
        .and_then(|token| match state.tokens.verify_setup(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!(reason = %e, "Setup token rejected");
                None
            }
        })
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid setup token")))?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Verified setup claims for the current request.
pub struct SetupContext(pub SetupClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for SetupContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<SetupClaims>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Setup claims missing from request extensions"
            ))
        })?;

        Ok(SetupContext(claims.clone()))
    }
}
