use service_core::{
    axum::{
        extract::{ConnectInfo, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        Json,
    },
    error::AppError,
    middleware::rate_limit::client_ip,
};
use std::net::SocketAddr;

use crate::{
    dtos::provision::{
        RequestCodeRequest, RequestCodeResponse, SetupLoginRequest, SetupLoginResponse,
        SetupRegisterRequest, SetupRegisterResponse,
    },
    middleware::SetupContext,
    services::SetupRegistration,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Issue a one-time setup code for a new tenant site (operator only)
#[utoipa::path(
    post,
    path = "/api/provision/request-code",
    request_body = RequestCodeRequest,
    responses(
        (status = 201, description = "Code issued; shown only once", body = RequestCodeResponse),
        (status = 400, description = "Invalid site name or slug", body = ErrorResponse),
        (status = 401, description = "Invalid or missing API key", body = ErrorResponse),
        (status = 409, description = "Site slug already exists", body = ErrorResponse)
    ),
    tag = "Provisioning",
    security(("provision_api_key" = []))
)]
pub async fn request_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RequestCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state
        .provisioning_service
        .request_code(&req.site_name, &req.site_slug)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RequestCodeResponse {
            code: issued.code,
            site_slug: issued.site_slug,
            expires_at: issued.expires_at,
        }),
    ))
}

/// Trade a setup code for a short-lived setup token
#[utoipa::path(
    post,
    path = "/api/auth/setup-login",
    request_body = SetupLoginRequest,
    responses(
        (status = 200, description = "Setup token issued", body = SetupLoginResponse),
        (status = 401, description = "Invalid or expired setup code", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "Provisioning"
)]
pub async fn setup_login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SetupLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.provisioning_service.setup_login(&req.code).await?;
    Ok((
        StatusCode::OK,
        Json(SetupLoginResponse {
            setup_token: session.setup_token,
            expires_at: session.expires_at,
        }),
    ))
}

/// Register the first admin and create the tenant's organization and site
#[utoipa::path(
    post,
    path = "/api/auth/setup-register",
    request_body = SetupRegisterRequest,
    responses(
        (status = 201, description = "Tenant provisioned", body = SetupRegisterResponse),
        (status = 401, description = "Invalid setup token or expired code", body = ErrorResponse),
        (status = 409, description = "Code already used, slug or email taken", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Provisioning",
    security(("bearer_auth" = []))
)]
pub async fn setup_register(
    State(state): State<AppState>,
    SetupContext(setup): SetupContext,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<SetupRegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip = client_ip(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.config.rate_limit.trust_forwarded_for,
    )
    .map(|ip| ip.to_string());

    let provisioned = state
        .provisioning_service
        .setup_register(
            &setup,
            SetupRegistration {
                email: req.email,
                password: Password::new(req.password),
                name: req.name,
            },
            ip,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SetupRegisterResponse {
            tokens: provisioned.tokens,
            user_id: provisioned.user_id,
            organization_id: provisioned.organization_id,
            site_id: provisioned.site_id,
            tenant_id: provisioned.tenant_id,
        }),
    ))
}
