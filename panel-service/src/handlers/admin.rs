use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};

use crate::{
    dtos::admin::{CreateUserRequest, GrantAccessRequest, GrantResponse, SiteMemberResponse},
    models::{Role, SiteRole, UserResponse},
    utils::{Password, ValidatedJson},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let users = state.admin_service.list_users().await?;
    Ok(Json(
        users.iter().map(UserResponse::from).collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid role", body = ErrorResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = match req.role.as_deref().map(str::trim) {
        None | Some("") => Role::User,
        Some(value) => value
            .to_lowercase()
            .parse::<Role>()
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?,
    };

    let user = state
        .admin_service
        .create_user(
            &req.email,
            &Password::new(req.password),
            req.name.as_deref(),
            role,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Grant a user a role on a site, replacing any previous grant
#[utoipa::path(
    post,
    path = "/api/admin/sites/{id}/access",
    params(("id" = String, Path, description = "Site id")),
    request_body = GrantAccessRequest,
    responses(
        (status = 200, description = "Access granted", body = GrantResponse),
        (status = 400, description = "Invalid role", body = ErrorResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 404, description = "Site or user not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn grant_site_access(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    ValidatedJson(req): ValidatedJson<GrantAccessRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role: SiteRole = req
        .role
        .parse()
        .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let grant = state
        .admin_service
        .grant_site_access(&site_id, &req.email, role, req.create_if_missing)
        .await?;
    Ok(Json(GrantResponse::from(grant)))
}

#[utoipa::path(
    get,
    path = "/api/admin/sites/{id}/users",
    params(("id" = String, Path, description = "Site id")),
    responses(
        (status = 200, description = "Users with a grant on the site", body = [SiteMemberResponse]),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 404, description = "Site not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn list_site_users(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let members = state.admin_service.list_site_users(&site_id).await?;
    Ok(Json(
        members
            .into_iter()
            .map(SiteMemberResponse::from)
            .collect::<Vec<_>>(),
    ))
}
