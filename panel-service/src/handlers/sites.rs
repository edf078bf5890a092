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
    dtos::sites::{CreateSiteRequest, UpdateContentRequest},
    middleware::AuthUser,
    models::{PublicSiteResponse, SiteResponse},
    utils::ValidatedJson,
    AppState,
};

/// Sites the caller can read
#[utoipa::path(
    get,
    path = "/api/sites",
    responses(
        (status = 200, description = "Visible sites", body = [SiteResponse]),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "Sites",
    security(("bearer_auth" = []))
)]
pub async fn list_sites(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let sites = state.site_service.list(&principal).await?;
    Ok(Json(
        sites.into_iter().map(SiteResponse::from).collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/sites",
    request_body = CreateSiteRequest,
    responses(
        (status = 201, description = "Site created", body = SiteResponse),
        (status = 400, description = "Invalid slug or content", body = ErrorResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 409, description = "Site slug already exists", body = ErrorResponse)
    ),
    tag = "Sites",
    security(("bearer_auth" = []))
)]
pub async fn create_site(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateSiteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let site = state
        .site_service
        .create(&principal, &req.name, &req.slug, req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(SiteResponse::from(site))))
}

#[utoipa::path(
    get,
    path = "/api/sites/{id}",
    params(("id" = String, Path, description = "Site id")),
    responses(
        (status = 200, description = "Site", body = SiteResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 404, description = "Site not found", body = ErrorResponse)
    ),
    tag = "Sites",
    security(("bearer_auth" = []))
)]
pub async fn get_site(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(site_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let site = state.site_service.get(&principal, &site_id).await?;
    Ok(Json(SiteResponse::from(site)))
}

/// Replace the site's content document
#[utoipa::path(
    put,
    path = "/api/sites/{id}/content",
    params(("id" = String, Path, description = "Site id")),
    request_body = UpdateContentRequest,
    responses(
        (status = 200, description = "Content replaced", body = SiteResponse),
        (status = 400, description = "Content is not a JSON object", body = ErrorResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 404, description = "Site not found", body = ErrorResponse)
    ),
    tag = "Sites",
    security(("bearer_auth" = []))
)]
pub async fn update_site_content(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(site_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateContentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let site = state
        .site_service
        .update_content(&principal, &site_id, req.content)
        .await?;
    Ok(Json(SiteResponse::from(site)))
}

#[utoipa::path(
    post,
    path = "/api/sites/{id}/publish",
    params(("id" = String, Path, description = "Site id")),
    responses(
        (status = 200, description = "Site published", body = SiteResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 404, description = "Site not found", body = ErrorResponse)
    ),
    tag = "Sites",
    security(("bearer_auth" = []))
)]
pub async fn publish_site(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(site_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let site = state.site_service.publish(&principal, &site_id).await?;
    Ok(Json(SiteResponse::from(site)))
}

#[utoipa::path(
    post,
    path = "/api/sites/{id}/unpublish",
    params(("id" = String, Path, description = "Site id")),
    responses(
        (status = 200, description = "Site back to draft", body = SiteResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 404, description = "Site not found", body = ErrorResponse)
    ),
    tag = "Sites",
    security(("bearer_auth" = []))
)]
pub async fn unpublish_site(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(site_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let site = state.site_service.unpublish(&principal, &site_id).await?;
    Ok(Json(SiteResponse::from(site)))
}

/// Published site content for anonymous visitors
#[utoipa::path(
    get,
    path = "/s/{slug}",
    params(("slug" = String, Path, description = "Site slug")),
    responses(
        (status = 200, description = "Published site", body = PublicSiteResponse),
        (status = 404, description = "No published site with this slug", body = ErrorResponse)
    ),
    tag = "Public"
)]
pub async fn public_site(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let site = state.site_service.public_by_slug(&slug).await?;
    Ok(Json(PublicSiteResponse::from(site)))
}
