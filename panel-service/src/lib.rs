pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Json, Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Environment, PanelConfig, SwaggerMode};
use crate::middleware::api_key::PROVISION_API_KEY_HEADER;
use crate::services::{
    AdminService, AuthService, Clock, PermissionResolver, ProvisioningService, SiteService, Store,
    TokenService,
};
use crate::utils::PasswordHasher;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::register,
        handlers::auth::refresh,
        handlers::auth::me,
        handlers::provision::request_code,
        handlers::provision::setup_login,
        handlers::provision::setup_register,
        handlers::sites::list_sites,
        handlers::sites::create_site,
        handlers::sites::get_site,
        handlers::sites::update_site_content,
        handlers::sites::publish_site,
        handlers::sites::unpublish_site,
        handlers::sites::public_site,
        handlers::admin::list_users,
        handlers::admin::create_user,
        handlers::admin::grant_site_access,
        handlers::admin::list_site_users,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::LoginRequest,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::RefreshRequest,
            dtos::auth::SiteSummary,
            dtos::provision::RequestCodeRequest,
            dtos::provision::RequestCodeResponse,
            dtos::provision::SetupLoginRequest,
            dtos::provision::SetupLoginResponse,
            dtos::provision::SetupRegisterRequest,
            dtos::provision::SetupRegisterResponse,
            dtos::sites::CreateSiteRequest,
            dtos::sites::UpdateContentRequest,
            dtos::admin::CreateUserRequest,
            dtos::admin::GrantAccessRequest,
            dtos::admin::GrantResponse,
            dtos::admin::SiteMemberResponse,
            services::TokenResponse,
            models::Role,
            models::SiteRole,
            models::SiteStatus,
            models::UserResponse,
            models::SiteResponse,
            models::PublicSiteResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Password sessions and self-service sign up"),
        (name = "Provisioning", description = "Invite-code tenant onboarding"),
        (name = "Sites", description = "Site content and publication"),
        (name = "Admin", description = "User and site access management"),
        (name = "Public", description = "Published site content"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "provision_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    PROVISION_API_KEY_HEADER,
                ))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PanelConfig>,
    pub store: Arc<dyn Store>,
    pub tokens: TokenService,
    pub auth_service: AuthService,
    pub provisioning_service: ProvisioningService,
    pub site_service: SiteService,
    pub admin_service: AdminService,
    pub login_rate_limiter: IpRateLimit,
    pub register_rate_limiter: IpRateLimit,
    pub setup_rate_limiter: IpRateLimit,
    pub ip_rate_limiter: IpRateLimit,
}

impl AppState {
    /// Wires every service over one store and one clock.
    pub fn new(
        config: PanelConfig,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(
            config.password.memory_kib,
            config.password.iterations,
            config.password.parallelism,
        )
        .map_err(AppError::ConfigError)?;
        let tokens = TokenService::new(&config.jwt, clock.clone());

        let auth_service =
            AuthService::new(store.clone(), tokens.clone(), hasher.clone(), clock.clone());
        let provisioning_service = ProvisioningService::new(
            store.clone(),
            tokens.clone(),
            hasher.clone(),
            clock.clone(),
            config.provisioning.code_ttl_minutes,
        );
        let site_service = SiteService::new(
            store.clone(),
            PermissionResolver::new(store.clone()),
            clock.clone(),
        );
        let admin_service = AdminService::new(store.clone(), hasher, clock);

        let limits = &config.rate_limit;
        let trust = limits.trust_forwarded_for;
        let login_rate_limiter =
            IpRateLimit::new(limits.login_attempts, limits.login_window_seconds, trust);
        let register_rate_limiter =
            IpRateLimit::new(limits.register_attempts, limits.register_window_seconds, trust);
        let setup_rate_limiter =
            IpRateLimit::new(limits.setup_attempts, limits.setup_window_seconds, trust);
        let ip_rate_limiter = IpRateLimit::new(
            limits.global_ip_limit,
            limits.global_ip_window_seconds,
            trust,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            tokens,
            auth_service,
            provisioning_service,
            site_service,
            admin_service,
            login_rate_limiter,
            register_rate_limiter,
            setup_rate_limiter,
            ip_rate_limiter,
        })
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Rate-limited unauthenticated routes; refresh shares the login budget
    let login_route = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    // Setup-login and request-code draw from one per-IP budget
    let setup_login_route = Router::new()
        .route("/api/auth/setup-login", post(handlers::provision::setup_login))
        .layer(from_fn_with_state(
            state.setup_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let request_code_route = Router::new()
        .route(
            "/api/provision/request-code",
            post(handlers::provision::request_code),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::provision_api_key_middleware,
        ))
        .layer(from_fn_with_state(
            state.setup_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let setup_register_route = Router::new()
        .route(
            "/api/auth/setup-register",
            post(handlers::provision::setup_register),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::setup_token_middleware,
        ));

    // Layers run bottom-up: authenticate first, then check the capability
    let admin_routes = Router::new()
        .route(
            "/api/admin/users",
            get(handlers::admin::list_users).post(handlers::admin::create_user),
        )
        .route(
            "/api/admin/sites/:id/access",
            post(handlers::admin::grant_site_access),
        )
        .route(
            "/api/admin/sites/:id/users",
            get(handlers::admin::list_site_users),
        )
        .layer(from_fn(middleware::require_manage_users))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        .route(
            "/api/sites",
            get(handlers::sites::list_sites).post(handlers::sites::create_site),
        )
        .route("/api/sites/:id", get(handlers::sites::get_site))
        .route(
            "/api/sites/:id/content",
            put(handlers::sites::update_site_content),
        )
        .route(
            "/api/sites/:id/publish",
            post(handlers::sites::publish_site),
        )
        .route(
            "/api/sites/:id/unpublish",
            post(handlers::sites::unpublish_site),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        Environment::Dev => true,
        Environment::Prod => state.config.swagger.enabled == SwaggerMode::Public,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .route("/s/:slug", get(handlers::sites::public_site))
        .merge(login_route)
        .merge(register_route)
        .merge(setup_login_route)
        .merge(request_code_route)
        .merge(setup_register_route)
        .merge(admin_routes)
        .merge(protected_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config));

    Ok(app)
}

fn cors_layer(config: &PanelConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(PROVISION_API_KEY_HEADER),
        ]);

    // Production config refuses "*"; a list may not mix it with real origins
    if config.security.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}
