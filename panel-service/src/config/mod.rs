use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreBackend,
    pub mongodb: MongoConfig,
    pub jwt: JwtConfig,
    pub provisioning: ProvisioningConfig,
    pub password: PasswordConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub setup_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Shared key expected in `X-API-Key` on request-code. Empty disables the endpoint.
    pub api_key: String,
    pub code_ttl_minutes: i64,
}

/// Argon2id cost parameters for new hashes; existing hashes carry their own.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub setup_attempts: u32,
    pub setup_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
    /// Key limits on `x-forwarded-for` instead of the socket peer.
    pub trust_forwarded_for: bool,
}

/// Accounts and demo content written by the `seed` subcommand.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    pub superadmin_email: String,
    pub superadmin_password: String,
    pub demo_email: String,
    pub demo_password: String,
    pub demo_site_slug: String,
}

impl PanelConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = PanelConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("panel-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.trim().is_empty()),
            store: get_env_parsed("STORE_BACKEND", Some("mongo"), is_prod)?,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("panel"), is_prod)?,
            },
            jwt: JwtConfig {
                access_secret: get_env("JWT_ACCESS_SECRET", Some("dev-access-secret"), is_prod)?,
                refresh_secret: get_env(
                    "JWT_REFRESH_SECRET",
                    Some("dev-refresh-secret"),
                    is_prod,
                )?,
                access_token_expiry_minutes: get_env_parsed(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: get_env_parsed(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("30"),
                    is_prod,
                )?,
                setup_token_expiry_minutes: get_env_parsed(
                    "SETUP_TOKEN_TTL_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
            },
            provisioning: ProvisioningConfig {
                api_key: get_env("PROVISION_API_KEY", Some(""), is_prod)?,
                code_ttl_minutes: get_env_parsed("PROVISION_CODE_TTL_MINUTES", Some("15"), is_prod)?,
            },
            password: PasswordConfig {
                memory_kib: get_env_parsed("ARGON2_MEMORY_KIB", Some("19456"), is_prod)?,
                iterations: get_env_parsed("ARGON2_ITERATIONS", Some("2"), is_prod)?,
                parallelism: get_env_parsed("ARGON2_PARALLELISM", Some("1"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: get_env_parsed("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                login_window_seconds: get_env_parsed(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                register_attempts: get_env_parsed(
                    "RATE_LIMIT_REGISTER_ATTEMPTS",
                    Some("3"),
                    is_prod,
                )?,
                register_window_seconds: get_env_parsed(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?,
                setup_attempts: get_env_parsed("RATE_LIMIT_SETUP_ATTEMPTS", Some("10"), is_prod)?,
                setup_window_seconds: get_env_parsed(
                    "RATE_LIMIT_SETUP_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                global_ip_limit: get_env_parsed("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                global_ip_window_seconds: get_env_parsed(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
                trust_forwarded_for: get_env_parsed(
                    "RATE_LIMIT_TRUST_FORWARDED_FOR",
                    Some("false"),
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.jwt.setup_token_expiry_minutes <= 0 || self.provisioning.code_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SETUP_TOKEN_TTL_MINUTES and PROVISION_CODE_TTL_MINUTES must be positive"
            )));
        }

        if self.jwt.access_secret.is_empty() || self.jwt.refresh_secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT secrets must not be empty"
            )));
        }

        // A refresh token must never verify as an access token
        if self.jwt.access_secret == self.jwt.refresh_secret {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.jwt.access_secret.len() < 32 || self.jwt.refresh_secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT secrets must be at least 32 bytes in production"
                )));
            }

            if self.store == StoreBackend::Memory {
                tracing::error!("In-memory store configured in production - data will not survive a restart");
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::warn!("Swagger is publicly accessible in production");
            }
        }

        if self.provisioning.api_key.is_empty() {
            tracing::warn!("PROVISION_API_KEY is not set - request-code will reject every call");
        }

        Ok(())
    }
}

impl SeedConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // Seeding is an operator action, so defaults apply only outside production
        let is_prod = env::var("ENVIRONMENT")
            .map(|e| e.eq_ignore_ascii_case("prod"))
            .unwrap_or(false);

        Ok(SeedConfig {
            superadmin_email: get_env("SUPERADMIN_EMAIL", Some("admin@example.com"), is_prod)?,
            superadmin_password: get_env("SUPERADMIN_PASSWORD", Some("admin12345"), is_prod)?,
            demo_email: get_env("DEMO_EMAIL", Some("demo@example.com"), is_prod)?,
            demo_password: get_env("DEMO_PASSWORD", Some("demo12345"), is_prod)?,
            demo_site_slug: get_env("DEMO_SITE_SLUG", Some("demo-site"), is_prod)?,
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_env_parsed<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

impl FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" | "true" => Ok(SwaggerMode::Public),
            "disabled" | "false" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PanelConfig {
        PanelConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "panel-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            store: StoreBackend::Memory,
            mongodb: MongoConfig {
                uri: "mongodb://localhost:27017".to_string(),
                database: "panel_test".to_string(),
            },
            jwt: JwtConfig {
                access_secret: "a".repeat(32),
                refresh_secret: "r".repeat(32),
                access_token_expiry_minutes: 15,
                refresh_token_expiry_days: 30,
                setup_token_expiry_minutes: 15,
            },
            provisioning: ProvisioningConfig {
                api_key: "key".to_string(),
                code_ttl_minutes: 15,
            },
            password: PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            swagger: SwaggerConfig {
                enabled: SwaggerMode::Disabled,
            },
            rate_limit: RateLimitConfig {
                login_attempts: 5,
                login_window_seconds: 900,
                register_attempts: 3,
                register_window_seconds: 3600,
                setup_attempts: 10,
                setup_window_seconds: 900,
                global_ip_limit: 100,
                global_ip_window_seconds: 60,
                trust_forwarded_for: false,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_shared_jwt_secret_is_rejected() {
        let mut cfg = config();
        cfg.jwt.refresh_secret = cfg.jwt.access_secret.clone();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_prod_rejects_wildcard_origin_and_short_secrets() {
        let mut cfg = config();
        cfg.environment = Environment::Prod;
        cfg.security.allowed_origins = vec!["*".to_string()];
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.environment = Environment::Prod;
        cfg.jwt.access_secret = "short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_non_positive_ttl_is_rejected() {
        let mut cfg = config();
        cfg.provisioning.code_ttl_minutes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("MongoDB".parse::<StoreBackend>(), Ok(StoreBackend::Mongo));
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert!("postgres".parse::<StoreBackend>().is_err());
        assert_eq!("false".parse::<SwaggerMode>(), Ok(SwaggerMode::Disabled));
    }
}
