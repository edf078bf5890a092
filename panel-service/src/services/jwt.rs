use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::clock::Clock;
use crate::config::JwtConfig;
use crate::models::{Principal, Role, User};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed claims")]
    MalformedClaims,
}

/// Distinguishes tokens that share a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Setup,
}

/// Claims for access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub typ: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// JWT ID, unique per token so rotated pairs never collide
    pub jti: String,
}

/// Claims for the short-lived token that authorizes one setup-register call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupClaims {
    pub setup: bool,
    pub provision_id: String,
    pub site_slug: String,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

trait TypedClaims {
    fn kind(&self) -> TokenKind;
    fn expires(&self) -> i64;
}

impl TypedClaims for SessionClaims {
    fn kind(&self) -> TokenKind {
        self.typ
    }

    fn expires(&self) -> i64 {
        self.exp
    }
}

impl TypedClaims for SetupClaims {
    fn kind(&self) -> TokenKind {
        self.typ
    }

    fn expires(&self) -> i64 {
        self.exp
    }
}

impl From<SessionClaims> for Principal {
    fn from(claims: SessionClaims) -> Self {
        Principal {
            user_id: claims.sub,
            role: claims.role,
            organization_id: claims.org_id,
            site_id: claims.site_id,
            tenant_id: claims.tenant_id,
        }
    }
}

/// Token response returned to client
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies HS256 tokens.
///
/// Access and setup tokens are signed with the access secret and told apart
/// by `typ`; refresh tokens use their own secret. Expiry is judged against
/// the injected clock.
#[derive(Clone)]
pub struct TokenService {
    access_keys: KeyPair,
    refresh_keys: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    setup_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        tracing::info!("Token service initialized with HS256 keys");

        Self {
            access_keys: KeyPair::from_secret(&config.access_secret),
            refresh_keys: KeyPair::from_secret(&config.refresh_secret),
            access_ttl: Duration::minutes(config.access_token_expiry_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expiry_days),
            setup_ttl: Duration::minutes(config.setup_token_expiry_minutes),
            clock,
        }
    }

    fn sign<T: Serialize>(&self, claims: &T, keys: &KeyPair) -> Result<String, anyhow::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &keys.encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }

    fn verify<T>(&self, token: &str, keys: &KeyPair, expected: TokenKind) -> Result<T, TokenError>
    where
        T: DeserializeOwned + TypedClaims,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against our clock
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<T>(token, &keys.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::MalformedClaims,
            })?
            .claims;

        if claims.kind() != expected {
            return Err(TokenError::MalformedClaims);
        }
        if self.clock.now().timestamp() >= claims.expires() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn session_claims(&self, user: &User, typ: TokenKind, ttl: Duration) -> SessionClaims {
        let now = self.clock.now();
        SessionClaims {
            sub: user.id.clone(),
            role: user.role,
            org_id: user.organization_id.clone(),
            site_id: user.site_id.clone(),
            tenant_id: user.tenant_id.clone(),
            typ,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Generate both access and refresh tokens for a user
    pub fn issue_session_pair(&self, user: &User) -> Result<TokenResponse, anyhow::Error> {
        let access = self.session_claims(user, TokenKind::Access, self.access_ttl);
        let refresh = self.session_claims(user, TokenKind::Refresh, self.refresh_ttl);

        Ok(TokenResponse {
            access_token: self.sign(&access, &self.access_keys)?,
            refresh_token: self.sign(&refresh, &self.refresh_keys)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify(token, &self.access_keys, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify(token, &self.refresh_keys, TokenKind::Refresh)
    }

    /// Token bound to one provision record. Returns the token and its expiry.
    pub fn issue_setup_token(
        &self,
        provision_id: &str,
        site_slug: &str,
    ) -> Result<(String, DateTime<Utc>), anyhow::Error> {
        let now = self.clock.now();
        let exp = now + self.setup_ttl;
        let claims = SetupClaims {
            setup: true,
            provision_id: provision_id.to_string(),
            site_slug: site_slug.to_string(),
            typ: TokenKind::Setup,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = self.sign(&claims, &self.access_keys)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(exp);
        Ok((token, expires_at))
    }

    pub fn verify_setup(&self, token: &str) -> Result<SetupClaims, TokenError> {
        let claims: SetupClaims = self.verify(token, &self.access_keys, TokenKind::Setup)?;
        if !claims.setup || claims.provision_id.is_empty() {
            return Err(TokenError::MalformedClaims);
        }
        Ok(claims)
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;

    fn config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret-for-tests-0123456789".to_string(),
            refresh_secret: "refresh-secret-for-tests-0123456789".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 30,
            setup_token_expiry_minutes: 15,
        }
    }

    fn service() -> (TokenService, ManualClock) {
        let clock = ManualClock::default();
        (TokenService::new(&config(), Arc::new(clock.clone())), clock)
    }

    fn admin() -> User {
        User::new("admin@acme.test", "hash".into(), None, Role::TenantAdmin, Utc::now())
            .scoped_to("org-1", "site-1", "tenant-1")
    }

    #[test]
    fn test_session_pair_round_trip() -> Result<(), anyhow::Error> {
        let (tokens, _) = service();
        let user = admin();

        let pair = tokens.issue_session_pair(&user)?;
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);

        let access = tokens.verify_access(&pair.access_token)?;
        assert_eq!(access.sub, user.id);
        assert_eq!(access.role, Role::TenantAdmin);
        assert_eq!(access.org_id.as_deref(), Some("org-1"));
        assert_eq!(access.tenant_id.as_deref(), Some("tenant-1"));

        let refresh = tokens.verify_refresh(&pair.refresh_token)?;
        assert_eq!(refresh.sub, user.id);
        assert_ne!(refresh.jti, access.jti);

        Ok(())
    }

    #[test]
    fn test_access_token_expires_with_clock() -> Result<(), anyhow::Error> {
        let (tokens, clock) = service();
        let pair = tokens.issue_session_pair(&admin())?;

        clock.advance(Duration::minutes(14));
        assert!(tokens.verify_access(&pair.access_token).is_ok());

        clock.advance(Duration::minutes(1));
        assert_eq!(
            tokens.verify_access(&pair.access_token).unwrap_err(),
            TokenError::Expired
        );
        // Refresh lives for days
        assert!(tokens.verify_refresh(&pair.refresh_token).is_ok());

        Ok(())
    }

    #[test]
    fn test_tokens_are_not_interchangeable() -> Result<(), anyhow::Error> {
        let (tokens, _) = service();
        let pair = tokens.issue_session_pair(&admin())?;
        let (setup, _) = tokens.issue_setup_token("prov-1", "acme")?;

        assert_eq!(
            tokens.verify_access(&pair.refresh_token).unwrap_err(),
            TokenError::InvalidSignature
        );
        assert_eq!(
            tokens.verify_refresh(&pair.access_token).unwrap_err(),
            TokenError::InvalidSignature
        );
        assert_eq!(
            tokens.verify_access(&setup).unwrap_err(),
            TokenError::MalformedClaims
        );
        assert_eq!(
            tokens.verify_setup(&pair.access_token).unwrap_err(),
            TokenError::MalformedClaims
        );

        Ok(())
    }

    #[test]
    fn test_setup_token_round_trip_and_expiry() -> Result<(), anyhow::Error> {
        let (tokens, clock) = service();
        let issued_at = clock.now();

        let (token, expires_at) = tokens.issue_setup_token("prov-1", "acme")?;
        assert_eq!(expires_at.timestamp(), (issued_at + Duration::minutes(15)).timestamp());

        let claims = tokens.verify_setup(&token)?;
        assert!(claims.setup);
        assert_eq!(claims.provision_id, "prov-1");
        assert_eq!(claims.site_slug, "acme");

        clock.advance(Duration::minutes(16));
        assert_eq!(tokens.verify_setup(&token).unwrap_err(), TokenError::Expired);

        Ok(())
    }

    #[test]
    fn test_foreign_secret_and_garbage_are_rejected() -> Result<(), anyhow::Error> {
        let (tokens, _) = service();
        let mut other_config = config();
        other_config.access_secret = "some-other-access-secret-000000000".to_string();
        let other = TokenService::new(&other_config, Arc::new(ManualClock::default()));

        let pair = other.issue_session_pair(&admin())?;
        assert_eq!(
            tokens.verify_access(&pair.access_token).unwrap_err(),
            TokenError::InvalidSignature
        );
        assert_eq!(
            tokens.verify_access("not.a.jwt").unwrap_err(),
            TokenError::MalformedClaims
        );

        Ok(())
    }
}
