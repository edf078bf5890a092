use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use std::fmt;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id hasher with configurable cost.
///
/// New hashes use the configured parameters; verification reads the
/// parameters embedded in the stored hash, so raising the cost later keeps
/// old hashes valid.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, anyhow::Error> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {}", e))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password. Salt is generated and embedded in the PHC string.
    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    /// Returns Ok(()) if the password matches, Err otherwise.
    pub fn verify(
        &self,
        password: &Password,
        password_hash: &PasswordHashString,
    ) -> Result<(), anyhow::Error> {
        let parsed_hash = PasswordHash::new(password_hash.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

        self.argon2()
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
            .map_err(|_| anyhow::anyhow!("Password verification failed"))
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(1024, 1, 1).expect("valid params")
    }

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hasher().hash(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(hash.as_str().contains("m=1024,t=1,p=1"));
    }

    #[test]
    fn test_verify_password_correct_and_incorrect() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hasher().hash(&password).expect("Failed to hash password");

        assert!(hasher().verify(&password, &hash).is_ok());

        let wrong_password = Password::new("wrongPassword".to_string());
        assert!(hasher().verify(&wrong_password, &hash).is_err());
    }

    #[test]
    fn test_verify_uses_parameters_from_hash() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hasher().hash(&password).expect("Failed to hash password");

        let stronger = PasswordHasher::new(2048, 2, 1).expect("valid params");
        assert!(stronger.verify(&password, &hash).is_ok());
    }

    #[test]
    fn test_garbage_hash_is_rejected() {
        let password = Password::new("whatever".to_string());
        let hash = PasswordHashString::new("not-a-phc-string".to_string());
        assert!(hasher().verify(&password, &hash).is_err());
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        assert!(PasswordHasher::new(0, 0, 0).is_err());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("hunter22".to_string());
        assert!(!format!("{:?}", password).contains("hunter22"));
    }
}
