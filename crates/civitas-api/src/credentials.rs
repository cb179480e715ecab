use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::{Rng, distr::Alphanumeric};
use rand_core::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("credential hashing failed: {0}")]
pub struct CredentialError(String);

/// Password hashing seam. Implementations never see plaintext beyond the call.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CredentialError>;

    /// False on mismatch and on an unparseable stored hash.
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Argon2id with the crate's default parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CredentialError(e.to_string()))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Random alphanumeric secret, used for generated admin passwords and
/// ephemeral signing keys.
pub fn generate_secret(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
