//! Password and passcode hashing using Argon2id.
//!
//! Admin passwords are always stored as Argon2id PHC strings. Kiosk passcodes
//! may be configured either as a PHC string or, for development setups, as
//! plaintext digits.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

/// Error type for password operations.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Argon2id parameters (OWASP 2024): 19 MiB memory, 2 iterations, 1 lane.
const MEMORY_COST: u32 = 19456;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;
const OUTPUT_LEN: usize = 32;

/// Prefix shared by every Argon2 PHC string.
const PHC_PREFIX: &str = "$argon2";

fn create_argon2() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_COST, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|e| PasswordError::HashError(format!("Failed to create Argon2 params: {}", e)))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password using Argon2id and returns a PHC-formatted string.
///
/// # Example
/// ```
/// use shared::password::hash_password;
///
/// let hash = hash_password("registrar-2024").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = create_argon2()?;

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Verifies a password against a stored PHC hash.
///
/// The parameters are read from the hash itself, so hashes created with older
/// parameters keep verifying.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Returns true when the configured secret is an Argon2 PHC string.
pub fn is_phc_hash(secret: &str) -> bool {
    secret.starts_with(PHC_PREFIX)
}

/// Verifies a kiosk passcode against the configured secret.
///
/// The configured secret is either an Argon2 PHC string or a plaintext
/// passcode. Plaintext comparison runs over every byte regardless of where
/// the first mismatch is.
pub fn verify_passcode(candidate: &str, configured: &str) -> Result<bool, PasswordError> {
    if is_phc_hash(configured) {
        return verify_password(candidate, configured);
    }

    let a = candidate.as_bytes();
    let b = configured.as_bytes();
    if a.len() != b.len() {
        return Ok(false);
    }
    let diff = a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    Ok(diff == 0)
}
