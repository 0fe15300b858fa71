//! Password hashing via Argon2id.
//!
//! The PHC string embeds algorithm, version, cost parameters and salt, so
//! stored hashes survive future cost changes. The final digest comparison is
//! constant-time inside the `password-hash` machinery.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use super::AuthError;

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("password hash: {e}")))
}

/// Verify a password against a stored PHC-encoded hash.
///
/// A malformed stored hash is an error; callers must fold it into their
/// generic credential failure rather than surface a distinct condition.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, AuthError> {
    let parsed =
        PasswordHash::new(encoded).map_err(|e| AuthError::Internal(format!("stored hash: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(format!("password verify: {e}"))),
    }
}
