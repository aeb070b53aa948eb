use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{error, warn};

// Argon2id, 19 MiB, 2 passes, 1 lane.
const M_COST_KIB: u32 = 19 * 1024;
const T_COST: u32 = 2;
const P_COST: u32 = 1;

lazy_static! {
    /// Hash checked when no account matches, so unknown identifiers cost a full verify.
    static ref DUMMY_HASH: Option<String> = hash_password("zero-balance-dummy-password").ok();
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

fn hasher() -> Result<Argon2<'static>, CredentialError> {
    let params = Params::new(M_COST_KIB, T_COST, P_COST, None)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes `plain` into a PHC string carrying algorithm, parameters and salt.
pub fn hash_password(plain: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            CredentialError::Hashing(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Returns `false` for a wrong password and for a hash that cannot be parsed.
///
/// Parameters are read from the stored hash, so hashes produced with other
/// Argon2 settings still verify.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "stored password hash is not a valid PHC string");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(plain: String) -> Result<String, CredentialError> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(|e| CredentialError::Hashing(format!("hashing task failed: {e}")))?
}

/// [`verify_password`] on the blocking pool. A panicked task counts as a mismatch.
pub async fn verify_password_blocking(plain: String, hash: String) -> bool {
    match tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await {
        Ok(ok) => ok,
        Err(e) => {
            error!(error = %e, "verify task failed");
            false
        }
    }
}

/// Burns one verification against a fixed hash. Always a mismatch.
pub async fn verify_against_dummy(plain: String) {
    let outcome = tokio::task::spawn_blocking(move || {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            verify_password(&plain, hash);
        }
    })
    .await;
    if let Err(e) = outcome {
        error!(error = %e, "dummy verify task failed");
    }
}
