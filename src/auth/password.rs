use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

/// Longest plaintext accepted by [`hash_password`] and [`verify_password`].
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MIN_PASSWORD_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password exceeds 72 bytes")]
    TooLong,
    #[error("password hash error: {0}")]
    Hash(String),
}

/// Reasons a candidate password is refused at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("password contains characters outside printable ASCII")]
    NonAscii,
    #[error("password must be at least 16 characters long")]
    TooShort,
    #[error(
        "password must contain a lowercase letter, an uppercase letter, a digit and a special character"
    )]
    MissingClass,
}

pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    if plain.len() > MAX_PASSWORD_BYTES {
        return Err(PasswordError::TooLong);
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            PasswordError::Hash(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, PasswordError> {
    if plain.len() > MAX_PASSWORD_BYTES {
        return Err(PasswordError::TooLong);
    }
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        PasswordError::Hash(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Runs argon2 work on the blocking pool so it never stalls the async
/// workers.
pub(crate) async fn off_thread<T, F>(work: F) -> Result<T, PasswordError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!(error = %e, "password task failed");
        PasswordError::Hash(e.to_string())
    })?
}

/// Registration gate: printable ASCII only, at least 16 characters, and at
/// least one of each of lowercase, uppercase, digit and symbol.
pub fn check_policy(password: &str) -> Result<(), PolicyError> {
    let (mut lower, mut upper, mut digit, mut special) = (false, false, false, false);
    for c in password.chars() {
        match c {
            'a'..='z' => lower = true,
            'A'..='Z' => upper = true,
            '0'..='9' => digit = true,
            ' '..='~' => special = true,
            _ => return Err(PolicyError::NonAscii),
        }
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(PolicyError::TooShort);
    }
    if !(lower && upper && digit && special) {
        return Err(PolicyError::MissingClass);
    }
    Ok(())
}
