use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, warn};

use super::password::{
    check_policy, hash_password, off_thread, verify_password, PasswordError, PolicyError,
};
use super::repo::UserStore;
use super::repo_types::User;
use crate::db::StoreError;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").unwrap();
    // Verified against when the username is unknown so both failure paths
    // take the same time.
    static ref DUMMY_HASH: Option<String> = hash_password("Dummy-Passw0rd-For-Timing!").ok();
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed")]
    Failed,
    #[error(transparent)]
    Store(StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("invalid username")]
    InvalidUsername,
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("user already exists")]
    Taken,
    #[error(transparent)]
    Hash(#[from] PasswordError),
    #[error(transparent)]
    Store(StoreError),
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// Checks `password` for the user named exactly `username`. Unknown users
/// and wrong passwords both yield `AuthError::Failed`.
pub async fn authenticate(
    users: &dyn UserStore,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    let user = match users.find_by_username(username).await {
        Ok(u) => Some(u),
        Err(StoreError::NotFound) => None,
        Err(e) => {
            error!(error = %e, "find_by_username failed");
            return Err(AuthError::Store(e));
        }
    };

    let plain = password.to_owned();
    let Some(user) = user else {
        let _ = off_thread(move || match DUMMY_HASH.as_deref() {
            Some(dummy) => verify_password(&plain, dummy),
            None => Ok(false),
        })
        .await;
        warn!(%username, "login unknown username");
        return Err(AuthError::Failed);
    };

    let stored = user.password_hash.clone();
    match off_thread(move || verify_password(&plain, &stored)).await {
        Ok(true) => Ok(user),
        Ok(false) => {
            warn!(user_id = user.id, "login invalid password");
            Err(AuthError::Failed)
        }
        Err(e) => {
            warn!(user_id = user.id, error = %e, "password verification failed");
            Err(AuthError::Failed)
        }
    }
}

/// Validates and stores a new user. The store's unique constraint decides
/// whether the username is free.
pub async fn register(
    users: &dyn UserStore,
    username: &str,
    password: &str,
) -> Result<User, RegisterError> {
    if !is_valid_username(username) {
        return Err(RegisterError::InvalidUsername);
    }
    check_policy(password)?;
    let plain = password.to_owned();
    let hash = off_thread(move || hash_password(&plain)).await?;

    users.create(username, &hash).await.map_err(|e| match e {
        StoreError::Conflict(_) => RegisterError::Taken,
        other => RegisterError::Store(other),
    })
}
