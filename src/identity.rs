//! Identity Store: account registration, credential checks and role changes.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use validator::Validate;

use crate::{
    auth::Actor,
    error::{AppError, AuthFailure, Result},
    gate::{self, Operation},
    models::{RegisterRequest, Role, User},
    repository::{NewUser, Repository},
};

/// Hashes a password with Argon2id and a fresh per-record salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

/// Checks a password against a stored PHC string. The comparison happens inside
/// the argon2 verifier, in constant time.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| AppError::PasswordHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::PasswordHash(e.to_string())),
    }
}

/// register
///
/// Validates the form, hashes the password and persists the account. Email
/// uniqueness is left to the store so concurrent sign-ups cannot both win.
pub async fn register(repo: &dyn Repository, req: RegisterRequest) -> Result<User> {
    req.validate()?;

    let password_hash = hash_password(&req.password)?;
    let user = repo
        .create_user(NewUser {
            email: req.email,
            name: req.name,
            password_hash,
        })
        .await?;

    tracing::info!(user_id = user.id, role = user.role.as_str(), "account registered");
    Ok(user)
}

/// authenticate
///
/// Returns the account matching both email and password. An unknown email and a
/// wrong password fail with different [`AuthFailure`] variants.
pub async fn authenticate(repo: &dyn Repository, email: &str, password: &str) -> Result<User> {
    let creds = repo
        .get_user_credentials(email)
        .await?
        .ok_or(AuthFailure::UnknownEmail)?;

    if !verify_password(password, &creds.password_hash)? {
        return Err(AuthFailure::BadPassword.into());
    }
    Ok(creds.user)
}

/// promote
///
/// Changes an account's role. Administrators only. The store refuses to demote
/// the last administrator, self-demotion included.
pub async fn promote(repo: &dyn Repository, actor: &Actor, user_id: i64, role: Role) -> Result<User> {
    gate::authorize(actor, Operation::ManageRoles).into_result()?;

    let user = repo
        .set_user_role(user_id, role)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(user_id, role = role.as_str(), "role changed");
    Ok(user)
}
