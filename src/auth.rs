use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, Result},
    models::User,
    repository::{Repository, RepositoryState},
};

/// Claims
///
/// Payload of a session token. The token is only a signed pointer: the session
/// row named by `sid` must still exist for it to resolve.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): id of the user the session was started for.
    pub sub: i64,
    /// Session id, primary key of the `sessions` row.
    pub sid: Uuid,
    /// Expiration Time (exp).
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// Actor
///
/// The identity bound to the current request. Resolution never fails on a bad or
/// missing token; it degrades to `Anonymous`.
#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    Anonymous,
    Authenticated(User),
}

impl Actor {
    pub fn user(&self) -> Option<&User> {
        match self {
            Actor::Authenticated(user) => Some(user),
            Actor::Anonymous => None,
        }
    }
}

/// AuthUser
///
/// Extractor for routes that make no sense without a session; rejects with 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// start_session
///
/// Records a new session for `user` and returns the signed token the client
/// presents as `Authorization: Bearer <token>`.
pub async fn start_session(repo: &dyn Repository, config: &AppConfig, user: &User) -> Result<String> {
    let now = Utc::now();
    let expires = Duration::try_hours(config.session_ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            AppError::Config(format!(
                "session lifetime of {} hours is out of range",
                config.session_ttl_hours
            ))
        })?;

    let session_id = Uuid::new_v4();
    let claims = Claims {
        sub: user.id,
        sid: session_id,
        iat: now.timestamp() as usize,
        exp: expires.timestamp() as usize,
    };

    let key = EncodingKey::from_secret(config.session_secret.as_bytes());
    let token = encode(&Header::default(), &claims, &key)?;

    // Only a token that could be issued gets a session row.
    repo.create_session(session_id, user.id).await?;

    tracing::debug!(user_id = user.id, %session_id, "session started");
    Ok(token)
}

/// resolve_session
///
/// Maps a token to its actor. Bad signatures, expired tokens, ended sessions and
/// deleted users all resolve to `Actor::Anonymous`; only store failures error.
pub async fn resolve_session(repo: &dyn Repository, config: &AppConfig, token: &str) -> Result<Actor> {
    let Some(claims) = decode_claims(config, token, true) else {
        return Ok(Actor::Anonymous);
    };

    match repo.get_session_user(claims.sid).await? {
        Some(user) if user.id == claims.sub => Ok(Actor::Authenticated(user)),
        _ => Ok(Actor::Anonymous),
    }
}

/// end_session
///
/// Invalidates the session behind `token`. Expired tokens still end their
/// session; unknown or malformed tokens are a no-op.
pub async fn end_session(repo: &dyn Repository, config: &AppConfig, token: &str) -> Result<()> {
    if let Some(claims) = decode_claims(config, token, false) {
        repo.delete_session(claims.sid).await?;
        tracing::debug!(user_id = claims.sub, session_id = %claims.sid, "session ended");
    }
    Ok(())
}

fn decode_claims(config: &AppConfig, token: &str, check_expiry: bool) -> Option<Claims> {
    let key = DecodingKey::from_secret(config.session_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = check_expiry;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .ok()
}

/// Pulls the token out of an `Authorization: Bearer ...` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Actor Extractor Implementation
///
/// Every handler that needs to know who is calling takes an `Actor` argument;
/// there is no ambient "current user".
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Actor::Anonymous);
        };

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        resolve_session(repo.as_ref(), &config, token).await
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        match Actor::from_request_parts(parts, state).await? {
            Actor::Authenticated(user) => Ok(AuthUser(user)),
            Actor::Anonymous => Err(AppError::Unauthorized),
        }
    }
}
