//! Session authentication and the credential endpoints.
//!
//! `require_user` and `require_admin` are the single path every protected
//! route goes through, whether reached via the extractors or the router
//! layers. On failure they produce the complete error response and the
//! handler never runs.

use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::crypto::{generate_token, hash_password, Credential};
use crate::db::{
    create_session, create_user, delete_session, find_active_session, find_user_by_email,
    find_user_by_id, find_user_role, session_expiry, update_password_hash, DbPool, LoginRequest,
    LoginResponse, MeResponse, NewUser, Role, SignupRequest, UserResponse,
};
use crate::AppState;

use super::body::{parse_body, LOGIN_BODY_LIMIT, SIGNUP_BODY_LIMIT};
use super::error::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

/// Id of the user behind a valid session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

/// Id of a user whose session is valid and whose role is `admin`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub i64);

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is case-sensitive and separated by exactly one space. Only the
/// shape is checked here, not whether a session exists.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .filter(|token| !token.is_empty())
}

/// Resolve the request's bearer token to the user owning a live session.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, ApiError> {
    let token =
        bearer_token(headers).ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    let session = find_active_session(&state.db, token, Utc::now())
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired session"))?;

    Ok(CurrentUser(session.user_id))
}

/// As [`require_user`], then insist on the `admin` role.
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<AdminUser, ApiError> {
    let CurrentUser(user_id) = require_user(state, headers).await?;
    check_admin(&state.db, user_id).await
}

async fn check_admin(db: &DbPool, user_id: i64) -> Result<AdminUser, ApiError> {
    let role = find_user_role(db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid session"))?;

    if role.parse::<Role>() != Ok(Role::Admin) {
        tracing::debug!(user_id, "Rejected non-admin user");
        return Err(ApiError::forbidden("admin only"));
    }

    Ok(AdminUser(user_id))
}

/// Router layer requiring a live session
pub async fn require_user_layer(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = require_user(&state, request.headers()).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Router layer requiring a live session owned by an admin
pub async fn require_admin_layer(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let admin = require_admin(&state, request.headers()).await?;
    request.extensions_mut().insert(CurrentUser(admin.0));
    request.extensions_mut().insert(admin);
    Ok(next.run(request).await)
}

/// Reuses the identity a layer already resolved, otherwise authenticates.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(*user);
        }
        require_user(state, &parts.headers).await
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(admin) = parts.extensions.get::<AdminUser>() {
            return Ok(*admin);
        }
        require_admin(state, &parts.headers).await
    }
}

/// Create a session for `user_id` and return its token.
async fn issue_session(state: &AppState, user_id: i64) -> Result<String, ApiError> {
    let token = generate_token().map_err(|e| {
        tracing::error!(error = %e, "Failed to generate session token");
        ApiError::internal("token generation failed")
    })?;

    let ttl_days = state.config.auth.session_ttl_days;
    let expires_at = session_expiry(Utc::now(), ttl_days).ok_or_else(|| {
        tracing::error!(ttl_days, "Session expiry out of range");
        ApiError::internal("session insert failed")
    })?;

    create_session(&state.db, user_id, &token, Some(expires_at))
        .await
        .map_err(|e| ApiError::from_db(e, "session insert failed"))?;

    Ok(token)
}

/// Rewrite a legacy plaintext credential in hashed form.
///
/// Best effort: a failure is logged and the login proceeds.
async fn upgrade_legacy_credential(db: &DbPool, user_id: i64, password: &str) {
    let encoded = match hash_password(password) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Could not hash legacy credential");
            return;
        }
    };

    match update_password_hash(db, user_id, &encoded).await {
        Ok(()) => tracing::info!(user_id, "Upgraded legacy credential"),
        Err(e) => tracing::warn!(user_id, error = %e, "Could not store upgraded credential"),
    }
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<LoginResponse>, ApiError> {
    let request: LoginRequest = parse_body(&body, LOGIN_BODY_LIMIT, "missing email/password")?;

    // Unknown email and wrong password share one response.
    let invalid = || ApiError::unauthorized("invalid credentials");

    let user = find_user_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(invalid)?;

    let credential = Credential::decode(&user.password_hash).map_err(|e| {
        tracing::warn!(user_id = user.id, error = %e, "Stored credential could not be decoded");
        invalid()
    })?;

    if !credential.verify(&request.password) {
        return Err(invalid());
    }

    if credential.is_legacy() {
        upgrade_legacy_credential(&state.db, user.id, &request.password).await;
    }

    let token = issue_session(&state, user.id).await?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// Signup endpoint: creates a client account and logs it in
pub async fn signup(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let request: SignupRequest = parse_body(&body, SIGNUP_BODY_LIMIT, "missing fields")?;

    if request.email.trim().len() < 3
        || request.password.trim().is_empty()
        || request.name.trim().is_empty()
        || request.surname.trim().is_empty()
    {
        return Err(ApiError::bad_request("invalid values"));
    }

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("hash failed")
    })?;

    let user_id = create_user(
        &state.db,
        &NewUser {
            email: &request.email,
            password_hash: &password_hash,
            name: &request.name,
            surname: &request.surname,
            role: Role::Client,
        },
    )
    .await
    .map_err(|e| {
        // Duplicate emails are deliberately not told apart from other failures.
        tracing::warn!(error = %e, "Signup insert failed");
        ApiError::bad_request("signup failed (email already exists?)")
    })?;

    tracing::info!(user_id, "Created client account");

    // The account stays even if the session cannot be created; the client
    // can log in again.
    let token = issue_session(&state, user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: UserResponse {
                id: user_id,
                email: request.email,
                role: Role::Client.to_string(),
                name: request.name,
                surname: request.surname,
            },
        }),
    ))
}

/// Logout endpoint. Deleting an unknown or expired token still succeeds.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token =
        bearer_token(&headers).ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    let deleted = delete_session(&state.db, token)
        .await
        .map_err(|e| ApiError::from_db(e, "logout failed"))?;

    tracing::info!(sessions = deleted, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// Current user endpoint
pub async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<MeResponse>, ApiError> {
    let user = find_user_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("not found"))?;

    Ok(Json(MeResponse {
        user: UserResponse::from(user),
    }))
}
