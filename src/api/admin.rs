//! Admin roster endpoints, mounted behind `require_admin_layer`.

use axum::{body::Bytes, extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;

use crate::crypto::hash_password;
use crate::db::{self, CreateUserRequest, NewUser, Role, UserResponse};
use crate::AppState;

use super::auth::AdminUser;
use super::body::{parse_body, ADMIN_BODY_LIMIT};
use super::error::ApiError;

/// Create a user with an explicit role
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(AdminUser(admin_id)): Extension<AdminUser>,
    body: Bytes,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let request: CreateUserRequest = parse_body(&body, ADMIN_BODY_LIMIT, "missing fields")?;

    let role: Role = request
        .role
        .parse()
        .map_err(|_| ApiError::bad_request("invalid role"))?;

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("hash failed")
    })?;

    let id = db::create_user(
        &state.db,
        &NewUser {
            email: &request.email,
            password_hash: &password_hash,
            name: &request.name,
            surname: &request.surname,
            role,
        },
    )
    .await
    .map_err(|e| {
        tracing::warn!(error = %e, "Admin user insert failed");
        ApiError::bad_request("insert failed (email already exists?)")
    })?;

    tracing::info!(admin_id, user_id = id, role = %role, "Admin created user");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id,
            email: request.email,
            role: role.to_string(),
            name: request.name,
            surname: request.surname,
        }),
    ))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = db::list_users(&state.db).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{admin_auth, seeded_state, send, send_with_auth, test_router};
    use crate::crypto::{is_hashed, verify_password};
    use serde_json::json;

    const COACH: &str =
        r#"{"email":"coach@gym.io","password":"lift","name":"Coach","surname":"Carter","role":"admin"}"#;

    #[tokio::test]
    async fn test_admin_creates_user_with_role() {
        let state = seeded_state().await;
        let app = test_router(state.clone());
        let auth = admin_auth(&app).await;

        let (status, body) =
            send_with_auth(&app, "POST", "/admin/users", Some(&auth), Some(COACH)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["role"], "admin");
        assert_eq!(body["email"], "coach@gym.io");
        assert!(body.get("password_hash").is_none());

        let stored = db::find_user_by_email(&state.db, "coach@gym.io")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, body["id"].as_i64().unwrap());
        assert!(is_hashed(&stored.password_hash));
        assert!(verify_password("lift", &stored.password_hash));

        // The new admin can log in and use the roster.
        let (status, login) = send(
            &app,
            "POST",
            "/login",
            Some(r#"{"email":"coach@gym.io","password":"lift"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let coach_auth = format!("Bearer {}", login["token"].as_str().unwrap());
        let (status, _) = send_with_auth(&app, "GET", "/admin/users", Some(&coach_auth), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_create_rejections() {
        let state = seeded_state().await;
        let app = test_router(state);
        let auth = admin_auth(&app).await;

        let bad_role =
            r#"{"email":"x@gym.io","password":"p","name":"X","surname":"Y","role":"Admin"}"#;
        let (status, body) =
            send_with_auth(&app, "POST", "/admin/users", Some(&auth), Some(bad_role)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "invalid role" }));

        let missing = r#"{"email":"x@gym.io","password":"p","name":"X","surname":"Y"}"#;
        let (status, body) =
            send_with_auth(&app, "POST", "/admin/users", Some(&auth), Some(missing)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing fields");

        let (status, _) =
            send_with_auth(&app, "POST", "/admin/users", Some(&auth), Some(COACH)).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) =
            send_with_auth(&app, "POST", "/admin/users", Some(&auth), Some(COACH)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "insert failed (email already exists?)");
    }

    #[tokio::test]
    async fn test_list_users_in_id_order() {
        let state = seeded_state().await;
        let app = test_router(state);
        let auth = admin_auth(&app).await;

        send(
            &app,
            "POST",
            "/signup",
            Some(r#"{"email":"a@b.com","password":"pw","name":"A","surname":"B"}"#),
        )
        .await;

        let (status, body) = send_with_auth(&app, "GET", "/admin/users", Some(&auth), None).await;
        assert_eq!(status, StatusCode::OK);
        let users = body.as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["email"], "admin@local");
        assert_eq!(users[1]["email"], "a@b.com");
        assert_eq!(users[1]["role"], "client");
        assert!(users[0]["id"].as_i64() < users[1]["id"].as_i64());
        assert!(users.iter().all(|u| u.get("password_hash").is_none()));
    }

    #[tokio::test]
    async fn test_roster_is_admin_only() {
        let state = seeded_state().await;
        let app = test_router(state);

        let (_, body) = send(
            &app,
            "POST",
            "/signup",
            Some(r#"{"email":"a@b.com","password":"pw","name":"A","surname":"B"}"#),
        )
        .await;
        let client_auth = format!("Bearer {}", body["token"].as_str().unwrap());

        let (status, body) =
            send_with_auth(&app, "GET", "/admin/users", Some(&client_auth), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "admin only");

        let (status, body) =
            send_with_auth(&app, "POST", "/admin/users", Some(&client_auth), Some(COACH)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "admin only");

        let (status, body) = send(&app, "GET", "/admin/users", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing bearer token");
    }
}
