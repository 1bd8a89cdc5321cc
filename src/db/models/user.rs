//! User records and their queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Authorization level of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Role names are matched exactly, as the schema's CHECK constraint does.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Encoded credential, see `crate::crypto::Credential`
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub role: String,
    pub created_at: String,
}

/// Public projection of a user; never carries the credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub name: String,
    pub surname: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            name: user.name,
            surname: user.surname,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub surname: String,
}

/// Admin-created account with an explicit role
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserResponse,
}

/// Values for a user insert. `password_hash` is stored as given.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub surname: &'a str,
    pub role: Role,
}

pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? LIMIT 1")
        .bind(email)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Fetch only the stored role string of a user
pub async fn find_user_role(db: &SqlitePool, id: i64) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Insert a user and return its id. Fails on a duplicate email.
pub async fn create_user(db: &SqlitePool, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO users (email, password_hash, name, surname, role) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.name)
    .bind(user.surname)
    .bind(user.role.as_str())
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update_password_hash(
    db: &SqlitePool,
    id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn list_users(db: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
        .fetch_all(db)
        .await
}
