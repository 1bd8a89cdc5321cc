mod models;

pub use models::*;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::config::{AuthConfig, DatabaseConfig};

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

/// Open the store file (creating it if needed) and bring the schema up to date.
pub async fn init(config: &DatabaseConfig) -> Result<DbPool> {
    if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", config.path.display());
    info!("Initializing database at {}", config.path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect(&db_url)
        .await
        .with_context(|| format!("Failed to open database: {}", config.path.display()))?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// A migrated in-memory store on a single long-lived connection.
pub async fn connect_in_memory() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Users and sessions
    execute_sql(pool, include_str!("../../migrations/001_initial.sql"))
        .await
        .context("Migration 001_initial failed")?;

    info!("Migrations completed");
    Ok(())
}

/// Create the configured admin account unless some admin already exists.
///
/// The password is written as a legacy plaintext credential; the first
/// successful login rewrites it in hashed form. Returns whether a row was
/// inserted.
pub async fn seed_admin(pool: &SqlitePool, auth: &AuthConfig) -> Result<bool> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE role = 'admin' LIMIT 1")
            .fetch_optional(pool)
            .await
            .context("Failed to check for an existing admin")?;

    if existing.is_some() {
        return Ok(false);
    }

    info!("No admin found, creating default admin {}", auth.admin_email);

    create_user(
        pool,
        &NewUser {
            email: &auth.admin_email,
            password_hash: &auth.admin_password,
            name: &auth.admin_name,
            surname: &auth.admin_surname,
            role: Role::Admin,
        },
    )
    .await
    .context("Failed to create default admin")?;

    Ok(true)
}
