use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served for GET requests that match no API route
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Handlers share one connection unless raised
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("db/gym.db")
}

fn default_max_connections() -> u32 {
    1
}

/// Longest accepted `auth.session_ttl_days`
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a session issued by login or signup
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    /// Seeded when the store has no admin yet. The password is stored as a
    /// legacy plaintext credential and rehashed on first login.
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
    #[serde(default = "default_admin_surname")]
    pub admin_surname: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_days: default_session_ttl_days(),
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
            admin_name: default_admin_name(),
            admin_surname: default_admin_surname(),
        }
    }
}

fn default_session_ttl_days() -> i64 {
    7
}

fn default_admin_email() -> String {
    "admin@local".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

fn default_admin_name() -> String {
    "Admin".to_string()
}

fn default_admin_surname() -> String {
    "System".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ttl = self.auth.session_ttl_days;
        ensure!(
            (1..=MAX_SESSION_TTL_DAYS).contains(&ttl),
            "auth.session_ttl_days must be between 1 and {}, got {}",
            MAX_SESSION_TTL_DAYS,
            ttl
        );
        Ok(())
    }
}
