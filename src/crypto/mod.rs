//! Credential hashing and session token generation.
//!
//! Stored passwords come in two shapes: plaintext rows that predate hashing
//! and `pbkdf2$sha256$...` rows written since. [`password::Credential`] is
//! the only place that tells them apart.

pub mod password;
pub mod token;

pub use password::{hash_password, is_hashed, verify_password, Credential, HashedCredential};
pub use token::generate_token;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The operating system's secure random source could not be read
    #[error("secure random source unavailable: {0}")]
    RandomUnavailable(String),

    /// A stored value carries the hashed tag but its fields do not parse
    #[error("malformed credential: {0}")]
    MalformedCredential(&'static str),
}
