//! Opaque bearer tokens for sessions.

use rand::{rngs::OsRng, TryRngCore};

use super::CryptoError;

/// Random bytes per token; the hex form is twice as long
pub const TOKEN_BYTES: usize = 32;

/// Generate a 64-character lowercase hex session token from the OS random
/// source. There is no fallback generator.
pub fn generate_token() -> Result<String, CryptoError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::RandomUnavailable(e.to_string()))?;
    Ok(hex::encode(bytes))
}
