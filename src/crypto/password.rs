//! PBKDF2-HMAC-SHA256 password credentials.
//!
//! The encoded form is `pbkdf2$sha256$<iterations>$<salt hex>$<key hex>`
//! with a 16-byte salt and a 32-byte derived key, both lowercase hex.
//! Anything without the `pbkdf2$sha256$` prefix is a legacy plaintext
//! password.

use rand::{rngs::OsRng, TryRngCore};
use ring::pbkdf2;
use std::fmt;
use std::num::NonZeroU32;
use subtle::ConstantTimeEq;

use super::CryptoError;

/// Tag that marks a stored value as hashed
pub const HASHED_PREFIX: &str = "pbkdf2$sha256$";

/// Length of the random salt in bytes
pub const SALT_LENGTH: usize = 16;

/// Length of the derived key in bytes
pub const KEY_LENGTH: usize = 32;

/// Number of PBKDF2 iterations for newly hashed passwords
pub const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};

/// A decoded stored password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Plaintext stored verbatim by rows that predate hashing
    Legacy(String),
    Hashed(HashedCredential),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedCredential {
    pub iterations: NonZeroU32,
    pub salt: [u8; SALT_LENGTH],
    pub key: [u8; KEY_LENGTH],
}

impl Credential {
    /// Decode a stored credential string.
    ///
    /// Values without the hashed tag always decode as [`Credential::Legacy`];
    /// tagged values must carry a non-zero iteration count and hex fields of
    /// exactly the expected decoded lengths.
    pub fn decode(stored: &str) -> Result<Self, CryptoError> {
        let Some(fields) = stored.strip_prefix(HASHED_PREFIX) else {
            return Ok(Credential::Legacy(stored.to_string()));
        };

        let mut parts = fields.splitn(3, '$');
        let (Some(iterations), Some(salt_hex), Some(key_hex)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::MalformedCredential("missing fields"));
        };

        let iterations = iterations
            .parse::<NonZeroU32>()
            .map_err(|_| CryptoError::MalformedCredential("invalid iteration count"))?;

        let mut salt = [0u8; SALT_LENGTH];
        hex::decode_to_slice(salt_hex, &mut salt)
            .map_err(|_| CryptoError::MalformedCredential("invalid salt"))?;

        let mut key = [0u8; KEY_LENGTH];
        hex::decode_to_slice(key_hex, &mut key)
            .map_err(|_| CryptoError::MalformedCredential("invalid derived key"))?;

        Ok(Credential::Hashed(HashedCredential {
            iterations,
            salt,
            key,
        }))
    }

    /// Check a candidate password against this credential.
    pub fn verify(&self, password: &str) -> bool {
        match self {
            // Plain equality; legacy rows are rewritten on first successful login.
            Credential::Legacy(plaintext) => password == plaintext,
            Credential::Hashed(hashed) => hashed.matches(password),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Credential::Legacy(_))
    }

    /// The string form persisted in `users.password_hash`
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Legacy(plaintext) => f.write_str(plaintext),
            Credential::Hashed(hashed) => hashed.fmt(f),
        }
    }
}

impl HashedCredential {
    /// Hash a password with a fresh salt drawn from the OS random source.
    pub fn new(password: &str) -> Result<Self, CryptoError> {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| CryptoError::RandomUnavailable(e.to_string()))?;

        Ok(Self {
            iterations: PBKDF2_ITERATIONS,
            key: derive_key(password, &salt, PBKDF2_ITERATIONS),
            salt,
        })
    }

    /// Recompute the key for `password` and compare in constant time.
    pub fn matches(&self, password: &str) -> bool {
        let candidate = derive_key(password, &self.salt, self.iterations);
        candidate[..].ct_eq(&self.key[..]).into()
    }
}

impl fmt::Display for HashedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}${}${}",
            HASHED_PREFIX,
            self.iterations,
            hex::encode(self.salt),
            hex::encode(self.key)
        )
    }
}

fn derive_key(password: &str, salt: &[u8], iterations: NonZeroU32) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut key,
    );
    key
}

/// Hash a password and return the encoded form ready for storage
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    HashedCredential::new(password).map(|hashed| hashed.to_string())
}

/// Whether a stored value carries the hashed tag
pub fn is_hashed(stored: &str) -> bool {
    stored.starts_with(HASHED_PREFIX)
}

/// Verify a password against a stored credential string.
///
/// A tagged value that fails to decode never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match Credential::decode(stored) {
        Ok(credential) => credential.verify(password),
        Err(e) => {
            tracing::warn!(error = %e, "Stored credential could not be decoded");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap(password: &str, salt: [u8; SALT_LENGTH]) -> HashedCredential {
        let iterations = NonZeroU32::new(1).unwrap();
        HashedCredential {
            iterations,
            key: derive_key(password, &salt, iterations),
            salt,
        }
    }

    #[test]
    fn test_derive_key_matches_rfc7914_vector() {
        let key = derive_key("passwd", b"salt", NonZeroU32::new(1).unwrap());
        assert_eq!(
            hex::encode(key),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn test_hash_then_verify() {
        let encoded = hash_password("correct horse").unwrap();
        assert!(is_hashed(&encoded));
        assert!(verify_password("correct horse", &encoded));
        assert!(!verify_password("correct horsf", &encoded));
        assert!(!verify_password("", &encoded));
    }

    #[test]
    fn test_encoded_layout() {
        let encoded = hash_password("pw").unwrap();
        let fields: Vec<&str> = encoded.split('$').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], "pbkdf2");
        assert_eq!(fields[1], "sha256");
        assert_eq!(fields[2], "100000");
        assert_eq!(fields[3].len(), SALT_LENGTH * 2);
        assert_eq!(fields[4].len(), KEY_LENGTH * 2);
        assert!(fields[3..]
            .iter()
            .all(|f| f.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))));
    }

    #[test]
    fn test_same_password_gets_fresh_salt() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn test_decode_encode_preserves_fields() {
        let hashed = cheap("pw", [7u8; SALT_LENGTH]);
        let encoded = hashed.to_string();
        assert_eq!(
            Credential::decode(&encoded).unwrap(),
            Credential::Hashed(hashed)
        );
    }

    #[test]
    fn test_stored_iteration_count_is_honoured() {
        let encoded = cheap("pw", [1u8; SALT_LENGTH]).to_string();
        assert!(encoded.starts_with("pbkdf2$sha256$1$"));
        assert!(verify_password("pw", &encoded));
    }

    #[test]
    fn test_uppercase_hex_is_accepted() {
        let encoded = cheap("pw", [0xab; SALT_LENGTH]).to_string().to_uppercase();
        // The tag must stay lowercase for the value to be recognised as hashed.
        let encoded = encoded.replacen("PBKDF2$SHA256$", HASHED_PREFIX, 1);
        assert!(verify_password("pw", &encoded));
    }

    #[test]
    fn test_legacy_plaintext() {
        assert!(!is_hashed("admin"));
        let credential = Credential::decode("admin").unwrap();
        assert!(credential.is_legacy());
        assert!(credential.verify("admin"));
        assert!(!credential.verify("Admin"));
        assert!(!credential.verify("admin "));
        assert_eq!(credential.encode(), "admin");
    }

    #[test]
    fn test_empty_stored_value_is_legacy() {
        assert!(verify_password("", ""));
        assert!(!verify_password("x", ""));
    }

    #[test]
    fn test_malformed_hashed_values_never_verify() {
        let salt = "00".repeat(SALT_LENGTH);
        let key = "00".repeat(KEY_LENGTH);
        let cases = [
            format!("{}100000${}", HASHED_PREFIX, salt),
            format!("{}0${}${}", HASHED_PREFIX, salt, key),
            format!("{}abc${}${}", HASHED_PREFIX, salt, key),
            format!("{}100000${}${}", HASHED_PREFIX, "00".repeat(15), key),
            format!("{}100000${}${}", HASHED_PREFIX, salt, "00".repeat(31)),
            format!("{}100000${}zz${}", HASHED_PREFIX, "00".repeat(15), key),
            format!("{}100000${}${}$", HASHED_PREFIX, salt, key),
        ];
        for stored in cases {
            assert!(is_hashed(&stored));
            assert!(Credential::decode(&stored).is_err(), "{stored}");
            assert!(!verify_password("", &stored), "{stored}");
        }
    }

    #[test]
    fn test_hashed_value_is_not_a_legacy_password() {
        // A user typing the encoded string itself must not authenticate.
        let encoded = hash_password("pw").unwrap();
        assert!(!verify_password(&encoded, &encoded));
    }
}
