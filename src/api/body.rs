//! Typed extraction of JSON request bodies.
//!
//! Bodies are size-checked, screened for `\uXXXX` escapes (which are not
//! accepted anywhere in a request body), then parsed with `serde_json`.
//! Only a top-level object is accepted, and a repeated key keeps its first
//! value. A missing field, a non-string value or malformed JSON all yield
//! the same caller-supplied 400 message.

use serde::de::{DeserializeOwned, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

use super::error::ApiError;

pub const LOGIN_BODY_LIMIT: usize = 1024;
pub const SIGNUP_BODY_LIMIT: usize = 2048;
pub const ADMIN_BODY_LIMIT: usize = 1024;

pub fn parse_body<T: DeserializeOwned>(
    body: &[u8],
    max_len: usize,
    missing_message: &'static str,
) -> Result<T, ApiError> {
    if body.is_empty() || body.len() > max_len {
        return Err(ApiError::bad_request("invalid body"));
    }

    if contains_unicode_escape(body) {
        tracing::debug!("Rejected request body containing a unicode escape");
        return Err(ApiError::bad_request(missing_message));
    }

    serde_json::from_slice::<TopLevelObject>(body)
        .and_then(|TopLevelObject(fields)| T::deserialize(Value::Object(fields)))
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected request body");
            ApiError::bad_request(missing_message)
        })
}

/// Fields of a JSON object, first occurrence of each key winning
struct TopLevelObject(Map<String, Value>);

impl<'de> Deserialize<'de> for TopLevelObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ObjectVisitor;

        impl<'de> Visitor<'de> for ObjectVisitor {
            type Value = TopLevelObject;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut fields = Map::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    fields.entry(key).or_insert(value);
                }
                Ok(TopLevelObject(fields))
            }
        }

        deserializer.deserialize_map(ObjectVisitor)
    }
}

/// Whether any JSON string in `body` contains a `\u` escape
fn contains_unicode_escape(body: &[u8]) -> bool {
    let mut in_string = false;
    let mut escaped = false;

    for &b in body {
        if !in_string {
            in_string = b == b'"';
        } else if escaped {
            if b == b'u' {
                return true;
            }
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            in_string = false;
        }
    }
    false
}
