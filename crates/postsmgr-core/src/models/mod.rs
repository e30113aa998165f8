//! Data models for Posts Manager entities.
//!
//! - `Post`, `NewPost`, `PostUpdate`, `ImageUpload`: post records and payloads
//! - `User`, `Credentials`, `Registration`, `AuthResponse`: account types

pub mod post;
pub mod user;

pub use post::{ImageUpload, NewPost, Post, PostUpdate};
pub use user::{AuthResponse, Credentials, Registration, User};

use serde_json::Value;

/// Take the first wrapper member present in an object, otherwise the value itself.
///
/// Only object or array members count as wrappers, so a scalar `data`
/// field on a bare record is left alone.
pub(crate) fn unwrap_envelope(envelope: Value, keys: &[&str]) -> Value {
    match envelope {
        Value::Object(mut map) => {
            for key in keys {
                if let Some(inner) = map.remove(*key) {
                    if inner.is_object() || inner.is_array() {
                        return inner;
                    }
                    map.insert((*key).to_string(), inner);
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}
