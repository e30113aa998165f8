//! Account models: the authenticated user and the auth request bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::unwrap_envelope;

/// The identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl User {
    /// Decode the user from `GET /user`, bare or wrapped in `data` / `user`.
    pub fn from_envelope(envelope: Value) -> serde_json::Result<Self> {
        serde_json::from_value(unwrap_envelope(envelope, &["data", "user"]))
    }

    /// "Name <email>" for status lines.
    pub fn display(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

/// Body of `POST /login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Body of `POST /register`.
#[derive(Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl Registration {
    /// Build a registration whose confirmation matches the password.
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        let password = password.into();
        Self {
            name: name.into(),
            email: email.into(),
            password_confirmation: password.clone(),
            password,
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Successful login/registration response.
///
/// Backends differ on the token field name; both `token` and
/// `access_token` are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "access_token")]
    pub token: String,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_response_token() {
        let json = r#"{"message":"ok","token":"1|abc","user":{"id":7,"name":"Ada","email":"ada@example.com","created_at":"2025-01-02T03:04:05Z"}}"#;
        let resp: AuthResponse = serde_json::from_str(json).expect("auth response");
        assert_eq!(resp.token, "1|abc");
        assert_eq!(resp.user.id, 7);
        assert_eq!(resp.user.created_at.as_deref(), Some("2025-01-02T03:04:05Z"));
    }

    #[test]
    fn test_parse_auth_response_access_token() {
        let json = r#"{"access_token":"xyz","token_type":"Bearer","user":{"id":1,"name":"B","email":"b@x.io"}}"#;
        let resp: AuthResponse = serde_json::from_str(json).expect("auth response");
        assert_eq!(resp.token, "xyz");
        assert_eq!(resp.user.display(), "B <b@x.io>");
    }

    #[test]
    fn test_user_from_envelope() {
        let bare = serde_json::json!({"id": 2, "name": "N", "email": "n@x.io", "email_verified_at": null});
        assert_eq!(User::from_envelope(bare).expect("bare").id, 2);

        let wrapped = serde_json::json!({"user": {"id": 3, "name": "M", "email": "m@x.io"}});
        assert_eq!(User::from_envelope(wrapped).expect("wrapped").name, "M");
    }

    #[test]
    fn test_registration_confirmation_matches() {
        let reg = Registration::new("Ada", "ada@example.com", "hunter22");
        assert_eq!(reg.password, reg.password_confirmation);
        let body = serde_json::to_value(&reg).expect("serialize");
        assert_eq!(body["password_confirmation"], "hunter22");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            email: "ada@example.com".to_string(),
            password: "hunter22".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter22"));
        assert!(debug.contains("ada@example.com"));
    }
}
