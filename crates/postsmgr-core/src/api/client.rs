//! API client for the Posts Manager REST API.
//!
//! Every call goes through the same pipeline: the descriptor is resolved to
//! its wire form, the pre-send hook attaches the session's bearer token, the
//! request is sent, and the post-receive hook turns the outcome into either
//! the JSON envelope or an `ApiError`. A 401 clears the session and emits
//! `ClientEvent::LoginRequired`.

use std::sync::Arc;

use anyhow::Context;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    multipart::{Form, Part},
    Client, RequestBuilder, Response, Url,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::request::{FieldValue, FormFields, Payload, RequestDescriptor, TransportRequest};
use super::ApiError;
use crate::auth::SessionStore;
use crate::config::{upload_url_on, Config};
use crate::models::{AuthResponse, Credentials, NewPost, Post, PostUpdate, Registration, User};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the client event channel.
/// Events are rare (one per lost session), 16 leaves ample headroom for slow listeners.
const EVENT_CHANNEL_SIZE: usize = 16;

const POSTS_PATH: &str = "posts";
const LOGIN_PATH: &str = "login";
const REGISTER_PATH: &str = "register";
const LOGOUT_PATH: &str = "logout";
const USER_PATH: &str = "user";

/// Notifications the client raises for the owning application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The backend rejected the credential and the session was cleared.
    /// The application should navigate to `redirect_to`.
    LoginRequired { redirect_to: String },
}

/// API client for the Posts Manager backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    host_url: Url,
    login_path: String,
    session: Arc<SessionStore>,
    events: broadcast::Sender<ClientEvent>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("session", &self.session)
            .finish()
    }
}

impl ApiClient {
    /// Create a client for the configured backend, reading tokens from `session`.
    pub fn new(config: &Config, session: Arc<SessionStore>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            client,
            base_url: config.base_url()?,
            host_url: config.host_url()?,
            login_path: config.login_path.clone(),
            session,
            events,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Listen for client events such as `LoginRequired`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Absolute URL of an uploaded image filename.
    pub fn image_url(&self, filename: &str) -> Result<Url, ApiError> {
        upload_url_on(&self.host_url, filename).map_err(|e| ApiError::Request {
            message: e.to_string(),
        })
    }

    // ===== Pipeline =====

    /// Perform one call and return the response envelope unchanged.
    pub async fn request(&self, descriptor: RequestDescriptor) -> Result<Value, ApiError> {
        let semantic = descriptor.method.clone();
        let content = descriptor.content_kind().map(|k| k.mime());
        let transport = descriptor.into_transport();
        let path = transport.path.clone();

        let builder = self.prepare(transport)?;
        debug!(method = %semantic, path = %path, content = ?content, "Sending request");

        let outcome = builder.send().await;
        self.receive(&path, outcome).await
    }

    /// Pre-send hook: build the HTTP request and attach the bearer token when one exists.
    fn prepare(&self, transport: TransportRequest) -> Result<RequestBuilder, ApiError> {
        let url = self
            .base_url
            .join(transport.path.trim_start_matches('/'))
            .map_err(|e| ApiError::Request {
                message: format!("Invalid path {}: {}", transport.path, e),
            })?;

        let mut builder = self.client.request(transport.method, url);

        if let Some(token) = self.session.get_token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                ApiError::Request {
                    message: format!("Invalid bearer token: {}", e),
                }
            })?;
            value.set_sensitive(true);
            builder = builder.header(header::AUTHORIZATION, value);
        }

        builder = match transport.payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(&body),
            Payload::Multipart(fields) => builder.multipart(Self::build_form(fields)?),
        };

        Ok(builder)
    }

    fn build_form(fields: FormFields) -> Result<Form, ApiError> {
        let mut form = Form::new();
        for field in fields {
            form = match field.value {
                FieldValue::Text(text) => form.text(field.name, text),
                FieldValue::File(image) => {
                    let part = Part::bytes(image.bytes)
                        .file_name(image.file_name)
                        .mime_str(&image.mime)
                        .map_err(|e| ApiError::Request {
                            message: format!("Invalid content type {}: {}", image.mime, e),
                        })?;
                    form.part(field.name, part)
                }
            };
        }
        Ok(form)
    }

    /// Post-receive hook: pass successes through, normalize every failure.
    async fn receive(
        &self,
        path: &str,
        outcome: Result<Response, reqwest::Error>,
    ) -> Result<Value, ApiError> {
        let response = match outcome {
            Ok(response) => response,
            Err(e) => return Err(self.transport_error(path, e)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Err(self.transport_error(path, e)),
        };
        debug!(path = %path, status = %status, bytes = body.len(), "Response received");

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body).map_err(|e| {
                warn!(path = %path, body = %ApiError::truncate_body(&body), "Response is not JSON");
                ApiError::Server {
                    status: status.as_u16(),
                    message: format!("Invalid JSON in response: {}", e),
                    raw_body: body.clone(),
                    errors: None,
                }
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.handle_unauthorized(path);
        } else {
            warn!(
                path = %path,
                status = %status,
                body = %ApiError::truncate_body(&body),
                "Request failed"
            );
        }
        Err(ApiError::from_status(status, &body))
    }

    /// Clear the session once and tell the application to send the user to login.
    fn handle_unauthorized(&self, path: &str) {
        if !self.session.clear_session() {
            debug!(path = %path, "401 with no active session");
            return;
        }
        warn!(path = %path, "Credential rejected, session cleared");
        let event = ClientEvent::LoginRequired {
            redirect_to: self.login_path.clone(),
        };
        if self.events.send(event).is_err() {
            debug!("No listeners for login-required event");
        }
    }

    /// Map a reqwest failure: a builder problem is local, anything else means no response.
    fn transport_error(&self, path: &str, e: reqwest::Error) -> ApiError {
        if e.is_builder() {
            return ApiError::Request {
                message: e.to_string(),
            };
        }
        let reason = if e.is_timeout() {
            "timed out".to_string()
        } else if e.is_connect() {
            "connection failed".to_string()
        } else {
            e.to_string()
        };
        warn!(path = %path, error = %e, "No response from server");
        ApiError::Network {
            message: format!(
                "No response from server ({}). Check that the API server is reachable at {}",
                reason, self.base_url
            ),
        }
    }

    // ===== Posts =====

    /// Fetch every post.
    pub async fn list_posts(&self) -> Result<Vec<Post>, ApiError> {
        let envelope = self.request(RequestDescriptor::get(POSTS_PATH)).await?;
        decode(envelope, Post::list_from_envelope)
    }

    pub async fn get_post(&self, id: i64) -> Result<Post, ApiError> {
        let envelope = self.request(RequestDescriptor::get(post_path(id))).await?;
        decode(envelope, Post::from_envelope)
    }

    /// Create a post. The image part is only sent when one is attached.
    pub async fn create_post(&self, post: NewPost) -> Result<Post, ApiError> {
        let descriptor = RequestDescriptor::post(POSTS_PATH).multipart(new_post_form(post));
        let envelope = self.request(descriptor).await?;
        decode(envelope, Post::from_envelope)
    }

    /// Update a post. Only the fields that are set are sent.
    pub async fn update_post(&self, id: i64, update: PostUpdate) -> Result<Post, ApiError> {
        let descriptor = RequestDescriptor::put(post_path(id)).multipart(update_form(update));
        let envelope = self.request(descriptor).await?;
        decode(envelope, Post::from_envelope)
    }

    /// Delete a post, returning the backend's envelope (usually a message).
    pub async fn delete_post(&self, id: i64) -> Result<Value, ApiError> {
        self.request(RequestDescriptor::delete(post_path(id))).await
    }

    // ===== Authentication =====

    /// Sign in and start a session.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let body = to_json(credentials)?;
        let envelope = self.request(RequestDescriptor::post(LOGIN_PATH).json(body)).await?;
        self.start_session(envelope)
    }

    /// Create an account and start a session.
    pub async fn register(&self, registration: &Registration) -> Result<User, ApiError> {
        let body = to_json(registration)?;
        let envelope = self
            .request(RequestDescriptor::post(REGISTER_PATH).json(body))
            .await?;
        self.start_session(envelope)
    }

    /// Sign out. The local session ends even when the backend call fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if !self.session.is_authenticated() {
            debug!("Logout without a session");
            self.session.clear_session();
            return Ok(());
        }
        let result = self.request(RequestDescriptor::post(LOGOUT_PATH)).await;
        self.session.clear_session();
        if let Err(ref e) = result {
            warn!(error = %e, "Logout call failed, session cleared locally");
        }
        result.map(|_| ())
    }

    /// Fetch the signed-in user and refresh the session's copy.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let envelope = self.request(RequestDescriptor::get(USER_PATH)).await?;
        let user = decode(envelope, User::from_envelope)?;
        self.session.set_user(user.clone());
        Ok(user)
    }

    fn start_session(&self, envelope: Value) -> Result<User, ApiError> {
        let auth: AuthResponse = decode(envelope, serde_json::from_value)?;
        if auth.token.is_empty() {
            return Err(ApiError::Server {
                status: 200,
                message: "Authentication response has an empty token".to_string(),
                raw_body: String::new(),
                errors: None,
            });
        }
        self.session.set_session(auth.token, auth.user.clone());
        Ok(auth.user)
    }
}

fn post_path(id: i64) -> String {
    format!("{}/{}", POSTS_PATH, id)
}

fn new_post_form(post: NewPost) -> FormFields {
    let mut fields = FormFields::new()
        .text("title", post.title)
        .text("description", post.description);
    if let Some(image) = post.image {
        fields = fields.file("image", image);
    }
    fields
}

fn update_form(update: PostUpdate) -> FormFields {
    let mut fields = FormFields::new();
    if let Some(title) = update.title {
        fields = fields.text("title", title);
    }
    if let Some(description) = update.description {
        fields = fields.text("description", description);
    }
    if let Some(image) = update.image {
        fields = fields.file("image", image);
    }
    fields
}

fn to_json<T: serde::Serialize>(body: &T) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Request {
        message: format!("Failed to encode request body: {}", e),
    })
}

/// Interpret a 2xx envelope; a shape mismatch is reported against the body that arrived.
fn decode<T>(
    envelope: Value,
    parse: impl FnOnce(Value) -> serde_json::Result<T>,
) -> Result<T, ApiError> {
    let raw_body = envelope.to_string();
    parse(envelope).map_err(|e| ApiError::Server {
        status: 200,
        message: format!("Unexpected response shape: {}", e),
        raw_body,
        errors: None,
    })
}
