//! Core library for the Posts Manager client.
//!
//! - `auth`: the session store and where sessions are persisted
//! - `api`: the gateway client, request descriptors and error taxonomy
//! - `models`: posts, users and request payloads
//! - `config`: endpoint, timeout and storage settings

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiErrorKind, ClientEvent, RequestDescriptor};
pub use auth::{SessionData, SessionStore};
pub use config::Config;
