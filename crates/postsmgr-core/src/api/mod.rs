//! REST API client module for the Posts Manager backend.
//!
//! This module provides the `ApiClient` for listing, creating, updating and
//! deleting posts and for signing in and out. Calls carry the session's
//! bearer token; failures are normalized into `ApiError`.

pub mod client;
pub mod error;
pub mod request;

pub use client::{ApiClient, ClientEvent};
pub use error::{ApiError, ApiErrorKind};
pub use request::{ContentKind, FormFields, Payload, RequestDescriptor, METHOD_OVERRIDE_FIELD};
