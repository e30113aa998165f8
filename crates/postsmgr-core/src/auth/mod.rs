//! Session management.
//!
//! This module provides:
//! - `SessionStore`: the single owner of the current token and user
//! - `SessionSlot`: durable storage for the session, with file, keychain
//!   and in-memory implementations
//!
//! A session lasts until logout or until the API answers 401.

pub mod session;
pub mod slot;

pub use session::{SessionData, SessionStore};
pub use slot::{FileSlot, KeyringSlot, MemorySlot, SessionSlot};
