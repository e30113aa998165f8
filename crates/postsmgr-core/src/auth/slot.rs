//! Durable storage for the session.
//!
//! A `SessionSlot` holds at most one `SessionData`. The store writes it on
//! every transition and reads it once at startup.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;

use super::SessionData;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name for the keyring slot
const SERVICE_NAME: &str = "postsmgr";

/// Keychain account the session is stored under
const KEYRING_ACCOUNT: &str = "session";

/// A single persisted session value. Last writer wins.
pub trait SessionSlot: Send + Sync {
    /// Read the stored session, if any.
    fn load(&self) -> Result<Option<SessionData>>;

    /// Overwrite the stored session.
    fn store(&self, data: &SessionData) -> Result<()>;

    /// Remove the stored session. Succeeds when nothing is stored.
    fn remove(&self) -> Result<()>;
}

/// `session.json` in a directory on disk.
#[derive(Debug, Clone)]
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }
}

impl SessionSlot for FileSlot {
    fn load(&self) -> Result<Option<SessionData>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(data))
    }

    fn store(&self, data: &SessionData) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&path, contents).context("Failed to write session file")?;

        // The file holds a bearer token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// The OS keychain, one entry holding the serialized session.
#[derive(Debug, Clone)]
pub struct KeyringSlot {
    service: String,
}

impl KeyringSlot {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a different keychain service name, one per backend for example.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, KEYRING_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl Default for KeyringSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSlot for KeyringSlot {
    fn load(&self) -> Result<Option<SessionData>> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                let data: SessionData = serde_json::from_str(&secret)
                    .context("Failed to parse session from keychain")?;
                Ok(Some(data))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn store(&self, data: &SessionData) -> Result<()> {
        let secret = serde_json::to_string(data)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store session in keychain")
    }

    fn remove(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

/// Process-local slot. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySlot {
    data: Mutex<Option<SessionData>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that already holds a session, as if written by an earlier run.
    pub fn with_session(data: SessionData) -> Self {
        Self {
            data: Mutex::new(Some(data)),
        }
    }
}

impl SessionSlot for MemorySlot {
    fn load(&self) -> Result<Option<SessionData>> {
        let guard = self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("Session slot lock poisoned"))?;
        Ok(guard.clone())
    }

    fn store(&self, data: &SessionData) -> Result<()> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("Session slot lock poisoned"))?;
        *guard = Some(data.clone());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("Session slot lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}
