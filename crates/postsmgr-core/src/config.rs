//! Application configuration management.
//!
//! Configuration holds the API endpoint, the request timeout, where the
//! session is persisted and the last email used to sign in. It is stored at
//! `~/.config/postsmgr/config.json`; environment variables override it.
//! The session file lives under `~/.local/share/postsmgr/` (the platform's
//! local data directory).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use crate::auth::{FileSlot, KeyringSlot, MemorySlot, SessionStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "postsmgr";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API endpoint (a local development backend)
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Calls that get no response within this many seconds fail as network errors.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Where the application sends the user when the session is rejected
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Static route serving uploaded images on the backend host
const UPLOAD_ROUTE: &str = "upload";

pub const ENV_API_URL: &str = "POSTS_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "POSTS_API_TIMEOUT_SECS";
pub const ENV_SESSION_BACKEND: &str = "POSTS_SESSION_BACKEND";
pub const ENV_LOG_DIR: &str = "POSTS_LOG_DIR";

/// Where the session survives between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// `session.json` in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Not persisted
    Memory,
}

impl std::str::FromStr for SessionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" | "keychain" => Ok(Self::Keyring),
            "memory" | "none" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown session backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub login_path: String,
    pub session_backend: SessionBackend,
    pub last_email: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            session_backend: SessionBackend::default(),
            last_email: None,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent) and apply env overrides.
    ///
    /// Also returns the env overrides that were rejected. Loading happens
    /// before logging is set up, so the caller reports them.
    pub fn load() -> Result<(Self, Vec<String>)> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        let rejected = config.apply_env(|key| std::env::var(key).ok());
        Ok((config, rejected))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override fields from environment variables, read through `lookup`.
    /// Returns one message per value that was ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut rejected = Vec::new();
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout_secs = secs,
                _ => rejected.push(format!(
                    "Ignoring {}={:?}: expected a positive number of seconds",
                    ENV_TIMEOUT_SECS, raw
                )),
            }
        }
        if let Some(raw) = lookup(ENV_SESSION_BACKEND) {
            match raw.parse::<SessionBackend>() {
                Ok(backend) => self.session_backend = backend,
                Err(e) => rejected.push(format!("Ignoring {}: {}", ENV_SESSION_BACKEND, e)),
            }
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.trim().is_empty()) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        rejected
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding `session.json` for the file backend.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parsed API base URL, always ending in `/` so relative joins keep the path.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.api_base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).with_context(|| format!("Invalid API URL: {}", self.api_base_url))?;
        if url.cannot_be_a_base() {
            return Err(anyhow::anyhow!("API URL cannot be a base: {}", self.api_base_url));
        }
        Ok(url)
    }

    /// Root of the backend host where `/upload/` lives: the API URL minus a trailing `api` segment.
    pub fn host_url(&self) -> Result<Url> {
        let mut url = self.base_url()?;
        let segments: Vec<String> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let kept = match segments.split_last() {
            Some((last, rest)) if last == "api" => rest,
            _ => &segments[..],
        };
        let mut path = String::from("/");
        for segment in kept {
            path.push_str(segment);
            path.push('/');
        }
        url.set_path(&path);
        Ok(url)
    }

    /// Open the session store for the configured backend, restoring any saved session.
    pub fn open_session_store(&self) -> Result<SessionStore> {
        let store = match self.session_backend {
            SessionBackend::File => SessionStore::restore(FileSlot::new(self.data_dir()?)),
            SessionBackend::Keyring => SessionStore::restore(KeyringSlot::new()),
            SessionBackend::Memory => SessionStore::restore(MemorySlot::new()),
        };
        Ok(store)
    }
}

/// `filename` under the upload route of `host`.
pub(crate) fn upload_url_on(host: &Url, filename: &str) -> Result<Url> {
    let mut url = host.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("API URL cannot be a base"))?
        .pop_if_empty()
        .push(UPLOAD_ROUTE)
        .push(filename);
    Ok(url)
}
