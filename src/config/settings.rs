//! Application settings and configuration types.
//!
//! Settings are persisted to `~/.config/liaison/settings.json` (or the
//! platform equivalent) and loaded at startup. A missing file yields the
//! defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable overriding [`BackendSettings::base_url`].
pub const BACKEND_URL_ENV: &str = "LIAISON_BACKEND_URL";

/// Errors that can occur while loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine a configuration directory")]
    NoConfigDir,

    #[error("failed to read settings at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid backend url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend REST connection.
    pub backend: BackendSettings,
    /// OAuth callback resumption timing.
    pub callback: CallbackSettings,
    /// Navigation targets.
    pub routes: RouteSettings,
}

impl Settings {
    /// Path of the settings file in the user's config directory.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        project_dirs()
            .map(|dirs| dirs.config_dir().join("settings.json"))
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Directory for small durable state (pending connect records).
    pub fn data_dir() -> Result<PathBuf, SettingsError> {
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Loads settings from the default path, applying environment overrides.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = Self::load_from(Self::default_path()?)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Loads settings from `path`, returning defaults when it does not exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings: Settings = serde_json::from_str(&contents)?;
        settings.backend.url()?;
        Ok(settings)
    }

    /// Writes settings as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(write_err)
    }

    /// Applies `LIAISON_BACKEND_URL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::info!(base_url = %url, "Backend URL overridden from environment");
                self.backend.base_url = url;
            }
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "liaison", "liaison")
}

/// Backend REST configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL every request path is joined onto.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl BackendSettings {
    /// Parses [`base_url`](Self::base_url).
    pub fn url(&self) -> Result<Url, SettingsError> {
        Url::parse(&self.base_url).map_err(|source| SettingsError::InvalidUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.yourbackend.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Timing of the OAuth callback screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackSettings {
    /// How long the success indication stays before navigating home.
    pub success_delay_ms: u64,
    /// How long the failure indication stays before navigating home.
    pub failure_delay_ms: u64,
    /// Upper bound on the post-callback status refresh.
    pub refresh_timeout_ms: u64,
    /// Pending connect records older than this are ignored.
    pub pending_ttl_secs: u64,
}

impl CallbackSettings {
    pub fn success_delay(&self) -> Duration {
        Duration::from_millis(self.success_delay_ms)
    }

    pub fn failure_delay(&self) -> Duration {
        Duration::from_millis(self.failure_delay_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Values too large for a `chrono::Duration` saturate, so a record never
    /// expires instead of the TTL wrapping negative.
    pub fn pending_ttl(&self) -> chrono::Duration {
        i64::try_from(self.pending_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            success_delay_ms: 2000,
            failure_delay_ms: 3000,
            refresh_timeout_ms: 10_000,
            pending_ttl_secs: 600,
        }
    }
}

/// Navigation targets used by the route guard and the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    /// Sign-in entry point.
    pub sign_in: String,
    /// Main application screen.
    pub home: String,
    /// OAuth callback entry point.
    pub callback: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            sign_in: "/login".to_string(),
            home: "/dashboard".to_string(),
            callback: "/oauth/callback".to_string(),
        }
    }
}
