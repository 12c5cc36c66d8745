//! Server configuration loaded from TOML.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8027);
/// Default reserved login path.
pub const DEFAULT_LOGIN_PATH: &str = "login";
/// Default request body ceiling (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Configuration errors.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ServerConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server settings. Every field has a default, so an empty file is valid.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub listen_addr: SocketAddr,
    /// How long a session stays valid after login.
    pub session_ttl_secs: u64,
    /// Path segment (no leading `/`) reserved for login.
    pub login_path: String,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// JSON credential list consumed by the bundled server binary.
    pub credentials_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(DEFAULT_LISTEN_ADDR),
            session_ttl_secs: crate::registry::DEFAULT_SESSION_TTL.as_secs(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            credentials_path: None,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    /// Override the listen address.
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Override the session lifetime.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl_secs = ttl.as_secs();
        self
    }

    /// Override the login path.
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Override the body ceiling.
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Set the credential file.
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Session lifetime as a [`Duration`].
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("session_ttl_secs must be greater than zero".into()));
        }
        if self.login_path.is_empty() {
            return Err(ConfigError::Invalid("login_path must not be empty".into()));
        }
        if self.login_path.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "login_path must be a single path segment, got {:?}",
                self.login_path
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be greater than zero".into()));
        }
        Ok(())
    }
}
