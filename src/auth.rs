//! Credential verification collaborator.
//!
//! The core only asks an [`Authenticator`] one question at login: are these
//! credentials valid? A failure to answer is distinct from a "no".

use std::path::Path;

use async_trait::async_trait;

use crate::envelope::Credentials;

/// Errors produced by an authenticator backend.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// The backend could not be reached or failed mid-check.
    #[error("credential backend unavailable: {0}")]
    Unavailable(String),
    /// The credential source could not be loaded.
    #[error("invalid credential source: {0}")]
    InvalidSource(String),
}

/// Pluggable credential check.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(true)` if the credentials are valid, `Ok(false)` if they are not.
    async fn verify(&self, credentials: &Credentials) -> Result<bool, AuthError>;
}

/// Fixed list of accepted credentials.
#[derive(Clone, Debug, Default)]
pub struct StaticAuthenticator {
    accepted: Vec<Credentials>,
}

impl StaticAuthenticator {
    /// Accept exactly `accepted`.
    pub fn new(accepted: Vec<Credentials>) -> Self {
        Self { accepted }
    }

    /// Parse a JSON array of `{"identity": ..., "secret": ...}` objects.
    pub fn from_json_str(raw: &str) -> Result<Self, AuthError> {
        let accepted: Vec<Credentials> =
            serde_json::from_str(raw).map_err(|e| AuthError::InvalidSource(e.to_string()))?;
        Ok(Self::new(accepted))
    }

    /// Load a JSON credential file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AuthError::InvalidSource(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Number of accepted identities.
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    /// Whether no identities are accepted.
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn verify(&self, credentials: &Credentials) -> Result<bool, AuthError> {
        Ok(self.accepted.iter().any(|c| c == credentials))
    }
}
