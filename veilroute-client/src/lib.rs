#![forbid(unsafe_code)]

//! HTTP client for veilroute servers.
//!
//! Logs in once, keeps the returned [`LoginGrant`], and then lets callers
//! address endpoints by logical name; the client translates each name into
//! the session's alias and wraps the payload in an [`Envelope`].

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};
use veilroute::{CodecError, Credentials, Envelope, ErrorBody, LoginGrant, MessagePackCodec, WireCodec};

/// Per-request timeout applied by [`Client::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle connections kept per host.
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 100;

/// Client failures.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Envelope or credentials could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// JSON body could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A request was made before a successful login.
    #[error("not logged in")]
    NotLoggedIn,
    /// The grant has no alias for this logical name.
    #[error("route `{0}` is not part of this session")]
    UnknownRoute(String),
    /// Server answered with a non-200 status.
    #[error("server returned {status}")]
    Status {
        /// Status code received.
        status: StatusCode,
        /// Decoded error body, when the server sent one.
        body: Option<ErrorBody>,
    },
}

/// Session-holding client.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    login_path: String,
    codec: Box<dyn WireCodec>,
    grant: Option<LoginGrant>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("login_path", &self.login_path)
            .field("codec", &self.codec.name())
            .field("logged_in", &self.grant.is_some())
            .finish()
    }
}

impl Client {
    /// Client for the server at `base_url` (e.g. `http://127.0.0.1:8027`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .pool_max_idle_per_host(DEFAULT_MAX_IDLE_PER_HOST)
            .build()?;
        Ok(Self::with_http_client(base_url, http))
    }

    /// Client reusing an existing `reqwest` client.
    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            login_path: veilroute::config::DEFAULT_LOGIN_PATH.to_string(),
            codec: Box::new(MessagePackCodec),
            grant: None,
        }
    }

    /// Use a non-default login path.
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Use a non-default wire codec.
    pub fn with_codec<C: WireCodec>(mut self, codec: C) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Grant from the last successful login.
    pub fn grant(&self) -> Option<&LoginGrant> {
        self.grant.as_ref()
    }

    /// Log in and keep the resulting grant. A failed login keeps the previous grant.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<&LoginGrant, ClientError> {
        let payload = self.codec.encode_credentials(credentials)?;
        let body = self.codec.encode_envelope(&Envelope::anonymous(payload))?;
        let raw = self.post(&self.login_path, body).await?;
        let grant: LoginGrant = serde_json::from_slice(&raw)?;
        info!(target: "veilroute_client", identity = %credentials.identity, routes = grant.session.len(), "logged in");
        Ok(self.grant.insert(grant))
    }

    /// Send `payload` to the logical route `name` and return the response body.
    pub async fn raw_request(&self, name: &str, payload: Vec<u8>) -> Result<Bytes, ClientError> {
        let grant = self.grant.as_ref().ok_or(ClientError::NotLoggedIn)?;
        let alias = grant.alias(name).ok_or_else(|| ClientError::UnknownRoute(name.to_string()))?;
        let body = self.codec.encode_envelope(&Envelope::new(grant.token.as_str(), payload))?;
        debug!(target: "veilroute_client", route = name, "sending request");
        self.post(alias, body).await
    }

    /// JSON-encode `value` and send it to `name`.
    pub async fn request<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<Bytes, ClientError> {
        let payload = serde_json::to_vec(value)?;
        self.raw_request(name, payload).await
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Bytes, ClientError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http.post(url).body(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if status != StatusCode::OK {
            let body = serde_json::from_slice::<ErrorBody>(&bytes).ok();
            return Err(ClientError::Status { status, body });
        }
        Ok(bytes)
    }
}
