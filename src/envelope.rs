//! Wire schema shared by the server and its clients.
//!
//! Every post-login request carries an [`Envelope`]; the login request carries
//! an envelope whose payload decodes to [`Credentials`]. How those structures
//! become bytes is owned by a [`WireCodec`], with [`MessagePackCodec`] as the
//! default.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Credentials presented once at login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Who is logging in.
    pub identity: String,
    /// Shared secret proving the identity.
    pub secret: String,
}

impl Credentials {
    /// Create credentials from an identity and a secret.
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { identity: identity.into(), secret: secret.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"***")
            .finish()
    }
}

/// The unit sent on the wire for every request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Session token; ignored on the login path.
    #[serde(default)]
    pub token: String,
    /// Opaque bytes interpreted only by the target handler.
    #[serde(default, with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Envelope for an authenticated request.
    pub fn new(token: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { token: token.into(), payload: payload.into() }
    }

    /// Envelope without a token, as sent to the login path.
    pub fn anonymous(payload: impl Into<Vec<u8>>) -> Self {
        Self { token: String::new(), payload: payload.into() }
    }
}

/// Successful login response: the token and the logical-name → alias table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginGrant {
    /// Bearer token for the new session.
    pub token: String,
    /// Reverse table (logical name → alias). Not retained by the server.
    pub session: BTreeMap<String, String>,
}

impl LoginGrant {
    /// Alias issued for `name` in this session.
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.session.get(name).map(String::as_str)
    }
}

/// Errors produced by a [`WireCodec`].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    /// Incoming bytes did not match the expected schema.
    #[error("decode: {0}")]
    Decode(String),
    /// An outgoing value could not be serialized.
    #[error("encode: {0}")]
    Encode(String),
}

/// Byte-level encoding of envelopes and credentials.
pub trait WireCodec: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decode a request body into an envelope.
    fn decode_envelope(&self, raw: &[u8]) -> Result<Envelope, CodecError>;

    /// Encode an envelope into a request body.
    fn encode_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError>;

    /// Decode the login payload. Empty or null payloads yield `Ok(None)`.
    fn decode_credentials(&self, raw: &[u8]) -> Result<Option<Credentials>, CodecError>;

    /// Encode credentials into a login payload.
    fn encode_credentials(&self, creds: &Credentials) -> Result<Vec<u8>, CodecError>;
}

/// MessagePack codec using named-field maps.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessagePackCodec;

impl WireCodec for MessagePackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn decode_envelope(&self, raw: &[u8]) -> Result<Envelope, CodecError> {
        rmp_serde::from_slice(raw).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(envelope).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_credentials(&self, raw: &[u8]) -> Result<Option<Credentials>, CodecError> {
        if raw.is_empty() {
            return Ok(None);
        }
        rmp_serde::from_slice::<Option<Credentials>>(raw)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_credentials(&self, creds: &Credentials) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(creds).map_err(|e| CodecError::Encode(e.to_string()))
    }
}
