//! Error catalog and structured error responses.
//!
//! [`RouteError`] keeps the precise internal reason a request failed; the
//! response only ever exposes the matching [`ErrorCode`]. Session, alias and
//! route misses all collapse to [`ErrorCode::NotFound`].

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::envelope::CodecError;
use crate::registry::RegistryError;

/// Closed set of externally visible error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Login request without credentials.
    BadRequest,
    /// Credentials rejected by the authenticator.
    Unauthorized,
    /// Unknown session, alias, or route.
    NotFound,
    /// Any method other than POST.
    MethodNotAllowed,
    /// Request body could not be decoded into an envelope.
    EnvelopeDecodeError,
    /// Request body could not be read.
    BodyReadError,
    /// Session registry read failed.
    SessionLookupError,
    /// Session registry write failed.
    SessionPersistError,
    /// Authenticator failed to produce a verdict.
    AuthenticationBackendError,
    /// Response body could not be encoded.
    ResponseEncodeError,
}

impl ErrorCode {
    /// HTTP status carried by this code.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest | ErrorCode::EnvelopeDecodeError => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::BodyReadError
            | ErrorCode::SessionLookupError
            | ErrorCode::SessionPersistError
            | ErrorCode::AuthenticationBackendError
            | ErrorCode::ResponseEncodeError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable human-readable reason.
    pub fn reason(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "credentials missing from login request",
            ErrorCode::Unauthorized => "credentials rejected",
            ErrorCode::NotFound => "not found",
            ErrorCode::MethodNotAllowed => "method not allowed",
            ErrorCode::EnvelopeDecodeError => "failed to decode request envelope",
            ErrorCode::BodyReadError => "failed to read request body",
            ErrorCode::SessionLookupError => "failed to get session info from session registry",
            ErrorCode::SessionPersistError => "failed to set session info to session registry",
            ErrorCode::AuthenticationBackendError => {
                "failed to handle authentication through auth handler"
            }
            ErrorCode::ResponseEncodeError => "failed to encode response body",
        }
    }

    /// Whether this code reports a server-side fault.
    pub fn is_server_error(self) -> bool {
        self.status().is_server_error()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// JSON body written for every error response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Stable reason for the code.
    pub reason: String,
    /// Optional detail; never set for server faults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    /// Body for `code` with its catalog reason.
    pub fn new(code: ErrorCode, detail: Option<String>) -> Self {
        let detail = if code.is_server_error() { None } else { detail };
        Self { code, reason: code.reason().to_string(), detail }
    }
}

/// Internal reasons a request can fail.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum RouteError {
    /// Request used a method other than POST.
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),
    /// Body could not be read (transport error or size limit).
    #[error("failed to read request body: {0}")]
    BodyRead(String),
    /// Body was not a valid envelope.
    #[error("failed to decode envelope: {0}")]
    EnvelopeDecode(#[source] CodecError),
    /// Login request carried no credentials.
    #[error("login request carried no credentials")]
    MissingCredentials,
    /// Authenticator returned a clean rejection.
    #[error("credentials rejected")]
    Rejected,
    /// Authenticator itself failed.
    #[error("authenticator failed: {0}")]
    AuthBackend(#[source] AuthError),
    /// Registry read failed.
    #[error("session lookup failed: {0}")]
    SessionLookup(#[source] RegistryError),
    /// Registry write failed.
    #[error("session persist failed: {0}")]
    SessionPersist(#[source] RegistryError),
    /// Alias generation kept colliding.
    #[error("could not draw a unique identifier after {attempts} attempts")]
    IdentifierExhausted {
        /// Number of draws made before giving up.
        attempts: usize,
    },
    /// Token is unknown or its session expired.
    #[error("no live session for token")]
    UnknownSession,
    /// Alias is not part of the session's table.
    #[error("alias not present in session table")]
    UnknownAlias,
    /// Session points at a route missing from the route table.
    #[error("session references unregistered route `{0}`")]
    UnknownRoute(String),
    /// Response body could not be encoded.
    #[error("failed to encode response: {0}")]
    ResponseEncode(#[source] serde_json::Error),
}

impl RouteError {
    /// Externally visible code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            RouteError::MethodNotAllowed(_) => ErrorCode::MethodNotAllowed,
            RouteError::BodyRead(_) => ErrorCode::BodyReadError,
            RouteError::EnvelopeDecode(_) => ErrorCode::EnvelopeDecodeError,
            RouteError::MissingCredentials => ErrorCode::BadRequest,
            RouteError::Rejected => ErrorCode::Unauthorized,
            RouteError::AuthBackend(_) => ErrorCode::AuthenticationBackendError,
            RouteError::SessionLookup(_) => ErrorCode::SessionLookupError,
            RouteError::SessionPersist(_) | RouteError::IdentifierExhausted { .. } => {
                ErrorCode::SessionPersistError
            }
            RouteError::UnknownSession | RouteError::UnknownAlias | RouteError::UnknownRoute(_) => {
                ErrorCode::NotFound
            }
            RouteError::ResponseEncode(_) => ErrorCode::ResponseEncodeError,
        }
    }

    /// Logical route name known at the time of failure, if any.
    pub fn resolved_route(&self) -> Option<&str> {
        match self {
            RouteError::UnknownRoute(name) => Some(name),
            _ => None,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            RouteError::MethodNotAllowed(method) => Some(method.to_string()),
            RouteError::EnvelopeDecode(err) => Some(err.to_string()),
            _ => None,
        }
    }

    /// Structured body describing this failure.
    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.detail())
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        error_response(&self.body())
    }
}

/// Render `body` as a JSON error response.
pub fn error_response(body: &ErrorBody) -> Response {
    let (status, bytes) = encode_error_body_with(body, serde_json::to_vec::<ErrorBody>);
    let mut response = (status, bytes).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Encode `body` with `encode`, falling back to a literal body if it fails.
pub fn encode_error_body_with<F, E>(body: &ErrorBody, encode: F) -> (StatusCode, Vec<u8>)
where
    F: FnOnce(&ErrorBody) -> Result<Vec<u8>, E>,
    E: std::fmt::Display,
{
    match encode(body) {
        Ok(bytes) => (body.code.status(), bytes),
        Err(err) => {
            tracing::error!(target: "veilroute::error", code = %body.code, error = %err, "failed to encode error body");
            let code = ErrorCode::ResponseEncodeError;
            let literal = format!(r#"{{"code":"{}","reason":"{}"}}"#, code, code.reason());
            (code.status(), literal.into_bytes())
        }
    }
}
