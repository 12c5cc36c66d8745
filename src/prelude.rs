//! Convenient re-exports for common veilroute types.
pub use crate::{
    auth::{Authenticator, StaticAuthenticator},
    envelope::{Credentials, Envelope, LoginGrant, MessagePackCodec, WireCodec},
    error::{ErrorBody, ErrorCode, RouteError},
    registry::{InMemorySessionRegistry, SessionRegistry},
    routes::{RouteHandler, RouteTable},
    server::{Server, ServerBuilder},
    ServerConfig,
};
