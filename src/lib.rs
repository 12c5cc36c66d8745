#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # veilroute
//!
//! Session-scoped alias routing for HTTP services.
//!
//! A client logs in once and receives a bearer token plus a private table
//! mapping each logical endpoint name to a random alias. Every later request
//! is a `POST /<alias>` carrying a MessagePack envelope with the token and the
//! payload. The server resolves `token → session → alias → route` and hands
//! the payload to the registered handler. Aliases mean nothing outside their
//! session and die with it.
//!
//! ## Features
//!
//! - **Per-session alias tables** drawn from UUID pairs, collision checked
//! - **Pluggable collaborators**: [`Authenticator`], [`SessionRegistry`], [`WireCodec`]
//! - **Timed expiry** of sessions in the in-memory registry
//! - **Uniform error bodies** with a stable [`ErrorCode`] catalog
//! - **Tower-native**: the dispatch engine is a plain `Service`, wrapped by an access log [`AccessLogLayer`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use veilroute::{Credentials, Server, ServerConfig, StaticAuthenticator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder(ServerConfig::default())
//!         .authenticator(StaticAuthenticator::new(vec![Credentials::new("alice", "pw")]))
//!         .route("echo", |payload: Bytes| async move { payload })
//!         .build()?;
//!
//!     let listener = server.bind().await?;
//!     server
//!         .serve(listener, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod access_log;
pub mod alias;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod login;
pub mod registry;
pub mod routes;
pub mod server;

pub mod prelude;

// Re-exports
pub use access_log::{AccessLogLayer, AccessLogService};
pub use alias::{AliasGenerator, UuidPairGenerator};
pub use auth::{AuthError, Authenticator, StaticAuthenticator};
pub use config::{ConfigError, ServerConfig};
pub use dispatch::{AliasRouter, DispatchSettings, ResolvedRoute};
pub use envelope::{CodecError, Credentials, Envelope, LoginGrant, MessagePackCodec, WireCodec};
pub use error::{ErrorBody, ErrorCode, RouteError};
pub use login::Login;
pub use registry::{ForwardTable, InMemorySessionRegistry, RegistryError, SessionRegistry};
pub use routes::{RouteHandler, RouteTable};
pub use server::{BuildError, Server, ServerBuilder};
