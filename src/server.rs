//! Server bootstrap: wire collaborators together and serve over TCP.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::access_log::{AccessLogLayer, AccessLogService};
use crate::alias::{AliasGenerator, UuidPairGenerator};
use crate::auth::Authenticator;
use crate::config::{ConfigError, ServerConfig};
use crate::dispatch::{AliasRouter, DispatchSettings};
use crate::envelope::{MessagePackCodec, WireCodec};
use crate::login::Login;
use crate::registry::{InMemorySessionRegistry, SessionRegistry};
use crate::routes::{RouteHandler, RouteTable};

/// Errors raised while assembling a [`Server`].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum BuildError {
    /// No [`Authenticator`] was supplied.
    #[error("an authenticator is required")]
    MissingAuthenticator,
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Builder for [`Server`].
///
/// Only the authenticator is mandatory. The registry defaults to an
/// [`InMemorySessionRegistry`] using the configured TTL, the codec to
/// [`MessagePackCodec`] and identifiers to [`UuidPairGenerator`].
pub struct ServerBuilder {
    config: ServerConfig,
    routes: RouteTable,
    authenticator: Option<Arc<dyn Authenticator>>,
    sessions: Option<Arc<dyn SessionRegistry>>,
    codec: Arc<dyn WireCodec>,
    ids: Arc<dyn AliasGenerator>,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("routes", &self.routes)
            .field("has_authenticator", &self.authenticator.is_some())
            .field("codec", &self.codec.name())
            .finish_non_exhaustive()
    }
}

impl ServerBuilder {
    /// Start from `config` with no routes.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            routes: RouteTable::new(),
            authenticator: None,
            sessions: None,
            codec: Arc::new(MessagePackCodec),
            ids: Arc::new(UuidPairGenerator),
        }
    }

    /// Register a handler under a logical route name.
    pub fn route<H: RouteHandler>(mut self, name: impl Into<String>, handler: H) -> Self {
        self.routes.register(name, handler);
        self
    }

    /// Replace the whole route table.
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Credential check used at login.
    pub fn authenticator<A: Authenticator + 'static>(mut self, authenticator: A) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Session store; shared so callers can inspect it.
    pub fn sessions(mut self, sessions: Arc<dyn SessionRegistry>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Wire codec for envelopes and credentials.
    pub fn codec<C: WireCodec>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Source of tokens and aliases.
    pub fn alias_generator<G: AliasGenerator + 'static>(mut self, ids: G) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Validate and assemble the server.
    pub fn build(self) -> Result<Server, BuildError> {
        self.config.validate()?;
        let authenticator = self.authenticator.ok_or(BuildError::MissingAuthenticator)?;
        let ttl = self.config.session_ttl();
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(InMemorySessionRegistry::with_ttl(ttl)));
        let routes = Arc::new(self.routes);
        let login = Login::new(authenticator, sessions.clone(), routes.clone(), self.ids);
        let settings = DispatchSettings {
            login_path: self.config.login_path.clone(),
            max_body_bytes: self.config.max_body_bytes,
        };
        let router = AliasRouter::new(routes, sessions.clone(), self.codec, login, settings);
        Ok(Server { config: self.config, router, sessions })
    }
}

/// An assembled alias-routing server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: AliasRouter,
    sessions: Arc<dyn SessionRegistry>,
}

impl Server {
    /// Start building a server.
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Session store backing this server.
    pub fn sessions(&self) -> &Arc<dyn SessionRegistry> {
        &self.sessions
    }

    /// Dispatch engine wrapped in the access log layer.
    pub fn service(&self) -> AccessLogService<AliasRouter> {
        tower::Layer::layer(&AccessLogLayer::new(), self.router.clone())
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.listen_addr).await
    }

    /// Serve until `shutdown` resolves, then drop every session.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        let app = axum::Router::new()
            .fallback_service(self.service())
            .into_make_service_with_connect_info::<SocketAddr>();
        info!(
            target: "veilroute::server",
            addr = %local,
            routes = self.router.routes().len(),
            login_path = %self.config.login_path,
            "listening"
        );
        let result = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;
        self.sessions.shutdown();
        info!(target: "veilroute::server", addr = %local, "server stopped");
        result
    }
}
