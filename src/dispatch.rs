//! Dispatch engine: token → session → alias → logical route → handler.
//!
//! Each request walks `Received → Decoded → Authenticated → Resolved →
//! Dispatched`, stopping with an error response at the first failed guard.
//! The reserved login path short-circuits to [`Login`] after decoding.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::future::BoxFuture;
use tower::Service;
use tracing::{debug, error};

use crate::envelope::WireCodec;
use crate::error::RouteError;
use crate::login::Login;
use crate::registry::{redact, SessionRegistry};
use crate::routes::RouteTable;

/// Logical route a request was dispatched to, attached to the response extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRoute(pub String);

/// Immutable dispatch settings.
#[derive(Clone, Debug)]
pub struct DispatchSettings {
    /// Path (without leading `/`) reserved for login.
    pub login_path: String,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

struct RouterInner {
    routes: Arc<RouteTable>,
    sessions: Arc<dyn SessionRegistry>,
    codec: Arc<dyn WireCodec>,
    login: Login,
    settings: DispatchSettings,
}

/// Tower service translating per-session aliases into route handlers.
#[derive(Clone)]
pub struct AliasRouter {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for AliasRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasRouter")
            .field("routes", &self.inner.routes)
            .field("codec", &self.inner.codec.name())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl AliasRouter {
    /// Assemble a router over its collaborators.
    pub fn new(
        routes: Arc<RouteTable>,
        sessions: Arc<dyn SessionRegistry>,
        codec: Arc<dyn WireCodec>,
        login: Login,
        settings: DispatchSettings,
    ) -> Self {
        Self { inner: Arc::new(RouterInner { routes, sessions, codec, login, settings }) }
    }

    /// Route table this router dispatches into.
    pub fn routes(&self) -> &RouteTable {
        &self.inner.routes
    }

    /// Handle one request end to end. Never fails; errors become responses.
    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        match self.inner.route(req).await {
            Ok(response) => response,
            Err(err) => {
                if err.code().is_server_error() {
                    error!(target: "veilroute::dispatch", code = %err.code(), reason = %err, "request failed");
                } else {
                    debug!(target: "veilroute::dispatch", code = %err.code(), reason = %err, "request rejected");
                }
                let resolved = err.resolved_route().map(|name| ResolvedRoute(name.to_string()));
                let mut response = err.into_response();
                if let Some(resolved) = resolved {
                    response.extensions_mut().insert(resolved);
                }
                response
            }
        }
    }
}

impl RouterInner {
    async fn route(&self, req: Request<Body>) -> Result<Response, RouteError> {
        if *req.method() != Method::POST {
            return Err(RouteError::MethodNotAllowed(req.method().clone()));
        }
        let path = req.uri().path().trim_start_matches('/').to_string();

        let body = axum::body::to_bytes(req.into_body(), self.settings.max_body_bytes)
            .await
            .map_err(|e| RouteError::BodyRead(e.to_string()))?;
        let envelope = self.codec.decode_envelope(&body).map_err(RouteError::EnvelopeDecode)?;

        if path == self.settings.login_path {
            let credentials =
                self.codec.decode_credentials(&envelope.payload).map_err(RouteError::EnvelopeDecode)?;
            return self.login.respond(credentials).await;
        }

        let table = self
            .sessions
            .get(&envelope.token)
            .await
            .map_err(RouteError::SessionLookup)?
            .ok_or(RouteError::UnknownSession)?;
        let name = table.get(&path).cloned().ok_or(RouteError::UnknownAlias)?;
        let handler = self.routes.get(&name).ok_or_else(|| RouteError::UnknownRoute(name.clone()))?;

        debug!(target: "veilroute::dispatch", session = %redact(&envelope.token), route = %name, "dispatching");
        let mut response = handler.call(Bytes::from(envelope.payload)).await;
        response.extensions_mut().insert(ResolvedRoute(name));
        Ok(response)
    }
}

impl Service<Request<Body>> for AliasRouter {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { Ok(router.dispatch(req).await) })
    }
}
