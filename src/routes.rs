//! Route table: logical endpoint names mapped to handlers.
//!
//! Handlers see only the unwrapped envelope payload and produce the complete
//! HTTP response. The table is populated before the server is built and is
//! read-only afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::warn;

/// A handler registered under a logical route name.
pub trait RouteHandler: Send + Sync + 'static {
    /// Process the request payload and produce the response.
    fn call(&self, payload: Bytes) -> BoxFuture<'static, Response>;
}

impl<F, Fut, R> RouteHandler for F
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, payload: Bytes) -> BoxFuture<'static, Response> {
        let fut = (self)(payload);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Mapping from logical names to handlers.
#[derive(Default, Clone)]
pub struct RouteTable {
    routes: HashMap<String, Arc<dyn RouteHandler>>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable").field("routes", &self.names()).finish()
    }
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any existing handler.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: RouteHandler,
    {
        let name = name.into();
        if self.routes.insert(name.clone(), Arc::new(handler)).is_some() {
            warn!(target: "veilroute::routes", route = %name, "route replaced; last registration wins");
        }
        self
    }

    /// Sorted snapshot of registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Handler registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn RouteHandler>> {
        self.routes.get(name).cloned()
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
