//! Access log middleware.
//!
//! Wraps any HTTP service and emits one structured event per request on the
//! `veilroute::access` target once the inner response is known:
//! remote address, method, requested path, resolved route (if any) and the
//! status code that was actually produced.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::extract::ConnectInfo;
use axum::http::{Method, Request, Response};
use pin_project::pin_project;
use tower_layer::Layer;
use tower_service::Service;
use tracing::info;

use crate::dispatch::ResolvedRoute;

/// Layer producing [`AccessLogService`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLogLayer;

impl AccessLogLayer {
    /// Create the layer.
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

/// Service that logs each request after the wrapped service responds.
#[derive(Clone, Debug)]
pub struct AccessLogService<S> {
    inner: S,
}

impl<S> AccessLogService<S> {
    /// Wrap `inner` directly.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Borrow the wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AccessLogService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = AccessLogFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let entry = AccessEntry {
            remote_addr: req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
        };
        AccessLogFuture { inner: self.inner.call(req), entry: Some(entry) }
    }
}

#[derive(Debug)]
struct AccessEntry {
    remote_addr: Option<SocketAddr>,
    method: Method,
    path: String,
}

/// Response future of [`AccessLogService`].
#[pin_project]
#[derive(Debug)]
pub struct AccessLogFuture<F> {
    #[pin]
    inner: F,
    entry: Option<AccessEntry>,
}

impl<F, ResBody, E> Future for AccessLogFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));
        if let (Some(entry), Ok(response)) = (this.entry.take(), result.as_ref()) {
            let route = response.extensions().get::<ResolvedRoute>().map(|r| r.0.as_str());
            let status = response.status();
            let remote = entry.remote_addr.map(|addr| addr.to_string());
            info!(
                target: "veilroute::access",
                remote_addr = remote.as_deref().unwrap_or("-"),
                method = %entry.method,
                path = %entry.path,
                route = route.unwrap_or("-"),
                status = status.as_u16(),
                status_text = status.canonical_reason().unwrap_or(""),
                "request"
            );
        }
        Poll::Ready(result)
    }
}
