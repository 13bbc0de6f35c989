//! Server facade and listeners.
//!
//! [`Server`] is the immutable product of the builder. [`Server::serve`]
//! runs the RPC listener and, when metrics were configured, the metrics
//! listener concurrently under one [`TaskGroup`](crate::runner::TaskGroup):
//! the first listener to stop (cleanly or not) interrupts the other, and
//! `serve` returns once both have stopped.
//!
//! Transport: unary calls arrive as `POST /rpc/{service}/{method}` with an
//! opaque byte body. Response metadata pairs become response headers, so the
//! cache stage's `x-cache: hit` signal is visible on the wire. Errors render
//! a JSON envelope. When reflection is enabled, `GET /rpc` lists registered
//! methods.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;

use iris_core::{CallError, LogHandle, Metadata, MethodDescriptor};
use iris_telemetry::MetricsRegistry;

use crate::engine::RpcEngine;
use crate::runner::{TaskError, TaskGroup};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// HTTP response body type used by both listeners.
pub type ResponseBody = Full<Bytes>;

/// HTTP response type used by both listeners.
pub type HttpResponse = Response<ResponseBody>;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of [`Server::serve`].
#[derive(Debug, Error)]
pub enum ServeError {
    /// A service task failed; peers were interrupted before this surfaced.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// The assembled RPC server.
///
/// Handlers register on the built server, then [`Server::serve`] blocks
/// until shutdown.
///
/// # Example
///
/// ```ignore
/// let mut server = ServerBuilder::new(50051, log).build()?;
/// server.handlers_mut().register("Echo/Say", |_ctx, req| async move {
///     Ok(UnaryResponse::new(req.into_payload()))
/// });
/// server.serve().await?;
/// ```
pub struct Server {
    engine: RpcEngine,
    rpc_port: u16,
    http_port: Option<u16>,
    metrics: Option<MetricsRegistry>,
    drain_timeout: Duration,
    log: LogHandle,
}

impl Server {
    pub(crate) fn new(
        engine: RpcEngine,
        rpc_port: u16,
        http_port: Option<u16>,
        metrics: Option<MetricsRegistry>,
        log: LogHandle,
    ) -> Self {
        Self {
            engine,
            rpc_port,
            http_port,
            metrics,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            log,
        }
    }

    /// Returns the RPC engine.
    #[must_use]
    pub fn engine(&self) -> &RpcEngine {
        &self.engine
    }

    /// Returns the RPC engine for handler registration.
    pub fn engine_mut(&mut self) -> &mut RpcEngine {
        &mut self.engine
    }

    /// Returns the handler registry for registration.
    pub fn handlers_mut(&mut self) -> &mut iris_core::HandlerRegistry {
        self.engine.handlers_mut()
    }

    /// Returns the validated RPC port.
    #[must_use]
    pub fn rpc_port(&self) -> u16 {
        self.rpc_port
    }

    /// Returns the metrics listener port when metrics were configured.
    #[must_use]
    pub fn http_port(&self) -> Option<u16> {
        self.http_port
    }

    /// Overrides how long the RPC listener waits for in-flight connections
    /// on shutdown.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Serves until SIGTERM/SIGINT or a fatal listener failure.
    ///
    /// # Errors
    ///
    /// Returns the first task failure; callers map it to a non-zero exit.
    pub async fn serve(self) -> Result<(), ServeError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.serve_with_shutdown(shutdown).await
    }

    /// Serves until `shutdown` triggers or a fatal listener failure.
    ///
    /// # Errors
    ///
    /// Returns the first task failure; a clean interrupt is `Ok(())`.
    pub async fn serve_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServeError> {
        let engine = Arc::new(self.engine);
        let log = self.log;
        let mut group = TaskGroup::new();

        let rpc_interrupt = shutdown.clone();
        group.add(
            run_rpc_listener(
                Arc::clone(&engine),
                self.rpc_port,
                self.drain_timeout,
                shutdown.clone(),
                log.clone(),
            ),
            move || rpc_interrupt.trigger(),
        );

        if let (Some(port), Some(registry)) = (self.http_port, self.metrics) {
            let metrics_shutdown = ShutdownSignal::new();
            let metrics_interrupt = metrics_shutdown.clone();
            group.add(
                run_metrics_listener(registry, port, metrics_shutdown, log.clone()),
                move || metrics_interrupt.trigger(),
            );
        }

        group.run().await?;
        tracing::info!(parent: log.span(), "server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("rpc_port", &self.rpc_port)
            .field("http_port", &self.http_port)
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}

/// Accepts RPC connections until interrupted, then drains in-flight
/// connections up to the drain timeout.
async fn run_rpc_listener(
    engine: Arc<RpcEngine>,
    port: u16,
    drain_timeout: Duration,
    shutdown: ShutdownSignal,
    log: LogHandle,
) -> Result<(), TaskError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TaskError::Listener(format!("failed to bind rpc listener on {addr}: {e}")))?;

    tracing::info!(parent: log.span(), %addr, "rpc listener started");
    let tracker = ConnectionTracker::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    let engine = Arc::clone(&engine);
                    let token = tracker.acquire();
                    let conn_shutdown = shutdown.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req: Request<Incoming>| {
                            let engine = Arc::clone(&engine);
                            async move { Ok::<_, std::convert::Infallible>(handle_rpc_request(&engine, req).await) }
                        });

                        let conn = http1::Builder::new().serve_connection(io, service);
                        tokio::select! {
                            result = conn => {
                                if let Err(e) = result {
                                    tracing::debug!(%remote_addr, error = %e, "connection error");
                                }
                            }
                            () = conn_shutdown.recv() => {}
                        }
                        drop(token);
                    });
                }
                Err(e) => {
                    tracing::error!(parent: log.span(), error = %e, "failed to accept connection");
                }
            },
            () = shutdown.recv() => break,
        }
    }

    tracing::info!(
        parent: log.span(),
        active = tracker.active(),
        "rpc listener stopping, draining connections"
    );

    tokio::select! {
        () = tracker.drained() => {}
        () = tokio::time::sleep(drain_timeout) => {
            tracing::warn!(
                parent: log.span(),
                active = tracker.active(),
                "drain timeout reached, closing remaining connections"
            );
        }
    }

    Ok(())
}

/// Serves `GET /metrics` until interrupted; the interrupt closes the
/// listener immediately, without draining.
async fn run_metrics_listener(
    registry: MetricsRegistry,
    port: u16,
    shutdown: ShutdownSignal,
    log: LogHandle,
) -> Result<(), TaskError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        TaskError::Listener(format!("failed to bind metrics listener on {addr}: {e}"))
    })?;

    tracing::info!(parent: log.span(), %addr, "metrics listener started");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _remote_addr)) => {
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req: Request<Incoming>| {
                            let registry = registry.clone();
                            async move {
                                Ok::<_, std::convert::Infallible>(handle_metrics_request(&registry, &req))
                            }
                        });
                        let _ = http1::Builder::new().serve_connection(io, service).await;
                    });
                }
                // Unlike the RPC listener, the metrics listener has no
                // drain obligation: any IO failure here is fatal to the
                // task and triggers coordinated shutdown.
                Err(e) => {
                    tracing::error!(parent: log.span(), error = %e, "metrics listener failed");
                    return Err(TaskError::Listener(format!(
                        "metrics listener on {addr} failed to accept: {e}"
                    )));
                }
            },
            () = shutdown.recv() => break,
        }
    }

    drop(listener);
    tracing::info!(parent: log.span(), "metrics listener stopped");
    Ok(())
}

/// Routes one request on the RPC listener.
async fn handle_rpc_request(engine: &Arc<RpcEngine>, req: Request<Incoming>) -> HttpResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::GET && path == "/rpc" {
        return handle_reflection(engine);
    }

    let Some(descriptor) = parse_rpc_path(&method, &path) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("no route for {method} {path}"),
        );
    };

    let request_metadata = metadata_from_headers(req.headers());

    let payload = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "BODY_READ_ERROR",
                &format!("failed to read request body: {e}"),
            );
        }
    };

    let (result, response_metadata) = engine.dispatch(descriptor, request_metadata, payload).await;

    match result {
        Ok(response) => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/octet-stream");
            builder = apply_metadata(builder, &response_metadata);
            builder
                .body(Full::new(response.into_payload()))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
        }
        Err(error) => call_error_response(&error, &response_metadata),
    }
}

/// Serves the reflection listing, or 404 when reflection is disabled.
fn handle_reflection(engine: &Arc<RpcEngine>) -> HttpResponse {
    if !engine.reflection_enabled() {
        return error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "service reflection is disabled",
        );
    }

    let body = serde_json::json!({ "methods": engine.method_listing() });
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Routes one request on the metrics listener.
fn handle_metrics_request(registry: &MetricsRegistry, req: &Request<Incoming>) -> HttpResponse {
    if req.method() == Method::GET && req.uri().path() == "/metrics" {
        Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(registry.render())))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
    } else {
        error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "metrics are at /metrics")
    }
}

/// Extracts `Service/Method` from `POST /rpc/{service}/{method}`.
fn parse_rpc_path(method: &Method, path: &str) -> Option<MethodDescriptor> {
    if method != Method::POST {
        return None;
    }
    let rest = path.strip_prefix("/rpc/")?;
    let (service, method_name) = rest.split_once('/')?;
    if service.is_empty() || method_name.is_empty() || method_name.contains('/') {
        return None;
    }
    Some(MethodDescriptor::new(service, method_name))
}

/// Copies string-valued request headers into call metadata.
fn metadata_from_headers(headers: &http::HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            // Fresh metadata is never sealed.
            let _ = metadata.insert(name.as_str(), value);
        }
    }
    metadata
}

/// Renders response metadata pairs as response headers.
fn apply_metadata(
    mut builder: http::response::Builder,
    metadata: &Metadata,
) -> http::response::Builder {
    for (key, value) in metadata.iter() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(key),
            HeaderValue::try_from(value),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
}

/// Renders a [`CallError`] as its wire status plus the JSON envelope.
fn call_error_response(error: &CallError, metadata: &Metadata) -> HttpResponse {
    let body = serde_json::json!({
        "error": {
            "code": error.code(),
            "message": error.to_string(),
        }
    });

    let mut builder = Response::builder()
        .status(error.http_status())
        .header("content-type", "application/json");
    builder = apply_metadata(builder, metadata);
    builder
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Renders a transport-level error envelope.
fn error_response(status: StatusCode, code: &str, message: &str) -> HttpResponse {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message,
        }
    });

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rpc_path() {
        let desc = parse_rpc_path(&Method::POST, "/rpc/Echo/Say").unwrap();
        assert_eq!(desc.full_name(), "Echo/Say");

        assert!(parse_rpc_path(&Method::GET, "/rpc/Echo/Say").is_none());
        assert!(parse_rpc_path(&Method::POST, "/rpc/Echo").is_none());
        assert!(parse_rpc_path(&Method::POST, "/rpc//Say").is_none());
        assert!(parse_rpc_path(&Method::POST, "/rpc/Echo/").is_none());
        assert!(parse_rpc_path(&Method::POST, "/rpc/Echo/Say/extra").is_none());
        assert!(parse_rpc_path(&Method::POST, "/other").is_none());
    }

    #[test]
    fn test_metadata_from_headers() {
        let mut headers = http::HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        headers.insert("authorization", HeaderValue::from_static("bearer t"));

        let metadata = metadata_from_headers(&headers);
        assert_eq!(metadata.get("x-request-id"), Some("abc"));
        assert_eq!(metadata.get("authorization"), Some("bearer t"));
    }

    #[test]
    fn test_call_error_response_envelope() {
        let mut metadata = Metadata::new();
        metadata.insert("x-cache", "hit").unwrap();

        let response =
            call_error_response(&CallError::ResourceExhausted("limited".into()), &metadata);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("x-cache"),
            Some(&HeaderValue::from_static("hit"))
        );
    }

    #[test]
    fn test_error_response_is_json() {
        let response = error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "nope");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type"),
            Some(&HeaderValue::from_static("application/json"))
        );
    }
}
