//! End-to-end server tests.
//!
//! Exercises the built server the way an embedder would: configure through
//! the builder, register handlers, then either dispatch through the engine
//! directly or run the listeners over real sockets with coordinated
//! shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use iris_core::{CallContext, CallError, LogHandle, Metadata, MethodDescriptor, UnaryResponse};
use iris_interceptor::cache::method_and_payload_key;
use iris_interceptor::stages::{LimitExceeded, RateLimiter, CACHE_HIT_HEADER, CACHE_HIT_VALUE};
use iris_interceptor::{KeyValueCache, MemoryCache};
use iris_server::{
    CacheConfig, ServeError, Server, ServerBuilder, ShutdownSignal, TaskError,
};
use iris_telemetry::MetricsRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct OpenGate;

impl RateLimiter for OpenGate {
    fn check(&self, _ctx: &CallContext) -> Result<(), LimitExceeded> {
        Ok(())
    }
}

struct ClosedGate;

impl RateLimiter for ClosedGate {
    fn check(&self, _ctx: &CallContext) -> Result<(), LimitExceeded> {
        Err(LimitExceeded("over budget".into()))
    }
}

fn cache_config(cache: &Arc<MemoryCache>) -> CacheConfig {
    CacheConfig::new(
        Arc::clone(cache) as Arc<dyn KeyValueCache>,
        method_and_payload_key(),
        Duration::from_secs(60),
    )
}

/// Builds a server with the full stage lineup and one counting echo handler.
fn echo_server(
    rpc_port: u32,
    limiter: Arc<dyn RateLimiter>,
    cache: &Arc<MemoryCache>,
) -> (Server, Arc<AtomicUsize>) {
    let mut server = ServerBuilder::new(rpc_port, LogHandle::new("e2e"))
        .with_rate_limiter(Some(limiter))
        .with_response_cache(cache_config(cache))
        .with_reflection()
        .build()
        .expect("valid configuration");

    let handler_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&handler_calls);
    server.handlers_mut().register("Users/Get", move |_ctx, req| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(UnaryResponse::new(req.into_payload()))
        }
    });

    (server, handler_calls)
}

#[tokio::test]
async fn test_second_identical_call_served_from_cache() {
    let cache = Arc::new(MemoryCache::new());
    let (server, handler_calls) = echo_server(50051, Arc::new(OpenGate), &cache);
    let engine = server.engine();
    let descriptor = MethodDescriptor::new("Users", "Get");

    // First call misses and runs the handler.
    let (result, metadata) = engine
        .dispatch(descriptor.clone(), Metadata::new(), Bytes::from_static(b"id=1"))
        .await;
    assert_eq!(result.unwrap().payload().as_ref(), b"id=1");
    assert_eq!(metadata.get(CACHE_HIT_HEADER), None);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);

    // Identical call is served from cache with the hit signal.
    let (result, metadata) = engine
        .dispatch(descriptor.clone(), Metadata::new(), Bytes::from_static(b"id=1"))
        .await;
    assert_eq!(result.unwrap().payload().as_ref(), b"id=1");
    assert_eq!(metadata.get(CACHE_HIT_HEADER), Some(CACHE_HIT_VALUE));
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);

    // A different payload keys differently and misses.
    let (result, metadata) = engine
        .dispatch(descriptor, Metadata::new(), Bytes::from_static(b"id=2"))
        .await;
    assert_eq!(result.unwrap().payload().as_ref(), b"id=2");
    assert_eq!(metadata.get(CACHE_HIT_HEADER), None);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limited_call_stops_at_first_stage() {
    let cache = Arc::new(MemoryCache::new());
    let (server, handler_calls) = echo_server(50051, Arc::new(ClosedGate), &cache);

    let (result, _metadata) = server
        .engine()
        .dispatch(
            MethodDescriptor::new("Users", "Get"),
            Metadata::new(),
            Bytes::from_static(b"id=1"),
        )
        .await;

    assert!(matches!(result, Err(CallError::ResourceExhausted(_))));
    assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_unknown_method_is_unimplemented() {
    let cache = Arc::new(MemoryCache::new());
    let (server, _handler_calls) = echo_server(50051, Arc::new(OpenGate), &cache);

    let (result, _metadata) = server
        .engine()
        .dispatch(
            MethodDescriptor::new("Users", "Delete"),
            Metadata::new(),
            Bytes::new(),
        )
        .await;

    assert!(matches!(result, Err(CallError::Unimplemented(_))));
}

#[test]
fn test_reflection_lists_registered_methods() {
    let cache = Arc::new(MemoryCache::new());
    let (server, _handler_calls) = echo_server(50051, Arc::new(OpenGate), &cache);

    assert!(server.engine().reflection_enabled());
    assert_eq!(server.engine().method_listing(), vec!["Users/Get"]);

    let without = ServerBuilder::new(50051, LogHandle::new("e2e"))
        .build()
        .unwrap();
    assert!(!without.engine().reflection_enabled());
}

/// Sends one raw HTTP/1.1 request and returns the whole response text.
async fn http_request(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write");

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.expect("read");
    String::from_utf8_lossy(&buf).into_owned()
}

async fn wait_for_port(port: u16) {
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("port {port} never came up");
}

fn post_rpc(method: &str, body: &str) -> String {
    format!(
        "POST /rpc/{method} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

#[tokio::test]
async fn test_serve_roundtrip_with_metrics_and_shutdown() {
    const RPC_PORT: u16 = 42817;
    const METRICS_PORT: u16 = 42818;

    let cache = Arc::new(MemoryCache::new());
    let mut server = ServerBuilder::new(u32::from(RPC_PORT), LogHandle::new("e2e"))
        .with_response_cache(cache_config(&cache))
        .with_metrics(u32::from(METRICS_PORT), MetricsRegistry::install().unwrap())
        .with_reflection()
        .build()
        .unwrap();

    server.handlers_mut().register("Echo/Say", |_ctx, req| async move {
        Ok(UnaryResponse::new(req.into_payload()))
    });
    let server = server.with_drain_timeout(Duration::from_millis(500));

    let shutdown = ShutdownSignal::new();
    let serving = tokio::spawn(server.serve_with_shutdown(shutdown.clone()));

    wait_for_port(RPC_PORT).await;
    wait_for_port(METRICS_PORT).await;

    // First call: miss, echoed body, no cache signal.
    let response = http_request(RPC_PORT, &post_rpc("Echo/Say", "ping")).await;
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.ends_with("ping"), "got: {response}");
    assert!(!response.contains("x-cache: hit"));

    // Second identical call: served from cache with the hit header.
    let response = http_request(RPC_PORT, &post_rpc("Echo/Say", "ping")).await;
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("x-cache: hit"), "got: {response}");

    // Unknown method maps to 501 with the JSON envelope.
    let response = http_request(RPC_PORT, &post_rpc("Echo/Missing", "x")).await;
    assert!(response.starts_with("HTTP/1.1 501"), "got: {response}");
    assert!(response.contains("UNIMPLEMENTED"), "got: {response}");

    // Reflection listing.
    let response = http_request(
        RPC_PORT,
        "GET /rpc HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("Echo/Say"), "got: {response}");

    // Metrics listener renders the call counter recorded by the chain.
    let response = http_request(
        METRICS_PORT,
        "GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("iris_calls_total"), "got: {response}");

    // External shutdown stops both listeners; serve returns cleanly.
    shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("serve should stop after shutdown")
        .expect("serve task should not panic");
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_bind_conflict_fails_serve() {
    const PORT: u16 = 42821;

    let _holder = tokio::net::TcpListener::bind(("0.0.0.0", PORT))
        .await
        .expect("bind holder");

    let server = ServerBuilder::new(u32::from(PORT), LogHandle::new("e2e"))
        .build()
        .unwrap();

    let result = server.serve_with_shutdown(ShutdownSignal::new()).await;
    assert!(matches!(
        result,
        Err(ServeError::Task(TaskError::Listener(_)))
    ));
}

#[tokio::test]
async fn test_metrics_listener_failure_stops_whole_server() {
    const RPC_PORT: u16 = 42825;
    const METRICS_PORT: u16 = 42826;

    let _holder = tokio::net::TcpListener::bind(("0.0.0.0", METRICS_PORT))
        .await
        .expect("bind holder");

    let server = ServerBuilder::new(u32::from(RPC_PORT), LogHandle::new("e2e"))
        .with_metrics(u32::from(METRICS_PORT), MetricsRegistry::install().unwrap())
        .build()
        .unwrap()
        .with_drain_timeout(Duration::from_millis(100));

    // The metrics task fails hard; the RPC listener must be interrupted
    // rather than serve on alone.
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        server.serve_with_shutdown(ShutdownSignal::new()),
    )
    .await
    .expect("server should stop once the metrics task fails");

    assert!(matches!(
        result,
        Err(ServeError::Task(TaskError::Listener(_)))
    ));
}

#[tokio::test]
async fn test_shutdown_before_any_traffic() {
    const RPC_PORT: u16 = 42823;

    let server = ServerBuilder::new(u32::from(RPC_PORT), LogHandle::new("e2e"))
        .build()
        .unwrap()
        .with_drain_timeout(Duration::from_millis(100));

    let shutdown = ShutdownSignal::new();
    shutdown.trigger();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        server.serve_with_shutdown(shutdown),
    )
    .await
    .expect("serve should stop promptly");
    assert!(outcome.is_ok());
}
