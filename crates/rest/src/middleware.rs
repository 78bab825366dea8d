// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Middleware module for HTTP request processing
//!
//! This module provides the default middleware chain, the default CORS policy,
//! request logging and the allowed-host check layered around every router the
//! server builds.

use std::{
    any::Any,
    fmt,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
        header::{
            ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, ETAG, EXPIRES, HOST, IF_MATCH,
            IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE, LINK, PRAGMA,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
    },
    middleware::{Next, from_fn},
    response::{IntoResponse, Response},
    routing::Route,
};
use logger::Logger;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
};
use tracing::{error, info, warn};

use crate::{
    error::{ServerError, ServerResult},
    json::write_error,
};

/// Header carrying the per-request identifier
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Requests running longer than this are answered with a timeout status
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How long browsers may cache a CORS preflight
pub const DEFAULT_CORS_MAX_AGE: Duration = Duration::from_secs(300);

const X_CSRF_TOKEN: HeaderName = HeaderName::from_static("x-csrf-token");
const X_ACCEL_EXPIRES: HeaderName = HeaderName::from_static("x-accel-expires");
const TRUE_CLIENT_IP: HeaderName = HeaderName::from_static("true-client-ip");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const EPOCH: &str = "Thu, 01 Jan 1970 00:00:00 UTC";
const NO_CACHE_CONTROL: &str = "no-cache, no-store, no-transform, must-revalidate, private, max-age=0";

const CONDITIONAL_HEADERS: [HeaderName; 6] = [
    ETAG,
    IF_MATCH,
    IF_MODIFIED_SINCE,
    IF_NONE_MATCH,
    IF_RANGE,
    IF_UNMODIFIED_SINCE,
];

/// A router-wrapping function
///
/// Middlewares are applied in list order with the first one ending up
/// outermost, so it sees the request first and the response last.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Router) -> Router + Send + Sync>);

impl Middleware {
    /// Wrap an arbitrary router transformation
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Wrap a tower layer
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<std::convert::Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(move |router: Router| router.layer(layer.clone()))
    }

    /// Wrap `router` with this middleware
    pub fn apply(&self, router: Router) -> Router {
        (self.0)(router)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

/// Wrap `router` with every middleware, first one outermost
pub fn apply_middlewares(router: Router, middlewares: &[Middleware]) -> Router {
    middlewares
        .iter()
        .rev()
        .fold(router, |router, middleware| middleware.apply(router))
}

/// The chain used when the caller supplies no middleware of its own
///
/// Outer to inner: request timeout, request-id tagging and propagation,
/// client IP resolution, panic recovery, security headers, no-cache headers.
pub fn default_middlewares() -> Vec<Middleware> {
    vec![
        Middleware::from_layer(TimeoutLayer::new(DEFAULT_REQUEST_TIMEOUT)),
        Middleware::from_layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid)),
        Middleware::from_layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER)),
        Middleware::from_layer(from_fn(real_ip)),
        Middleware::from_layer(CatchPanicLayer::custom(handle_panic)),
        Middleware::from_layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        )),
        Middleware::from_layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("deny"),
        )),
        Middleware::from_layer(from_fn(no_cache)),
    ]
}

/// Default CORS policy
///
/// Credentials are allowed, which rules out a `*` origin, so the request
/// origin is mirrored back instead.
pub fn default_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE, X_CSRF_TOKEN])
        .expose_headers([LINK])
        .allow_credentials(true)
        .max_age(DEFAULT_CORS_MAX_AGE)
}

/// Default CORS policy restricted to the given origins
pub fn cors_with_origins(origins: &[String]) -> ServerResult<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| ServerError::config(format!("invalid CORS origin {origin:?}: {e}")))
        })
        .collect::<ServerResult<Vec<_>>>()?;

    Ok(default_cors().allow_origin(AllowOrigin::list(origins)))
}

/// Address of the client that made the request
///
/// Inserted as a request extension by the default chain. Proxy headers take
/// precedence over the peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealIp(pub IpAddr);

/// Resolve the client address from proxy headers or the peer address
pub async fn real_ip(mut req: Request, next: Next) -> Response {
    let ip = client_ip_from_headers(req.headers()).or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    });
    if let Some(ip) = ip {
        req.extensions_mut().insert(RealIp(ip));
    }
    next.run(req).await
}

fn client_ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    let parse = |value: &str| value.trim().parse::<IpAddr>().ok();

    [TRUE_CLIENT_IP, X_REAL_IP]
        .iter()
        .find_map(|name| headers.get(name)?.to_str().ok().and_then(parse))
        .or_else(|| {
            let forwarded = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
            forwarded.split(',').next().and_then(parse)
        })
}

/// Strip conditional request headers and mark the response uncacheable
pub async fn no_cache(mut req: Request, next: Next) -> Response {
    for name in &CONDITIONAL_HEADERS {
        req.headers_mut().remove(name);
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(EXPIRES, HeaderValue::from_static(EPOCH));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_CONTROL));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(X_ACCEL_EXPIRES, HeaderValue::from_static("0"));
    response
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(panic = detail, "request handler panicked");

    write_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

/// Log one event per request through the configured logger
///
/// Server errors are logged at ERROR, everything else at INFO.
pub async fn request_logger(State(logger): State<Logger>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or_default().to_owned();
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);
    let started = Instant::now();

    let response = next.run(req).await;

    let latency = started.elapsed();
    let status = response.status();
    logger.in_scope(|| {
        if status >= StatusCode::INTERNAL_SERVER_ERROR {
            error!(
                code = status.as_u16(),
                query = %query,
                latency = ?latency,
                request_id = request_id.as_deref(),
                "request handled: {method} {path}"
            );
        } else {
            info!(
                code = status.as_u16(),
                query = %query,
                latency = ?latency,
                request_id = request_id.as_deref(),
                "request handled: {method} {path}"
            );
        }
    });

    response
}

/// Drop the request and answer 503 once `hard_stop` is cancelled
///
/// The handler future is dropped at its next await point, so nothing after it
/// runs.
pub(crate) async fn abandon_on_hard_stop(
    State(hard_stop): State<CancellationToken>,
    req: Request,
    next: Next,
) -> Response {
    tokio::select! {
        response = next.run(req) => response,
        () = hard_stop.cancelled() => {
            warn!("request abandoned after the shutdown grace period");
            write_error(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
        }
    }
}

/// Reject requests whose host is not in the list
pub async fn allowed_hosts(
    State(hosts): State<Arc<[String]>>,
    req: Request,
    next: Next,
) -> Response {
    let allowed = request_host(&req)
        .is_some_and(|host| hosts.iter().any(|allowed| allowed.eq_ignore_ascii_case(host)));

    if allowed {
        next.run(req).await
    } else {
        write_error(StatusCode::BAD_REQUEST, "invalid host")
    }
}

fn request_host(req: &Request) -> Option<&str> {
    req.headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| req.uri().host())
        .map(strip_port)
}

fn strip_port(host: &str) -> &str {
    if let Some(bracketed) = host.strip_prefix('[') {
        return bracketed.split(']').next().unwrap_or(bracketed);
    }
    match host.rsplit_once(':') {
        Some((name, _)) if !name.contains(':') => name,
        _ => host,
    }
}
