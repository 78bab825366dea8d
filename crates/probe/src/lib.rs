// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Health probes
//!
//! Registers `GET /ready` and `GET /alive` on a router. Each endpoint runs the
//! checks registered for its kind, in registration order, and reports the
//! first failure. A kind without checks always succeeds. Results are never
//! cached.
//!
//! # Example
//!
//! ```no_run
//! use probe::{Probe, ProbeKind};
//!
//! let router = probe::new(
//!     None,
//!     [Probe::new(ProbeKind::Readiness, || Ok(()))],
//! );
//! # let _ = router;
//! ```

use std::{fmt, net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Path of the readiness endpoint
pub const READY_PATH: &str = "/ready";

/// Path of the aliveness endpoint
pub const ALIVE_PATH: &str = "/alive";

/// Errors raised by the standalone probe server
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The serving loop failed
    #[error("Probe server failed: {source}")]
    Serve {
        /// Underlying IO error
        source: std::io::Error,
    },
}

/// Result type for the probe server
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Which endpoint a check belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Ready to receive traffic, served on `/ready`
    Readiness,
    /// Process is alive, served on `/alive`
    Aliveness,
}

impl ProbeKind {
    fn status(self) -> &'static str {
        match self {
            Self::Readiness => "ready",
            Self::Aliveness => "alive",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Readiness => f.write_str("readiness"),
            Self::Aliveness => f.write_str("aliveness"),
        }
    }
}

type Check = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A named check for one probe kind
#[derive(Clone)]
pub struct Probe {
    kind: ProbeKind,
    check: Check,
}

impl Probe {
    /// Register `check` under `kind`
    pub fn new<F>(kind: ProbeKind, check: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            kind,
            check: Arc::new(check),
        }
    }

    /// Kind this check reports on
    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    /// Run the check
    pub fn run(&self) -> anyhow::Result<()> {
        (self.check)()
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Shorthand for [`Probe::new`]
pub fn with_probe<F>(kind: ProbeKind, check: F) -> Probe
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    Probe::new(kind, check)
}

/// Read-only set of probes shared by the endpoints
#[derive(Debug, Clone)]
pub struct ProbeRegistry {
    probes: Arc<[Probe]>,
}

impl ProbeRegistry {
    /// Freeze the given probes, keeping their order
    pub fn new<I>(probes: I) -> Self
    where
        I: IntoIterator<Item = Probe>,
    {
        Self {
            probes: probes.into_iter().collect(),
        }
    }

    /// Run every check of `kind` in order, stopping at the first failure
    pub fn check(&self, kind: ProbeKind) -> anyhow::Result<()> {
        self.probes
            .iter()
            .filter(|probe| probe.kind == kind)
            .try_for_each(Probe::run)
    }

    /// Router serving the two probe endpoints
    pub fn router(&self) -> Router {
        Router::new()
            .route(READY_PATH, get(readiness))
            .route(ALIVE_PATH, get(aliveness))
            .with_state(self.clone())
    }

    /// Add the probe endpoints to `router`
    ///
    /// # Panics
    ///
    /// Panics if `router` already serves `/ready` or `/alive`.
    pub fn register(&self, router: Router) -> Router {
        router.merge(self.router())
    }

    fn respond(&self, kind: ProbeKind) -> Response {
        match self.check(kind) {
            Ok(()) => (StatusCode::OK, Json(json!({ "status": kind.status() }))).into_response(),
            Err(err) => {
                warn!(probe = %kind, error = %err, "probe check failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "status": err.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new([])
    }
}

async fn readiness(State(registry): State<ProbeRegistry>) -> Response {
    registry.respond(ProbeKind::Readiness)
}

async fn aliveness(State(registry): State<ProbeRegistry>) -> Response {
    registry.respond(ProbeKind::Aliveness)
}

/// Probe endpoints on `router`, or on a fresh router when none is given
///
/// # Panics
///
/// Panics if `router` already serves `/ready` or `/alive`.
pub fn new<I>(router: Option<Router>, probes: I) -> Router
where
    I: IntoIterator<Item = Probe>,
{
    ProbeRegistry::new(probes).register(router.unwrap_or_default())
}

/// Serve `router` on `addr` until `cancellation_token` is cancelled
///
/// Meant for a dedicated probe port next to the main server.
///
/// # Errors
///
/// Returns `ProbeError::Bind` if the address cannot be bound and
/// `ProbeError::Serve` if serving fails.
pub async fn run(
    addr: SocketAddr,
    router: Router,
    cancellation_token: CancellationToken,
) -> ProbeResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ProbeError::Bind {
            address: addr,
            source,
        })?;
    serve(listener, router, cancellation_token).await
}

/// Serve `router` on a bound listener until `cancellation_token` is cancelled
///
/// # Errors
///
/// Returns `ProbeError::Serve` if serving fails.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancellation_token: CancellationToken,
) -> ProbeResult<()> {
    if let Ok(address) = listener.local_addr() {
        info!(%address, "start probe server");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(cancellation_token.cancelled_owned())
        .await
        .map_err(|source| ProbeError::Serve { source })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;

    async fn call(router: Router, path: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn no_probes_means_healthy() {
        let router = new(None, []);

        let (status, body) = call(router.clone(), READY_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ready" }));

        let (status, body) = call(router, ALIVE_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "alive" }));
    }

    #[tokio::test]
    async fn failing_readiness_reports_error() {
        let router = new(
            None,
            [
                Probe::new(ProbeKind::Readiness, || Ok(())),
                Probe::new(ProbeKind::Readiness, || Err(anyhow!("db down"))),
                Probe::new(ProbeKind::Aliveness, || Ok(())),
            ],
        );

        let (status, body) = call(router.clone(), READY_PATH).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "status": "db down" }));

        // other kinds are unaffected
        let (status, _) = call(router, ALIVE_PATH).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn error_text_is_escaped() {
        let router = new(
            None,
            [with_probe(ProbeKind::Aliveness, || {
                Err(anyhow!("bad \"quote\""))
            })],
        );

        let (status, body) = call(router, ALIVE_PATH).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "bad \"quote\"");
    }

    #[test]
    fn checks_fail_fast_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&calls);
        let third = Arc::clone(&calls);

        let registry = ProbeRegistry::new([
            Probe::new(ProbeKind::Readiness, move || {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Probe::new(ProbeKind::Readiness, || Err(anyhow!("not yet"))),
            Probe::new(ProbeKind::Readiness, move || {
                third.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ]);

        let err = registry.check(ProbeKind::Readiness).unwrap_err();
        assert_eq!(err.to_string(), "not yet");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn checks_run_on_every_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = ProbeRegistry::new([Probe::new(ProbeKind::Aliveness, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })]);

        registry.check(ProbeKind::Aliveness).unwrap();
        registry.check(ProbeKind::Aliveness).unwrap();
        registry.check(ProbeKind::Readiness).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn existing_routes_are_kept() {
        let base = Router::new().route("/version", get(|| async { "1.0" }));
        let router = new(Some(base), []);

        let response = router
            .clone()
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, _) = call(router, READY_PATH).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn standalone_server_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let server = tokio::spawn(serve(listener, new(None, []), token.clone()));

        let body: serde_json::Value = reqwest::get(format!("http://{addr}{ALIVE_PATH}"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "alive");

        token.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = occupied.local_addr().unwrap();

        let result = run(addr, new(None, []), CancellationToken::new()).await;
        assert!(matches!(result, Err(ProbeError::Bind { .. })));
    }
}
