// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! This module provides the HTTP server lifecycle: router assembly around the
//! caller's routes, binding, serving on a background task and coordinated
//! graceful shutdown using `CancellationToken` with a hard deadline.

use std::{net::SocketAddr, sync::Arc};

use axum::{Router, middleware::from_fn_with_state};
use logger::Logger;
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::{ServerConfig, ServerOption},
    error::{ServerError, ServerResult},
    middleware::{
        abandon_on_hard_stop, allowed_hosts, apply_middlewares, default_cors,
        default_middlewares, request_logger,
    },
};

/// HTTP server with coordinated graceful shutdown
#[derive(Debug)]
pub struct HttpServer {
    /// Server configuration
    config: ServerConfig,
    /// Application router wrapped in infrastructure middleware
    router: Router,
    /// Cancellation token for coordinated shutdown
    cancellation_token: CancellationToken,
    /// Cancelled when the grace period runs out, abandoning in-flight requests
    hard_stop: CancellationToken,
}

impl HttpServer {
    /// Build a server from a route-construction callback and options
    ///
    /// `create_handler` receives an empty router and returns the application
    /// routes. Infrastructure middleware is then layered around the result so it
    /// also covers the 404 fallback.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` from the first option that rejects its input.
    pub fn new<F, I>(create_handler: F, options: I) -> ServerResult<Self>
    where
        F: FnOnce(Router) -> Router,
        I: IntoIterator<Item = ServerOption>,
    {
        let config = ServerConfig::default().apply(options)?;
        let hard_stop = CancellationToken::new();
        let router = Self::create_router(&config, create_handler(Router::new()), &hard_stop);

        Ok(Self {
            config,
            router,
            cancellation_token: CancellationToken::new(),
            hard_stop,
        })
    }

    /// Drive shutdown from an externally owned token
    #[must_use]
    pub fn with_cancellation_token(mut self, cancellation_token: CancellationToken) -> Self {
        self.cancellation_token = cancellation_token;
        self
    }

    /// Layer infrastructure middleware around the application routes
    ///
    /// Outer to inner: hard-stop guard, middleware chain, CORS, request
    /// logging, host check.
    fn create_router(
        config: &ServerConfig,
        routes: Router,
        hard_stop: &CancellationToken,
    ) -> Router {
        let mut router = routes;

        if !config.allowed_hosts.is_empty() {
            let hosts: Arc<[String]> = config.allowed_hosts.clone().into();
            router = router.layer(from_fn_with_state(hosts, allowed_hosts));
        }

        match &config.logger {
            Some(logger) => {
                router = router.layer(from_fn_with_state(logger.clone(), request_logger));
            }
            None => warn!("no logger is set, requests will not be logged"),
        }

        router = router.layer(config.cors.clone().unwrap_or_else(default_cors));

        router = if config.middlewares.is_empty() {
            apply_middlewares(router, &default_middlewares())
        } else {
            apply_middlewares(router, &config.middlewares)
        };

        router.layer(from_fn_with_state(hard_stop.clone(), abandon_on_hard_stop))
    }

    /// Bind the configured address and serve until the token is cancelled
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// or any error from [`HttpServer::serve`].
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until the token is cancelled
    ///
    /// Once cancelled, new connections are refused and in-flight requests get
    /// the configured grace period to finish. Requests still running after
    /// that are dropped mid-flight and answered with 503.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ShutdownTimeout` if requests are still running when
    /// the grace period ends, `ServerError::Serve` if serving stops on its own,
    /// and `ServerError::Startup` if the listener address cannot be read.
    pub async fn serve(self, listener: TcpListener) -> ServerResult<()> {
        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        let Self {
            config,
            router,
            cancellation_token,
            hard_stop,
        } = self;
        let logger = config.logger.unwrap_or_else(Logger::nop);
        let grace_period = config.shutdown_timeout;

        logger.in_scope(|| info!(address = %actual_addr, "start http server"));

        let drain = CancellationToken::new();
        let drain_signal = drain.clone();
        let mut serving = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { drain_signal.cancelled().await })
            .await
        });

        tokio::select! {
            () = cancellation_token.cancelled() => {}
            finished = &mut serving => {
                logger.in_scope(|| error!("http server stopped before a shutdown signal"));
                return finished?.map_err(|source| ServerError::Serve { source });
            }
        }

        logger.in_scope(|| {
            info!(grace_period = ?grace_period, "http server received a shutdown signal");
        });
        drain.cancel();

        if let Ok(finished) = timeout(grace_period, &mut serving).await {
            finished?.map_err(|source| ServerError::Shutdown { source })?;
            logger.in_scope(|| info!("http server exited properly"));
            Ok(())
        } else {
            hard_stop.cancel();
            serving.abort();
            logger.in_scope(|| {
                error!(grace_period = ?grace_period, "http server shutdown timed out");
            });
            Err(ServerError::ShutdownTimeout { grace_period })
        }
    }

    /// Returns a clone of the cancellation token for coordinated shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Initiates graceful shutdown by cancelling the server's cancellation token
    pub fn shutdown(&self) {
        info!("programmatic shutdown requested");
        self.cancellation_token.cancel();
    }

    /// Run server for testing
    ///
    /// Binds, spawns the server and returns the bound address, the token that
    /// stops it and the handle yielding its outcome.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address.
    pub async fn run_for_testing(
        self,
    ) -> ServerResult<(SocketAddr, CancellationToken, JoinHandle<ServerResult<()>>)> {
        let addr = self.config.socket_addr();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        let token = self.cancellation_token();
        let handle = tokio::spawn(self.serve(listener));

        Ok((actual_addr, token, handle))
    }

    /// Fully assembled router
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Build, start and run an HTTP server until `cancellation_token` is cancelled
///
/// Blocks the calling task for the whole lifetime of the server.
///
/// # Errors
///
/// Returns the first configuration error, a bind failure, or a shutdown that
/// overran its grace period.
pub async fn run_http_server<F, I>(
    cancellation_token: CancellationToken,
    create_handler: F,
    options: I,
) -> ServerResult<()>
where
    F: FnOnce(Router) -> Router,
    I: IntoIterator<Item = ServerOption>,
{
    HttpServer::new(create_handler, options)?
        .with_cancellation_token(cancellation_token)
        .run()
        .await
}

/// Cancel `cancellation_token` on SIGINT or SIGTERM
///
/// Returns early if the token is cancelled by someone else first.
pub async fn shutdown_signal(cancellation_token: CancellationToken) {
    let signal_received = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(error = %e, "failed to register signal handlers");
                        return std::future::pending().await;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install CTRL+C signal handler");
                return std::future::pending().await;
            }
            "CTRL+C"
        }
    };

    tokio::select! {
        signal_name = signal_received => {
            warn!("Shutdown signal {} received, cancelling all operations...", signal_name);
            cancellation_token.cancel();
        },
        () = cancellation_token.cancelled() => {}
    }
}
