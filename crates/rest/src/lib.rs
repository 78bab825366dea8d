// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP server bootstrap
//!
//! Starts an axum server around caller-supplied routes, wraps them in a
//! default middleware chain and shuts the server down gracefully when a
//! `CancellationToken` is cancelled.
//!
//! # Module Structure
//!
//! - [`config`]: Server configuration and the options that build it
//! - [`error`]: Lifecycle errors and request-body decoding errors
//! - [`server`]: Router assembly, serving and coordinated shutdown
//! - [`middleware`]: Default chain, CORS policy, request logging, host check
//! - [`json`]: Response envelope and strict request-body decoding
//! - [`extractors`]: Axum extractors built on the JSON helpers
//!
//! # Example
//!
//! ```no_run
//! use axum::routing::get;
//! use rest::{run_http_server, with_port};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> rest::ServerResult<()> {
//! let token = CancellationToken::new();
//! tokio::spawn(rest::shutdown_signal(token.clone()));
//!
//! run_http_server(
//!     token,
//!     |router| router.route("/hello", get(|| async { "hello" })),
//!     [with_port("8080")],
//! )
//! .await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod extractors;
pub mod json;
pub mod middleware;
pub mod server;

pub use config::{
    DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT, ServerConfig, ServerOption, with_allowed_hosts,
    with_allowed_origins, with_cors, with_host, with_logger, with_middlewares, with_port,
    with_shutdown_timeout,
};
pub use error::{JsonError, ServerError, ServerResult};
pub use extractors::JsonBody;
pub use json::{
    Message, bad_request, decode_json, error_code, read_json, read_json_with_limit, write_error,
    write_json, write_message,
};
pub use middleware::{Middleware, REQUEST_ID_HEADER, RealIp, default_cors, default_middlewares};
pub use server::{HttpServer, run_http_server, shutdown_signal};
