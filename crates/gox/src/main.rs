// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Demo service
//!
//! Serves a greeting endpoint plus `/ready` and `/alive` until SIGINT or SIGTERM.

use anyhow::Result;
use axum::{Router, response::Response, routing::post};
use gox::{EnvError, EnvLoader, EnvResult, Validate};
use probe::{Probe, ProbeKind};
use rest::{JsonBody, run_http_server, shutdown_signal, with_logger, with_port, write_message};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Deserialize)]
struct AppConfig {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_http_port")]
    http_port: String,
    #[serde(default = "default_service_name")]
    service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_port() -> String {
    rest::DEFAULT_PORT.to_string()
}

fn default_service_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

impl Validate for AppConfig {
    fn validate(&self) -> EnvResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(EnvError::validation("SERVICE_NAME must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GreetRequest {
    name: String,
}

async fn greet(JsonBody(request): JsonBody<GreetRequest>) -> Response {
    write_message("Greeted", format!("hello {}", request.name))
}

fn routes(router: Router) -> Router {
    let router = router.route("/greet", post(greet));
    probe::new(
        Some(router),
        [
            Probe::new(ProbeKind::Aliveness, || Ok(())),
            Probe::new(ProbeKind::Readiness, || Ok(())),
        ],
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let config: AppConfig = EnvLoader::new().load()?;

    let logger = logger::new_service_logger(
        &config.log_level,
        &config.service_name,
        env!("CARGO_PKG_VERSION"),
    )?;
    logger.init_global()?;

    info!(port = %config.http_port, "starting demo service");

    let cancellation_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancellation_token.clone()));

    run_http_server(
        cancellation_token,
        routes,
        [with_port(config.http_port), with_logger(logger)],
    )
    .await?;

    Ok(())
}
