// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests wiring the toolkit crates together through the umbrella

use std::{
    net::{IpAddr, Ipv4Addr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use gox::{
    probe::{self, Probe, ProbeKind},
    rest::{HttpServer, with_host, with_port, with_shutdown_timeout},
};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn probes_served_next_to_application_routes() {
    let ready = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ready);

    let routes = move |router| {
        probe::new(
            Some(router),
            [Probe::new(ProbeKind::Readiness, move || {
                if flag.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("warming up"))
                }
            })],
        )
    };

    let (addr, token, handle) = HttpServer::new(
        routes,
        [
            with_host(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            with_port("0"),
            with_shutdown_timeout(Duration::from_secs(2)),
        ],
    )
    .expect("Failed to create server")
    .run_for_testing()
    .await
    .expect("Failed to start test server");

    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/ready"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.expect("invalid JSON");
    assert_eq!(body, json!({ "status": "warming up" }));

    ready.store(true, Ordering::SeqCst);

    let response = client
        .get(format!("http://{addr}/ready"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    // default chain wraps the probe routes too
    assert_eq!(response.headers()["x-frame-options"], "deny");

    let response = client
        .get(format!("http://{addr}/alive"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);

    token.cancel();
    handle
        .await
        .expect("server task panicked")
        .expect("server failed");
}
