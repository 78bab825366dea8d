// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Custom extractors
//!
//! [`JsonBody`] decodes request bodies with the strict rules of
//! [`read_json`](crate::json::read_json), rejecting with a JSON error envelope
//! instead of axum's plain-text rejections.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    response::Response,
};
use serde::de::DeserializeOwned;

use crate::{
    error::JsonError,
    json::{read_json, write_error},
    middleware::RealIp,
};

/// Strict JSON body extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = JsonError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        read_json(req).await.map(JsonBody)
    }
}

impl<S> FromRequestParts<S> for RealIp
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = parts.extensions.get::<RealIp>() {
            return Ok(*ip);
        }

        // Without the default chain fall back to the peer address
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| RealIp(addr.ip()))
            .ok_or_else(|| {
                write_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "client address is not available",
                )
            })
    }
}
