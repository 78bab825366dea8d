// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! JSON request and response helpers
//!
//! Responses share a small `{"code", "message"}` envelope. Request bodies are
//! decoded strictly: exactly one JSON value, no unknown fields, bounded size.
//! Every decoding failure maps onto a [`JsonError`] whose text can be returned
//! to the client as is.

use std::{error::Error as _, fmt::Display};

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::error::Category;

use crate::error::JsonError;

/// Content type written by every helper in this module
pub const APPLICATION_JSON: &str = "application/json";

/// Upper bound on a request body read by [`read_json`]
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024; // 1MB limit

/// Standard response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Machine-readable code, see [`error_code`]
    pub code: String,
    /// Human-readable text
    pub message: String,
}

impl Message {
    /// Build an envelope
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Error code for an HTTP status
///
/// Statuses without a dedicated code report `ErrInternalServer`.
pub fn error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "ErrBadRequest",
        StatusCode::UNAUTHORIZED => "ErrUnauthorized",
        StatusCode::FORBIDDEN => "ErrForbidden",
        StatusCode::CONFLICT => "ErrAlreadyExist",
        _ => "ErrInternalServer",
    }
}

/// Serialize `value` as the response body
///
/// If serialization fails the status and content type are kept and the error
/// text becomes the body.
pub fn write_json<T>(status: StatusCode, value: &T) -> Response
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(value).unwrap_or_else(|err| err.to_string().into_bytes());
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))],
        body,
    )
        .into_response()
}

/// 200 response carrying a [`Message`]
pub fn write_message(code: impl Into<String>, message: impl Into<String>) -> Response {
    write_json(StatusCode::OK, &Message::new(code, message))
}

/// Error response whose code is derived from the status
pub fn write_error(status: StatusCode, message: impl Into<String>) -> Response {
    write_json(status, &Message::new(error_code(status), message))
}

/// 400 response carrying the error text
pub fn bad_request(err: impl Display) -> Response {
    write_error(StatusCode::BAD_REQUEST, err.to_string())
}

/// Decode the body of `req` with the default size limit
pub async fn read_json<T>(req: Request) -> Result<T, JsonError>
where
    T: DeserializeOwned,
{
    read_json_with_limit(req.into_body(), DEFAULT_MAX_BODY_BYTES).await
}

/// Decode a body, failing once more than `limit` bytes have been read
pub async fn read_json_with_limit<T>(body: Body, limit: usize) -> Result<T, JsonError>
where
    T: DeserializeOwned,
{
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|err| {
        if is_length_limit(&err) {
            JsonError::TooLarge { limit }
        } else {
            JsonError::Internal
        }
    })?;
    decode_json(&bytes)
}

/// Decode a complete buffer
///
/// Fields the target type ignores are reported as unknown, and so is anything
/// after the first value.
pub fn decode_json<T>(bytes: &[u8]) -> Result<T, JsonError>
where
    T: DeserializeOwned,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(JsonError::Empty);
    }

    let mut unknown = Vec::new();
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let decoded = {
        let mut on_ignored = |path: serde_ignored::Path<'_>| unknown.push(path.to_string());
        serde_path_to_error::deserialize::<_, T>(serde_ignored::Deserializer::new(
            &mut de,
            &mut on_ignored,
        ))
    };
    let value = decoded.map_err(|err| classify(bytes, &err))?;

    if let Some(field) = unknown.into_iter().next() {
        return Err(JsonError::UnknownField { field });
    }

    de.end().map_err(|_| JsonError::TrailingData)?;
    Ok(value)
}

fn classify(bytes: &[u8], err: &serde_path_to_error::Error<serde_json::Error>) -> JsonError {
    let inner = err.inner();
    let offset = byte_offset(bytes, inner.line(), inner.column());

    match inner.classify() {
        Category::Syntax => JsonError::Syntax { offset },
        Category::Eof => JsonError::Truncated,
        Category::Data => {
            let message = inner.to_string();
            if message.starts_with("unknown field") {
                backticked(&message).map_or(JsonError::Internal, |field| {
                    JsonError::UnknownField {
                        field: field.to_string(),
                    }
                })
            } else if message.starts_with("missing field") {
                backticked(&message).map_or(JsonError::Internal, |field| {
                    JsonError::MissingField {
                        field: field.to_string(),
                    }
                })
            } else if message.starts_with("invalid") {
                if err.path().iter().next().is_none() {
                    JsonError::InvalidBody { offset }
                } else {
                    JsonError::InvalidValue {
                        field: err.path().to_string(),
                        offset,
                    }
                }
            } else {
                JsonError::Internal
            }
        }
        Category::Io => JsonError::Internal,
    }
}

// serde_json reports 1-based lines and columns
fn byte_offset(bytes: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = bytes
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    line_start + column
}

fn backticked(message: &str) -> Option<&str> {
    let (_, rest) = message.split_once('`')?;
    let (name, _) = rest.split_once('`')?;
    Some(name)
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        write_error(self.status_code(), self.to_string())
    }
}
