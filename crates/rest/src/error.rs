// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! Server lifecycle errors and the request-body decoding errors returned by the
//! JSON helpers.

use std::{net::SocketAddr, time::Duration};

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised while configuring, starting or stopping the HTTP server
#[derive(Error, Debug)]
pub enum ServerError {
    /// An option rejected its input
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server startup errors
    #[error("Server startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The serving loop stopped before a shutdown was requested
    #[error("Server stopped unexpectedly: {source}")]
    Serve {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server shutdown errors
    #[error("Server shutdown failed: {source}")]
    Shutdown {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// In-flight requests did not drain within the grace period
    #[error("Server shutdown did not complete within {grace_period:?}")]
    ShutdownTimeout {
        /// Grace period that was exceeded
        grace_period: Duration,
    },

    /// Task join errors for async operations
    #[error("Task join error: {source}")]
    TaskJoin {
        /// Underlying tokio join error
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ServerError {
    /// Shorthand for [`ServerError::Config`]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::TaskJoin { source }
    }
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Reasons a request body could not be decoded
///
/// The `Display` text is meant to be sent back to the client as is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JsonError {
    /// Malformed JSON syntax
    #[error("request body contains badly-formed JSON (at position {offset})")]
    Syntax {
        /// Byte offset of the error
        offset: usize,
    },

    /// Input ended in the middle of a value
    #[error("request body contains badly-formed JSON")]
    Truncated,

    /// A field holds a value of the wrong type
    #[error("request body contains an invalid value for the {field:?} field (at position {offset})")]
    InvalidValue {
        /// Path of the offending field
        field: String,
        /// Byte offset of the error
        offset: usize,
    },

    /// The body itself has the wrong type, such as an array where an object
    /// is expected
    #[error("request body contains an invalid JSON value (at position {offset})")]
    InvalidBody {
        /// Byte offset of the error
        offset: usize,
    },

    /// A field the target type does not know about
    #[error("request body contains unknown field {field:?}")]
    UnknownField {
        /// Name of the unknown field
        field: String,
    },

    /// A required field is absent
    #[error("request body is missing the {field:?} field")]
    MissingField {
        /// Name of the missing field
        field: String,
    },

    /// Nothing but whitespace
    #[error("request body must not be empty")]
    Empty,

    /// Body exceeds the size limit
    #[error("request body must not be larger than {limit} bytes")]
    TooLarge {
        /// Limit in bytes
        limit: usize,
    },

    /// More than one JSON value in the body
    #[error("request body must only contain a single JSON object")]
    TrailingData,

    /// Any other failure
    #[error("Internal Server Error")]
    Internal,
}

impl JsonError {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}
