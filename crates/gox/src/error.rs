// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the environment loader, the Postgres pool and the JWK provider

use config::ConfigError;
use thiserror::Error;

/// Errors raised while loading configuration from the environment
#[derive(Error, Debug)]
pub enum EnvError {
    /// Variables could not be read or deserialized
    #[error("failed to load configuration from environment: {source}")]
    Load {
        /// Underlying config error
        #[from]
        source: ConfigError,
    },

    /// Values were read but rejected by `Validate`
    #[error("invalid configuration: {message}")]
    Validation {
        /// Error message
        message: String,
    },
}

impl EnvError {
    /// Shorthand for [`EnvError::Validation`]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// True when a required variable was missing
    pub fn is_missing_field(&self) -> bool {
        matches!(self, Self::Load { source } if source.to_string().contains("missing field"))
    }
}

/// Result type for environment loading
pub type EnvResult<T> = Result<T, EnvError>;

/// Errors raised while creating a Postgres pool
#[derive(Error, Debug)]
pub enum PoolError {
    /// Connection settings could not be loaded
    #[error(transparent)]
    Config(#[from] EnvError),

    /// The pool could not open a connection
    #[error("failed to connect to postgres at {host}:{port}: {source}")]
    Connect {
        /// Database host
        host: String,
        /// Database port
        port: u16,
        /// Underlying sqlx error
        #[source]
        source: sqlx::Error,
    },

    /// The database did not answer a ping
    #[error("postgres ping failed: {source}")]
    Ping {
        /// Underlying sqlx error
        #[source]
        source: sqlx::Error,
    },
}

/// Errors raised by the JWK key provider
#[derive(Error, Debug)]
pub enum JwkError {
    /// The key set URL does not parse
    #[error("invalid JWK set URL {url:?}: {source}")]
    InvalidUrl {
        /// URL as supplied
        url: String,
        /// Parser error
        #[source]
        source: url::ParseError,
    },

    /// A zero refresh interval was given
    #[error("JWK refresh interval must be greater than 0")]
    InvalidInterval,

    /// Fetching or decoding the key set failed
    #[error("failed to fetch JWK set from {url}: {source}")]
    Fetch {
        /// Key set URL
        url: String,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// The provider was closed
    #[error("JWK provider is closed")]
    Closed,
}
