// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Postgres connection pool factory
//!
//! Connection settings come from `DB_HOST`, `DB_DATABASE`, `DB_PORT`, `DB_USER`
//! and `DB_PASSWORD`, each with a development default. TLS is disabled.

use std::fmt;

use anyhow::bail;
use probe::{Probe, ProbeKind};
use serde::Deserialize;
use sqlx::{
    Connection,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
};
use tracing::info;

use crate::{
    env::{EnvLoader, Validate},
    error::{EnvError, EnvResult, PoolError},
};

/// Pool handle returned by [`new_pg_pool`]
pub type Pool = sqlx::PgPool;

/// Prefix of the connection variables
pub const ENV_PREFIX: &str = "DB";

/// SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

/// Postgres connection settings
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnConfig {
    /// `DB_HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// `DB_DATABASE`
    #[serde(default = "default_database")]
    pub database: String,
    /// `DB_PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// `DB_USER`
    #[serde(default = "default_user")]
    pub user: String,
    /// `DB_PASSWORD`
    #[serde(default = "default_password")]
    pub password: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_database() -> String {
    "users".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "test".to_string()
}

fn default_password() -> String {
    "test".to_string()
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            database: default_database(),
            port: default_port(),
            user: default_user(),
            password: default_password(),
        }
    }
}

impl fmt::Debug for ConnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnConfig")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Validate for ConnConfig {
    fn validate(&self) -> EnvResult<()> {
        if self.host.trim().is_empty() {
            return Err(EnvError::validation("DB_HOST must not be empty"));
        }
        if self.port == 0 {
            return Err(EnvError::validation("DB_PORT must be greater than 0"));
        }
        Ok(())
    }
}

impl ConnConfig {
    /// Load from the `DB_*` process environment variables
    pub fn from_env() -> EnvResult<Self> {
        EnvLoader::new().with_prefix(ENV_PREFIX).load()
    }

    /// Driver options for these settings
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(PgSslMode::Disable)
    }
}

/// Connect a pool and make sure the database answers
///
/// Settings are read from the environment when `config` is `None`.
pub async fn new_pg_pool(config: Option<ConnConfig>) -> Result<Pool, PoolError> {
    let config = match config {
        Some(config) => config,
        None => ConnConfig::from_env()?,
    };

    let pool = PgPoolOptions::new()
        .connect_with(config.connect_options())
        .await
        .map_err(|source| PoolError::Connect {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

    ping(&pool).await?;
    info!(host = %config.host, port = config.port, database = %config.database, "postgres pool ready");
    Ok(pool)
}

/// Round trip to the database on a pooled connection
pub async fn ping(pool: &Pool) -> Result<(), PoolError> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|source| PoolError::Ping { source })?;
    conn.ping()
        .await
        .map_err(|source| PoolError::Ping { source })
}

/// The query matched no row
pub fn is_no_row_error(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::RowNotFound)
}

/// A unique constraint named `constraint` was violated
pub fn is_duplicate_constraint_error(err: &sqlx::Error, constraint: &str) -> bool {
    err.as_database_error().is_some_and(|db| {
        db.code().as_deref() == Some(UNIQUE_VIOLATION) && db.constraint() == Some(constraint)
    })
}

/// Readiness probe that fails once `pool` has been closed
pub fn readiness_probe(pool: Pool) -> Probe {
    Probe::new(ProbeKind::Readiness, move || {
        if pool.is_closed() {
            bail!("postgres pool is closed");
        }
        Ok(())
    })
}
