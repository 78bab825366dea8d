// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Reusable scaffolding for backend services
//!
//! This crate ties the toolkit together and adds the pieces that sit next to
//! the HTTP server in most services.
//!
//! # Module Structure
//!
//! - [`env`]: Typed configuration from environment variables
//! - [`pgpool`]: Postgres pool factory and error classification
//! - [`jwk`]: Background-refreshed JSON Web Key Set
//! - [`misc`]: Slice helpers
//! - [`error`]: Error types for the modules above
//!
//! The server, probe and logger crates are re-exported as [`rest`],
//! [`probe`] and [`logger`].

pub mod env;
pub mod error;
pub mod jwk;
pub mod misc;
pub mod pgpool;

pub use env::{EnvLoader, Validate, load_from_env, must_get_env};
pub use error::{EnvError, EnvResult, JwkError, PoolError};
pub use jwk::{KeyProvider, PublicKeyProvider};
pub use logger;
pub use pgpool::{ConnConfig, Pool, is_duplicate_constraint_error, is_no_row_error, new_pg_pool};
pub use probe;
pub use rest;
