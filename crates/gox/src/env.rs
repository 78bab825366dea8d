// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration from environment variables
//!
//! Variable names are lowercased, stripped of the optional prefix and matched
//! against the fields of the target type. Defaults come from
//! `#[serde(default = ...)]`; a field without one is required. Values stay
//! strings until a field asks for a number or a bool, so string fields are
//! passed through untouched.
//!
//! ```no_run
//! use gox::env::{EnvLoader, Validate};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AppConfig {
//!     #[serde(default = "default_port")]
//!     http_port: u16,
//!     log_level: String,
//! }
//!
//! fn default_port() -> u16 {
//!     9091
//! }
//!
//! impl Validate for AppConfig {}
//!
//! let config: AppConfig = EnvLoader::new().load()?;
//! # Ok::<(), gox::EnvError>(())
//! ```

use std::collections::HashMap;

use config::{Config, Environment};
use serde::de::DeserializeOwned;

use crate::error::{EnvError, EnvResult};

/// Checks run after a configuration has been deserialized
pub trait Validate {
    /// Reject values that deserialize fine but make no sense
    fn validate(&self) -> EnvResult<()> {
        Ok(())
    }
}

/// Builder for loading a typed configuration from the environment
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
    source: Option<HashMap<String, String>>,
}

impl EnvLoader {
    /// Read every process environment variable
    pub fn new() -> Self {
        Self::default()
    }

    /// Only read variables starting with `{prefix}_`, with the prefix removed
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Read from `vars` instead of the process environment
    #[must_use]
    pub fn with_source(mut self, vars: HashMap<String, String>) -> Self {
        self.source = Some(vars);
        self
    }

    /// Deserialize and validate a `T`
    pub fn load<T>(&self) -> EnvResult<T>
    where
        T: DeserializeOwned + Validate,
    {
        let environment = match &self.prefix {
            Some(prefix) => Environment::with_prefix(prefix),
            None => Environment::default(),
        }
        .source(self.source.clone());

        let value: T = Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        value.validate()?;
        Ok(value)
    }
}

/// Load a `T` from the process environment without a prefix
pub fn load_from_env<T>() -> EnvResult<T>
where
    T: DeserializeOwned + Validate,
{
    EnvLoader::new().load()
}

/// Value of `key`, or `default` when it is unset
///
/// A variable set to an empty string counts as set.
pub fn must_get_env(key: &str, default: &str) -> String {
    std::env::var_os(key).map_or_else(
        || default.to_string(),
        |value| value.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct AppConfig {
        #[serde(default = "default_env")]
        env: String,
        log_level: String,
        #[serde(default = "default_http_port")]
        http_port: u16,
    }

    fn default_env() -> String {
        "local".to_string()
    }

    fn default_http_port() -> u16 {
        9091
    }

    impl Validate for AppConfig {
        fn validate(&self) -> EnvResult<()> {
            if ["debug", "info", "warn", "error"].contains(&self.log_level.as_str()) {
                Ok(())
            } else {
                Err(EnvError::validation(format!(
                    "unsupported log level {:?}",
                    self.log_level
                )))
            }
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_fill_missing_values() {
        let config: AppConfig = EnvLoader::new()
            .with_source(vars(&[("LOG_LEVEL", "debug")]))
            .load()
            .unwrap();
        assert_eq!(
            config,
            AppConfig {
                env: "local".to_string(),
                log_level: "debug".to_string(),
                http_port: 9091,
            }
        );
    }

    #[test]
    fn values_are_parsed() {
        let config: AppConfig = EnvLoader::new()
            .with_source(vars(&[
                ("ENV", "prod"),
                ("LOG_LEVEL", "info"),
                ("HTTP_PORT", "8081"),
            ]))
            .load()
            .unwrap();
        assert_eq!(config.env, "prod");
        assert_eq!(config.http_port, 8081);
    }

    #[test]
    fn required_field_missing() {
        let err = EnvLoader::new()
            .with_source(vars(&[("ENV", "prod")]))
            .load::<AppConfig>()
            .unwrap_err();
        assert!(matches!(err, EnvError::Load { .. }));
        assert!(err.is_missing_field(), "{err}");
    }

    #[test]
    fn unparsable_value_is_a_load_error() {
        let err = EnvLoader::new()
            .with_source(vars(&[("LOG_LEVEL", "info"), ("HTTP_PORT", "eighty")]))
            .load::<AppConfig>()
            .unwrap_err();
        assert!(matches!(err, EnvError::Load { .. }));
    }

    #[test]
    fn validation_runs_after_loading() {
        let err = EnvLoader::new()
            .with_source(vars(&[("LOG_LEVEL", "chatty")]))
            .load::<AppConfig>()
            .unwrap_err();
        assert!(matches!(err, EnvError::Validation { .. }));
        assert!(err.to_string().contains("chatty"));
    }

    #[test]
    fn prefix_is_stripped() {
        #[derive(Debug, Deserialize)]
        struct Db {
            host: String,
            port: u16,
        }
        impl Validate for Db {}

        let db: Db = EnvLoader::new()
            .with_prefix("DB")
            .with_source(vars(&[
                ("DB_HOST", "db.internal"),
                ("DB_PORT", "6543"),
                ("HOST", "ignored"),
            ]))
            .load()
            .unwrap();
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.port, 6543);
    }

    #[test]
    fn string_values_are_not_reinterpreted() {
        #[derive(Debug, Deserialize)]
        struct Creds {
            user: String,
            password: String,
            ratio: String,
            port: u16,
            tls: bool,
        }
        impl Validate for Creds {}

        let creds: Creds = EnvLoader::new()
            .with_prefix("DB")
            .with_source(vars(&[
                ("DB_USER", "True"),
                ("DB_PASSWORD", "0123"),
                ("DB_RATIO", "1.50"),
                ("DB_PORT", "05432"),
                ("DB_TLS", "true"),
            ]))
            .load()
            .unwrap();
        assert_eq!(creds.user, "True");
        assert_eq!(creds.password, "0123");
        assert_eq!(creds.ratio, "1.50");
        assert_eq!(creds.port, 5432);
        assert!(creds.tls);
    }

    #[test]
    fn must_get_env_falls_back_to_default() {
        assert_eq!(
            must_get_env("GOX_TEST_SURELY_UNSET_VARIABLE", "fallback"),
            "fallback"
        );
    }

    #[test]
    fn must_get_env_reads_set_variables() {
        // cargo sets this for every test binary
        assert_eq!(must_get_env("CARGO_PKG_NAME", "fallback"), "gox");
    }
}
