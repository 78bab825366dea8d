// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration
//!
//! A [`ServerConfig`] starts from defaults and is refined by a list of
//! [`ServerOption`]s. Each option validates its own input; the first one that
//! fails aborts startup and the rest are never applied.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use logger::Logger;
use tower_http::cors::CorsLayer;

use crate::{
    error::{ServerError, ServerResult},
    middleware::{Middleware, cors_with_origins},
};

/// Port used when no `with_port` option is given
pub const DEFAULT_PORT: &str = "8080";

/// How long in-flight requests may take to finish once shutdown starts
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the server needs before it starts
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub host: IpAddr,
    /// Listen port, `0` picks a free one
    pub port: u16,
    /// Replaces the default chain when non-empty, first one outermost
    pub middlewares: Vec<Middleware>,
    /// Accepted `Host` values; empty accepts any
    pub allowed_hosts: Vec<String>,
    /// Replaces the default CORS policy when set
    pub cors: Option<CorsLayer>,
    /// Request and lifecycle logging; none disables request logging
    pub logger: Option<Logger>,
    /// Hard deadline for draining in-flight requests
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            middlewares: Vec::new(),
            allowed_hosts: Vec::new(),
            cors: None,
            logger: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Apply options in order, stopping at the first failure
    pub fn apply<I>(self, options: I) -> ServerResult<Self>
    where
        I: IntoIterator<Item = ServerOption>,
    {
        options
            .into_iter()
            .try_fold(self, |config, option| option.apply(config))
    }

    /// Get socket address for server binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

type ApplyFn = Box<dyn FnOnce(ServerConfig) -> ServerResult<ServerConfig> + Send>;

/// A validating configuration step
pub struct ServerOption(ApplyFn);

impl ServerOption {
    /// Build an option from a transformation
    pub fn new<F>(apply: F) -> Self
    where
        F: FnOnce(ServerConfig) -> ServerResult<ServerConfig> + Send + 'static,
    {
        Self(Box::new(apply))
    }

    /// Run the transformation
    pub fn apply(self, config: ServerConfig) -> ServerResult<ServerConfig> {
        (self.0)(config)
    }
}

impl fmt::Debug for ServerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOption").finish_non_exhaustive()
    }
}

/// Listen on `port`, given as text
pub fn with_port(port: impl Into<String>) -> ServerOption {
    let port = port.into();
    ServerOption::new(move |mut config| {
        config.port = port
            .trim()
            .parse()
            .map_err(|e| ServerError::config(format!("invalid port {port:?}: {e}")))?;
        Ok(config)
    })
}

/// Listen on `host` instead of all interfaces
pub fn with_host(host: IpAddr) -> ServerOption {
    ServerOption::new(move |mut config| {
        config.host = host;
        Ok(config)
    })
}

/// Replace the default middleware chain
pub fn with_middlewares(middlewares: Vec<Middleware>) -> ServerOption {
    ServerOption::new(move |mut config| {
        config.middlewares = middlewares;
        Ok(config)
    })
}

/// Only serve requests addressed to one of `hosts`
pub fn with_allowed_hosts(hosts: Vec<String>) -> ServerOption {
    ServerOption::new(move |mut config| {
        if let Some(blank) = hosts.iter().find(|host| host.trim().is_empty()) {
            return Err(ServerError::config(format!(
                "allowed host must not be blank: {blank:?}"
            )));
        }
        config.allowed_hosts = hosts;
        Ok(config)
    })
}

/// Replace the default CORS policy
pub fn with_cors(cors: CorsLayer) -> ServerOption {
    ServerOption::new(move |mut config| {
        config.cors = Some(cors);
        Ok(config)
    })
}

/// Keep the default CORS policy but only for `origins`
pub fn with_allowed_origins(origins: Vec<String>) -> ServerOption {
    ServerOption::new(move |mut config| {
        config.cors = Some(cors_with_origins(&origins)?);
        Ok(config)
    })
}

/// Enable request logging and lifecycle logs through `logger`
pub fn with_logger(logger: Logger) -> ServerOption {
    ServerOption::new(move |mut config| {
        config.logger = Some(logger);
        Ok(config)
    })
}

/// Set the grace period for draining in-flight requests
pub fn with_shutdown_timeout(timeout: Duration) -> ServerOption {
    ServerOption::new(move |mut config| {
        if timeout.is_zero() {
            return Err(ServerError::config("shutdown timeout must be greater than 0"));
        }
        config.shutdown_timeout = timeout;
        Ok(config)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port.to_string(), DEFAULT_PORT);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert!(config.middlewares.is_empty());
        assert!(config.allowed_hosts.is_empty());
        assert!(config.cors.is_none());
        assert!(config.logger.is_none());
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn options_apply_in_order() -> ServerResult<()> {
        let config = ServerConfig::default().apply([
            with_port("9000"),
            with_host(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            with_port(" 9001 "),
            with_shutdown_timeout(Duration::from_secs(2)),
        ])?;
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9001");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        Ok(())
    }

    #[test]
    fn first_failing_option_stops_the_rest() {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);

        let result = ServerConfig::default().apply([
            with_port("not-a-port"),
            ServerOption::new(move |config| {
                flag.store(true, Ordering::SeqCst);
                Ok(config)
            }),
        ]);

        assert!(matches!(result, Err(ServerError::Config { .. })));
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[test]
    fn port_out_of_range() {
        let err = ServerConfig::default()
            .apply([with_port("70000")])
            .unwrap_err();
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn blank_allowed_host_is_rejected() {
        let result = ServerConfig::default().apply([with_allowed_hosts(vec![
            "api.example.com".to_string(),
            " ".to_string(),
        ])]);
        assert!(matches!(result, Err(ServerError::Config { .. })));
    }

    #[test]
    fn zero_shutdown_timeout_is_rejected() {
        let result = ServerConfig::default().apply([with_shutdown_timeout(Duration::ZERO)]);
        assert!(matches!(result, Err(ServerError::Config { .. })));
    }

    #[test]
    fn allowed_origins_set_cors() -> ServerResult<()> {
        let config = ServerConfig::default()
            .apply([with_allowed_origins(vec!["https://app.example".to_string()])])?;
        assert!(config.cors.is_some());
        Ok(())
    }

    #[test]
    fn logger_presence_is_explicit() -> ServerResult<()> {
        let config = ServerConfig::default().apply([with_logger(Logger::nop())])?;
        assert!(config.logger.is_some());
        Ok(())
    }
}
