//! Client and pagination configuration.

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// Default budget of materialized pages per read cursor.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Default number of eviction sweeps per garbage collection.
pub const DEFAULT_GC_SWEEPS: usize = 2;

/// Memory budget of a multi-stream read cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    /// Soft cap on pages holding rows in memory.
    pub max_pages: usize,
    /// Upper bound on eviction sweeps per collection.
    pub gc_sweeps: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            gc_sweeps: DEFAULT_GC_SWEEPS,
        }
    }
}

impl PaginationConfig {
    /// Set the page budget.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Set the sweep bound.
    pub fn with_gc_sweeps(mut self, gc_sweeps: usize) -> Self {
        self.gc_sweeps = gc_sweeps;
        self
    }
}

/// Configuration for [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host name, or a full base URL containing `://`.
    pub host: String,
    /// API key, sent as the basic-auth user.
    pub key: String,
    /// API secret, sent as the basic-auth password.
    pub secret: String,
    /// Use HTTPS when `host` has no scheme.
    pub secure: bool,
    /// Explicit port.
    pub port: Option<u16>,
    /// Request timeout.
    pub timeout: Duration,
    /// Custom user agent string.
    pub user_agent: String,
    /// Budget for read cursors created by the client.
    pub pagination: PaginationConfig,
}

impl ClientConfig {
    /// Create a configuration for `host` with the given credentials.
    pub fn new(host: impl Into<String>, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            secret: secret.into(),
            secure: true,
            port: None,
            timeout: Duration::from_secs(60),
            user_agent: format!("tempoiq-rust/{}", env!("CARGO_PKG_VERSION")),
            pagination: PaginationConfig::default(),
        }
    }

    /// Read the configuration from the environment.
    ///
    /// `TEMPOIQ_HOST`, `TEMPOIQ_KEY` and `TEMPOIQ_SECRET` are required;
    /// `TEMPOIQ_PORT` and `TEMPOIQ_SECURE` (`true`/`false`) are optional.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            env::var(name).map_err(|_| Error::Config(format!("{} is not set", name)))
        };
        let mut config = Self::new(var("TEMPOIQ_HOST")?, var("TEMPOIQ_KEY")?, var("TEMPOIQ_SECRET")?);

        if let Ok(port) = env::var("TEMPOIQ_PORT") {
            let port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid TEMPOIQ_PORT '{}'", port)))?;
            config.port = Some(port);
        }
        if let Ok(secure) = env::var("TEMPOIQ_SECURE") {
            config.secure = match secure.to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(Error::Config(format!("invalid TEMPOIQ_SECURE '{}'", secure))),
            };
        }
        Ok(config)
    }

    /// Choose HTTPS or HTTP for scheme-less hosts.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set an explicit port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the read cursor page budget.
    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Base URL of the v2 API, ending in `/v2/`.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = if self.host.contains("://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            let scheme = if self.secure { "https://" } else { "http://" };
            format!("{}{}", scheme, self.host)
        };
        if let Some(port) = self.port {
            url.push_str(&format!(":{}", port));
        }
        url.push_str("/v2/");
        Ok(Url::parse(&url)?)
    }
}
