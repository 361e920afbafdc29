//! Engine configuration.
//!
//! # Design
//! `ClientConfig` is a plain struct with defaults and builder helpers.
//! `from_env` reads overrides from `H1_*` environment variables, the same
//! way the mock server binary picks up `PORT`.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on the size of a response head.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

/// What happens to an error or panic raised by the completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackPolicy {
    /// Log it and carry on.
    #[default]
    Suppress,
    /// Log it and surface it from the request task, see
    /// [`AsyncHttpClient::finished`](crate::AsyncHttpClient::finished).
    Propagate,
}

impl FromStr for CallbackPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suppress" => Ok(CallbackPolicy::Suppress),
            "propagate" => Ok(CallbackPolicy::Propagate),
            _ => Err(ConfigError::InvalidPolicy(s.to_string())),
        }
    }
}

/// An HTTP proxy every request is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyInfo {
    pub server: String,
    pub port: u16,
}

impl FromStr for ProxyInfo {
    type Err = ConfigError;

    /// Parses `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (server, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidProxy(s.to_string()))?;
        let port = port.parse().map_err(|_| ConfigError::InvalidProxy(s.to_string()))?;
        if server.is_empty() {
            return Err(ConfigError::InvalidProxy(s.to_string()));
        }
        Ok(ProxyInfo {
            server: server.to_string(),
            port,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Deadline for the whole exchange, from resolution to the last body byte.
    pub timeout: Duration,
    pub callback_policy: CallbackPolicy,
    pub proxy: Option<ProxyInfo>,
    /// A response head longer than this fails the request.
    pub max_header_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            callback_policy: CallbackPolicy::default(),
            proxy: None,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl ClientConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_callback_policy(mut self, policy: CallbackPolicy) -> Self {
        self.callback_policy = policy;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyInfo) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_max_header_bytes(mut self, max: usize) -> Self {
        self.max_header_bytes = max;
        self
    }

    /// Defaults overridden by `H1_TIMEOUT_SECS`, `H1_CALLBACK_POLICY`,
    /// `H1_PROXY` and `H1_MAX_HEADER_BYTES` when they are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = lookup("H1_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| ConfigError::InvalidTimeout(secs.clone()))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(policy) = lookup("H1_CALLBACK_POLICY") {
            config.callback_policy = policy.parse()?;
        }
        if let Some(proxy) = lookup("H1_PROXY") {
            config.proxy = Some(proxy.parse()?);
        }
        if let Some(max) = lookup("H1_MAX_HEADER_BYTES") {
            config.max_header_bytes = max
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidMaxHeaderBytes(max.clone()))?;
        }
        Ok(config)
    }
}
