//! Client configuration
//!
//! Configuration comes from a TOML file, optionally overridden by `WAAS_*`
//! environment variables, and is turned into [`InitParams`] for the
//! coordinator. Connection mode is derived from the credentials with
//! [`ConnectionMode::select`].

use crate::errors::{WaasError, WaasResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default proxy URL used when no API key is configured
pub const DEFAULT_PROXY_URL: &str = "http://localhost:8091";

/// Default MPC Key Service endpoint
pub const DEFAULT_KEY_SERVICE_URL: &str = "https://api.developer.coinbase.com/waas/mpc_keys";

/// Default MPC Wallet Service endpoint
pub const DEFAULT_WALLET_SERVICE_URL: &str = "https://api.developer.coinbase.com/waas/mpc_wallets";

/// Default Pool Service endpoint
pub const DEFAULT_POOL_SERVICE_URL: &str = "https://api.developer.coinbase.com/waas/pools";

const ENV_PREFIX: &str = "WAAS_";

/// Direct endpoints of the three services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoints {
    /// MPC Key Service base URL
    pub key_service: String,
    /// MPC Wallet Service base URL
    pub wallet_service: String,
    /// Pool Service base URL
    pub pool_service: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            key_service: DEFAULT_KEY_SERVICE_URL.to_string(),
            wallet_service: DEFAULT_WALLET_SERVICE_URL.to_string(),
            pool_service: DEFAULT_POOL_SERVICE_URL.to_string(),
        }
    }
}

/// API key credentials for direct mode
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// API key resource name
    pub api_key_name: String,
    /// PEM-encoded EC private key
    pub private_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key_name", &self.api_key_name)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// How the client reaches the services
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Secure connection to each service's direct endpoint with API key auth
    Direct {
        /// Credentials used to sign requests
        credentials: Credentials,
    },
    /// Insecure connection to a local proxy that holds the credentials
    Proxy {
        /// Proxy base URL
        url: String,
    },
}

impl ConnectionMode {
    /// Pick the connection mode from the supplied credentials.
    ///
    /// Both credentials present selects direct mode and ignores the proxy
    /// URL. Both empty selects proxy mode. Supplying only one of them is
    /// rejected. The private key is not parsed here.
    pub fn select(api_key_name: &str, private_key: &str, proxy_url: &str) -> WaasResult<Self> {
        match (api_key_name.is_empty(), private_key.is_empty()) {
            (false, false) => Ok(ConnectionMode::Direct {
                credentials: Credentials {
                    api_key_name: api_key_name.to_string(),
                    private_key: private_key.to_string(),
                },
            }),
            (true, true) => {
                if proxy_url.is_empty() {
                    return Err(WaasError::invalid_argument(
                        "proxy URL must be set when no API key is provided",
                    ));
                }
                Ok(ConnectionMode::Proxy {
                    url: proxy_url.to_string(),
                })
            }
            (true, false) => Err(WaasError::invalid_argument(
                "API key name is empty but a private key was provided",
            )),
            (false, true) => Err(WaasError::invalid_argument(
                "private key is empty but an API key name was provided",
            )),
        }
    }

    /// True for the secure direct mode
    pub fn is_secure(&self) -> bool {
        matches!(self, ConnectionMode::Direct { .. })
    }
}

/// Parameters accepted by `initialize`
#[derive(Clone, PartialEq, Eq)]
pub struct InitParams {
    /// API key name, empty for proxy mode
    pub api_key_name: String,
    /// EC private key, empty for proxy mode
    pub private_key: String,
    /// Proxy URL used in proxy mode
    pub proxy_url: String,
    /// Run the crypto engine in simulator mode
    pub is_simulator: bool,
}

impl InitParams {
    /// Parameters for proxy mode
    pub fn proxy(proxy_url: impl Into<String>) -> Self {
        Self {
            api_key_name: String::new(),
            private_key: String::new(),
            proxy_url: proxy_url.into(),
            is_simulator: false,
        }
    }

    /// Parameters for direct mode
    pub fn direct(api_key_name: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            api_key_name: api_key_name.into(),
            private_key: private_key.into(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            is_simulator: false,
        }
    }

    /// Toggle simulator mode
    pub fn with_simulator(mut self, is_simulator: bool) -> Self {
        self.is_simulator = is_simulator;
        self
    }

    /// Connection mode implied by these parameters
    pub fn connection_mode(&self) -> WaasResult<ConnectionMode> {
        ConnectionMode::select(&self.api_key_name, &self.private_key, &self.proxy_url)
    }
}

impl fmt::Debug for InitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitParams")
            .field("api_key_name", &self.api_key_name)
            .field("private_key", &"<redacted>")
            .field("proxy_url", &self.proxy_url)
            .field("is_simulator", &self.is_simulator)
            .finish()
    }
}

/// Full client configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API key name, empty for proxy mode
    pub api_key_name: String,
    /// EC private key, empty for proxy mode
    pub private_key: String,
    /// Proxy URL used in proxy mode
    pub proxy_url: String,
    /// Run the crypto engine in simulator mode
    pub is_simulator: bool,
    /// Direct service endpoints
    pub endpoints: ServiceEndpoints,
    /// Interval between pending-operation polls
    pub poll_interval_ms: u64,
    /// Interval between long-running operation checks
    pub wait_interval_ms: u64,
    /// Per-request HTTP timeout
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key_name: String::new(),
            private_key: String::new(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            is_simulator: false,
            endpoints: ServiceEndpoints::default(),
            poll_interval_ms: 1_000,
            wait_interval_ms: 1_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> WaasResult<Self> {
        let config: ClientConfig = toml::from_str(text)
            .map_err(|e| WaasError::config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> WaasResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            WaasError::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded client configuration");
        Ok(config)
    }

    /// Apply `WAAS_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> WaasResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `WAAS_*` overrides from an explicit variable list
    pub fn merge_with_vars<I>(&mut self, vars: I) -> WaasResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "API_KEY_NAME" => self.api_key_name = value,
                "PRIVATE_KEY" => self.private_key = value,
                "PROXY_URL" => self.proxy_url = value,
                "IS_SIMULATOR" => self.is_simulator = parse_env(&key, &value)?,
                "POLL_INTERVAL_MS" => self.poll_interval_ms = parse_env(&key, &value)?,
                "WAIT_INTERVAL_MS" => self.wait_interval_ms = parse_env(&key, &value)?,
                "REQUEST_TIMEOUT_MS" => self.request_timeout_ms = parse_env(&key, &value)?,
                "KEY_SERVICE_URL" => self.endpoints.key_service = value,
                "WALLET_SERVICE_URL" => self.endpoints.wallet_service = value,
                "POOL_SERVICE_URL" => self.endpoints.pool_service = value,
                _ => {}
            }
        }
        self.validate()
    }

    /// Check intervals and timeouts are usable
    pub fn validate(&self) -> WaasResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(WaasError::config("poll_interval_ms must be greater than zero"));
        }
        if self.wait_interval_ms == 0 {
            return Err(WaasError::config("wait_interval_ms must be greater than zero"));
        }
        if self.request_timeout_ms == 0 {
            return Err(WaasError::config("request_timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Initialization parameters carried by this configuration
    pub fn init_params(&self) -> InitParams {
        InitParams {
            api_key_name: self.api_key_name.clone(),
            private_key: self.private_key.clone(),
            proxy_url: self.proxy_url.clone(),
            is_simulator: self.is_simulator,
        }
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Wait interval as a duration
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key_name", &self.api_key_name)
            .field("private_key", &"<redacted>")
            .field("proxy_url", &self.proxy_url)
            .field("is_simulator", &self.is_simulator)
            .field("endpoints", &self.endpoints)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("wait_interval_ms", &self.wait_interval_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> WaasResult<T> {
    value
        .parse()
        .map_err(|_| WaasError::config(format!("{key} has an invalid value: {value:?}")))
}
