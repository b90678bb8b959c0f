//! Service client construction and connection-mode handling
//!
//! A [`ServiceClient`] owns one shared `reqwest::Client` and a REST client
//! per service. In direct mode every service is reached at its own endpoint
//! with API key tokens; in proxy mode all three share the proxy URL and
//! requests go out unauthenticated.
//!
//! Direct endpoints must use `https`, so a bearer token never crosses the
//! wire in clear text. Loopback hosts are exempt for local testing.

use crate::auth::ApiKeyAuth;
use crate::key::HttpKeyService;
use crate::pool::HttpPoolService;
use crate::transport::RestTransport;
use crate::wallet::HttpWalletService;
use reqwest::Url;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use waas_core::{
    ClientConfig, ConnectionMode, ServiceConnector, ServiceEndpoints, ServiceHandles, ServiceKind,
    WaasError, WaasResult,
};

/// Transport options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Base URLs chosen for a connection mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    /// MPC Key Service base
    pub key_service: Url,
    /// MPC Wallet Service base
    pub wallet_service: Url,
    /// Pool Service base
    pub pool_service: Url,
    /// True in direct mode: requests are authenticated and sent over `https`
    pub secure: bool,
}

impl ResolvedEndpoints {
    /// Pick and validate the base URLs for `mode`
    pub fn resolve(mode: &ConnectionMode, endpoints: &ServiceEndpoints) -> WaasResult<Self> {
        match mode {
            ConnectionMode::Direct { .. } => Ok(Self {
                key_service: parse_direct_url("key service endpoint", &endpoints.key_service)?,
                wallet_service: parse_direct_url(
                    "wallet service endpoint",
                    &endpoints.wallet_service,
                )?,
                pool_service: parse_direct_url("pool service endpoint", &endpoints.pool_service)?,
                secure: true,
            }),
            ConnectionMode::Proxy { url } => {
                let proxy = parse_url("proxy URL", url)?;
                Ok(Self {
                    key_service: proxy.clone(),
                    wallet_service: proxy.clone(),
                    pool_service: proxy,
                    secure: false,
                })
            }
        }
    }

    /// Base URL of one service
    pub fn for_service(&self, service: ServiceKind) -> &Url {
        match service {
            ServiceKind::MpcKey => &self.key_service,
            ServiceKind::MpcWallet => &self.wallet_service,
            ServiceKind::Pool => &self.pool_service,
        }
    }
}

fn parse_url(field: &str, value: &str) -> WaasResult<Url> {
    let url = Url::parse(value)
        .map_err(|e| WaasError::invalid_argument(format!("{field} {value:?} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WaasError::invalid_argument(format!(
            "{field} {value:?} has unsupported scheme {other:?}"
        ))),
    }
}

fn parse_direct_url(field: &str, value: &str) -> WaasResult<Url> {
    let url = parse_url(field, value)?;
    if url.scheme() == "https" || is_loopback(&url) {
        Ok(url)
    } else {
        Err(WaasError::invalid_argument(format!(
            "{field} {value:?} must use https in direct mode"
        )))
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

/// REST clients for the three services
#[derive(Debug, Clone)]
pub struct ServiceClient {
    key: Arc<HttpKeyService>,
    wallet: Arc<HttpWalletService>,
    pool: Arc<HttpPoolService>,
    endpoints: ResolvedEndpoints,
}

impl ServiceClient {
    /// Connect with default options
    pub fn connect(mode: &ConnectionMode, endpoints: &ServiceEndpoints) -> WaasResult<Self> {
        Self::connect_with(mode, endpoints, ClientOptions::default())
    }

    /// Connect with explicit options
    pub fn connect_with(
        mode: &ConnectionMode,
        endpoints: &ServiceEndpoints,
        options: ClientOptions,
    ) -> WaasResult<Self> {
        let resolved = ResolvedEndpoints::resolve(mode, endpoints)?;
        let auth = match mode {
            ConnectionMode::Direct { credentials } => Some(Arc::new(ApiKeyAuth::new(credentials)?)),
            ConnectionMode::Proxy { .. } => None,
        };

        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| WaasError::config(format!("failed to build HTTP client: {e}")))?;

        let transport = |service: ServiceKind| {
            RestTransport::new(
                http.clone(),
                resolved.for_service(service).clone(),
                service,
                auth.clone(),
            )
        };

        let client = Self {
            key: Arc::new(HttpKeyService::new(transport(ServiceKind::MpcKey))),
            wallet: Arc::new(HttpWalletService::new(transport(ServiceKind::MpcWallet))),
            pool: Arc::new(HttpPoolService::new(transport(ServiceKind::Pool))),
            endpoints: resolved.clone(),
        };

        tracing::info!(
            secure = resolved.secure,
            key_service = %resolved.key_service,
            wallet_service = %resolved.wallet_service,
            pool_service = %resolved.pool_service,
            "service client connected"
        );
        Ok(client)
    }

    /// Key service client
    pub fn key(&self) -> &Arc<HttpKeyService> {
        &self.key
    }

    /// Wallet service client
    pub fn wallet(&self) -> &Arc<HttpWalletService> {
        &self.wallet
    }

    /// Pool service client
    pub fn pool(&self) -> &Arc<HttpPoolService> {
        &self.pool
    }

    /// Endpoints in use
    pub fn endpoints(&self) -> &ResolvedEndpoints {
        &self.endpoints
    }

    /// True in direct mode
    pub fn is_secure(&self) -> bool {
        self.endpoints.secure
    }

    /// Trait-object handles for the coordinator
    pub fn handles(&self) -> ServiceHandles {
        ServiceHandles {
            key: self.key.clone(),
            wallet: self.wallet.clone(),
            pool: self.pool.clone(),
        }
    }
}

/// Connects the REST clients during `initialize`
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    endpoints: ServiceEndpoints,
    options: ClientOptions,
}

impl HttpConnector {
    /// Connector for explicit endpoints and options
    pub fn new(endpoints: ServiceEndpoints, options: ClientOptions) -> Self {
        Self { endpoints, options }
    }

    /// Connector configured from a client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.endpoints.clone(),
            ClientOptions {
                request_timeout: config.request_timeout(),
            },
        )
    }
}

impl ServiceConnector for HttpConnector {
    fn connect(&self, mode: &ConnectionMode) -> WaasResult<ServiceHandles> {
        ServiceClient::connect_with(mode, &self.endpoints, self.options).map(|c| c.handles())
    }
}
