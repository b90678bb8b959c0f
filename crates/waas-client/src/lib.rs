//! # WaaS Client
//!
//! REST implementation of the Key, Wallet and Pool service traits.
//!
//! ## Responsibilities
//!
//! - Choose endpoints from the connection mode (direct or proxy)
//! - Sign direct-mode requests with API key JWTs
//! - Map transport failures and non-2xx responses to `ServiceError`,
//!   carrying the remote message verbatim
//! - Decode responses strictly into the domain types

pub mod auth;
pub mod client;
pub mod key;
pub mod pool;
pub mod transport;
pub mod wallet;

pub use auth::ApiKeyAuth;
pub use client::{ClientOptions, HttpConnector, ResolvedEndpoints, ServiceClient};
pub use key::HttpKeyService;
pub use pool::HttpPoolService;
pub use transport::RestTransport;
pub use wallet::HttpWalletService;
