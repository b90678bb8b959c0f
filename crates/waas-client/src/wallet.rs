//! REST implementation of the MPC Wallet Service

use crate::transport::RestTransport;
use async_trait::async_trait;
use serde::Serialize;
use waas_core::{
    Address, CreateMpcWalletResponse, LongRunningOperation, MpcWallet, WaasResult, WalletService,
};

#[derive(Serialize)]
struct CreateMpcWalletRequest<'a> {
    device: &'a str,
}

#[derive(Serialize)]
struct GenerateAddressRequest<'a> {
    network: &'a str,
}

/// Wallet service client
#[derive(Debug, Clone)]
pub struct HttpWalletService {
    transport: RestTransport,
}

impl HttpWalletService {
    /// Wrap a transport
    pub fn new(transport: RestTransport) -> Self {
        Self { transport }
    }

    /// Underlying transport
    pub fn transport(&self) -> &RestTransport {
        &self.transport
    }
}

#[async_trait]
impl WalletService for HttpWalletService {
    async fn create_mpc_wallet(
        &self,
        parent: &str,
        device: &str,
    ) -> WaasResult<CreateMpcWalletResponse> {
        self.transport
            .post(
                &format!("{parent}/mpcWallets"),
                &[],
                &CreateMpcWalletRequest { device },
            )
            .await
    }

    async fn get_mpc_wallet_operation(
        &self,
        operation: &str,
    ) -> WaasResult<LongRunningOperation<MpcWallet>> {
        self.transport.get(operation, &[]).await
    }

    async fn generate_address(&self, mpc_wallet: &str, network: &str) -> WaasResult<Address> {
        self.transport
            .post(
                &format!("{mpc_wallet}:generateAddress"),
                &[],
                &GenerateAddressRequest { network },
            )
            .await
    }

    async fn get_address(&self, name: &str) -> WaasResult<Address> {
        self.transport.get(name, &[]).await
    }
}
