//! REST implementation of the Pool Service

use crate::transport::RestTransport;
use async_trait::async_trait;
use serde::Serialize;
use waas_core::{Pool, PoolService, WaasResult};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePoolRequest<'a> {
    display_name: &'a str,
}

/// Pool service client
#[derive(Debug, Clone)]
pub struct HttpPoolService {
    transport: RestTransport,
}

impl HttpPoolService {
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
impl PoolService for HttpPoolService {
    async fn create_pool(&self, display_name: &str, pool_id: &str) -> WaasResult<Pool> {
        let mut query = Vec::new();
        if !pool_id.is_empty() {
            query.push(("poolId", pool_id));
        }
        self.transport
            .post("pools", &query, &CreatePoolRequest { display_name })
            .await
    }
}
