//! JSON-over-HTTPS transport shared by the service clients

use crate::auth::ApiKeyAuth;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use waas_core::{ServiceKind, WaasError, WaasResult};

/// One service's REST endpoint
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    base: Url,
    service: ServiceKind,
    auth: Option<Arc<ApiKeyAuth>>,
}

impl RestTransport {
    /// Create a transport for `service` rooted at `base`
    pub fn new(
        client: reqwest::Client,
        base: Url,
        service: ServiceKind,
        auth: Option<Arc<ApiKeyAuth>>,
    ) -> Self {
        Self {
            client,
            base,
            service,
            auth,
        }
    }

    /// Service this transport talks to
    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// True if requests carry API key tokens
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    /// Full URL of a `v1` resource path
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> WaasResult<Url> {
        let base = self.base.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/v1/{}", path.trim_start_matches('/')))
            .map_err(|e| WaasError::invalid_argument(format!("invalid request path {path:?}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET a resource
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> WaasResult<T> {
        let body = self.get_text(path, query).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET a resource and return the raw body
    pub async fn get_text(&self, path: &str, query: &[(&str, &str)]) -> WaasResult<String> {
        self.send::<()>(Method::GET, path, query, None).await
    }

    /// POST a JSON body
    pub async fn post<B, T>(&self, path: &str, query: &[(&str, &str)], body: &B) -> WaasResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let text = self.send(Method::POST, path, query, Some(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> WaasResult<String> {
        let url = self.url(path, query)?;
        tracing::debug!(service = %self.service, method = %method, path = %url.path(), "sending request");

        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(auth) = &self.auth {
            let host = url.host_str().unwrap_or_default();
            let token = auth.token(method.as_str(), host, url.path())?;
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WaasError::service(self.service, format!("request failed: {e}")))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            WaasError::service(self.service, format!("failed to read response: {e}"))
        })?;

        if status.is_success() {
            Ok(text)
        } else {
            tracing::debug!(service = %self.service, status = %status, "request rejected");
            Err(WaasError::service(self.service, error_message(status, &text)))
        }
    }
}

/// Message of a failed response: the JSON `message` field, else the body,
/// else the status line
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> RestTransport {
        RestTransport::new(
            reqwest::Client::new(),
            Url::parse(base).unwrap(),
            ServiceKind::MpcKey,
            None,
        )
    }

    #[test]
    fn test_url_keeps_base_path() {
        let t = transport("https://api.example.test/waas/mpc_keys");
        let url = t
            .url("pools/p1/deviceGroups/g1/mpcOperations", &[("kind", "CreateSignature")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/waas/mpc_keys/v1/pools/p1/deviceGroups/g1/mpcOperations?kind=CreateSignature"
        );
    }

    #[test]
    fn test_url_with_custom_method() {
        let t = transport("http://localhost:8091/");
        let url = t
            .url("pools/p1/deviceGroups/g1:prepareDeviceArchive", &[])
            .unwrap();
        assert_eq!(
            url.path(),
            "/v1/pools/p1/deviceGroups/g1:prepareDeviceArchive"
        );
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"code":5,"message":"device group not found"}"#),
            "device group not found"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::FORBIDDEN, ""), "403 Forbidden");
    }
}
