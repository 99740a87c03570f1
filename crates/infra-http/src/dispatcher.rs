// reqwest RequestDispatcher Implementation

use async_trait::async_trait;
use requeue_core::domain::RequestSnapshot;
use requeue_core::port::{DispatchError, DispatchReceipt, RequestDispatcher};
use tracing::debug;

/// Replay client backed by a shared `reqwest::Client`.
///
/// A settled response of any status (including 5xx) is a successful
/// dispatch; only transport-level errors map to
/// `DispatchError::Network`. The stored `mode` and `credentials` fields
/// have no wire-level equivalent here and are not applied.
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Use a caller-configured client (timeouts, proxies, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestDispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        request: &RequestSnapshot,
    ) -> Result<DispatchReceipt, DispatchError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| DispatchError::Malformed(format!("bad method: {}", e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(url = %request.url, status = %status, "request dispatched");
                Ok(DispatchReceipt { status })
            }
            Err(err) if err.is_builder() => Err(DispatchError::Malformed(err.to_string())),
            Err(err) => Err(DispatchError::Network(err.to_string())),
        }
    }
}
