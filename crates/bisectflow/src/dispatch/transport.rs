use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMethod {
    Get,
    Post,
    Put,
}

/// One HTTP exchange with the remote service, protocol details already baked
/// into the URL and body.
#[derive(Debug, Clone)]
pub struct WireCall {
    pub method: WireMethod,
    pub url: String,
    pub body: Option<Value>,
}

#[async_trait]
pub trait BuildTransport: Send + Sync {
    async fn send(&self, call: WireCall) -> Result<Value, DispatchError>;
}

/// reqwest-backed transport with a bounded per-request timeout; a timeout
/// surfaces as `Unavailable`, never as a hang.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BuildTransport for HttpTransport {
    async fn send(&self, call: WireCall) -> Result<Value, DispatchError> {
        let mut request = match call.method {
            WireMethod::Get => self.client.get(&call.url),
            WireMethod::Post => self.client.post(&call.url),
            WireMethod::Put => self.client.put(&call.url),
        };
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DispatchError::Unavailable(format!("{status}: {text}")));
        }

        response
            .json()
            .await
            .map_err(|e| DispatchError::BadResponse(e.to_string()))
    }
}
