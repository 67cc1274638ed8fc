//! Minimal JSON-RPC 2.0 client over the shared `reqwest` client.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

use crate::client::send_json;
use crate::worker::MonitorError;

mod types;

pub use types::{
    EthLog, EthTransaction, JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse, LogFilter,
};

pub struct JsonRpcClient {
    client: Client,
    url: String,
    upstream: &'static str,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(client: Client, url: impl Into<String>, upstream: &'static str) -> Self {
        Self {
            client,
            url: url.into(),
            upstream,
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R, MonitorError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response: JsonRpcResponse =
            send_json(self.client.post(&self.url).json(&request), self.upstream).await?;
        decode_response(response, method, self.upstream)
    }
}

/// Turns an RPC envelope into its typed result. A `null` result is handed to
/// the target type, so callers that expect it ask for an `Option`.
pub(crate) fn decode_response<R>(
    response: JsonRpcResponse,
    method: &'static str,
    upstream: &'static str,
) -> Result<R, MonitorError>
where
    R: DeserializeOwned,
{
    if let Some(error) = response.error {
        return Err(MonitorError::upstream(
            upstream,
            format!("{method} failed with code {}: {}", error.code, error.message),
        ));
    }
    let value = response.result.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value)
        .map_err(|err| MonitorError::parse(upstream, format!("{method}: {err}")))
}

/// Parses a `0x`-prefixed JSON-RPC quantity.
pub(crate) fn parse_quantity(value: &str, upstream: &'static str) -> Result<u64, MonitorError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| MonitorError::parse(upstream, format!("quantity `{value}` lacks 0x")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|err| MonitorError::parse(upstream, format!("quantity `{value}`: {err}")))
}
