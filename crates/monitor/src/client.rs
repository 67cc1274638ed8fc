//! Shared HTTP plumbing: one timeout-bounded `reqwest` client per process and
//! helpers that map transport and decoding failures onto the monitor's error
//! taxonomy.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::worker::MonitorError;

const USER_AGENT: &str = concat!("hackwatch-monitor/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client(timeout: Duration) -> Result<Client, MonitorError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| MonitorError::upstream("http client", err))
}

/// Sends the request and returns the body of a 2xx response.
pub(crate) async fn send_text(
    request: RequestBuilder,
    upstream: &'static str,
) -> Result<String, MonitorError> {
    let response = request
        .send()
        .await
        .map_err(|err| MonitorError::upstream(upstream, err))?;
    let status = response.status();
    if !status.is_success() {
        return Err(MonitorError::upstream(upstream, format!("http status {status}")));
    }
    response
        .text()
        .await
        .map_err(|err| MonitorError::upstream(upstream, err))
}

pub(crate) async fn send_json<T>(
    request: RequestBuilder,
    upstream: &'static str,
) -> Result<T, MonitorError>
where
    T: DeserializeOwned,
{
    let body = send_text(request, upstream).await?;
    decode_json(&body, upstream)
}

pub(crate) fn decode_json<T>(body: &str, upstream: &'static str) -> Result<T, MonitorError>
where
    T: DeserializeOwned,
{
    serde_json::from_str(body).map_err(|err| MonitorError::parse(upstream, err))
}
