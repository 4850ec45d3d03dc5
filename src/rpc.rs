//! JSON-RPC read sink.
//!
//! Thin HTTP wrapper for `eth_call` against a node endpoint. Pure parsing in
//! `parse_response` for testability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::address::{Address, bytes_to_hex, hex_to_bytes};
use crate::config::RpcTimeouts;
use crate::sink::{ReadSink, SinkError};

// =============================================================================
// CLIENT
// =============================================================================

pub struct JsonRpcReader {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcReader {
    /// # Errors
    ///
    /// Returns [`SinkError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeouts: RpcTimeouts) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self { http, url: url.into(), next_id: AtomicU64::new(1) })
    }
}

#[async_trait::async_trait]
impl ReadSink for JsonRpcReader {
    async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, SinkError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = build_request(id, to, data);

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        if status != 200 {
            return Err(SinkError::Remote { code: i64::from(status), message: text });
        }

        parse_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, serde::Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (CallParams, &'static str),
}

#[derive(Debug, serde::Serialize)]
struct CallParams {
    to: String,
    data: String,
}

#[derive(serde::Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(serde::Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

fn build_request(id: u64, to: Address, data: &[u8]) -> RpcRequest {
    RpcRequest {
        jsonrpc: "2.0",
        id,
        method: "eth_call",
        params: (CallParams { to: to.to_string(), data: format!("0x{}", bytes_to_hex(data)) }, "latest"),
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_response(json: &str) -> Result<Vec<u8>, SinkError> {
    let rpc: RpcResponse = serde_json::from_str(json).map_err(|e| SinkError::Malformed(e.to_string()))?;
    if let Some(err) = rpc.error {
        return Err(SinkError::Remote { code: err.code, message: err.message });
    }
    let result = rpc
        .result
        .ok_or_else(|| SinkError::Malformed("response has neither result nor error".into()))?;
    hex_to_bytes(&result).ok_or_else(|| SinkError::Malformed(format!("result is not hex: {result}")))
}

#[cfg(test)]
#[path = "rpc_test.rs"]
mod tests;
