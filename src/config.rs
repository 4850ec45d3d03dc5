//! Panel configuration parsed from environment variables.
//!
//! The panel core never reads the environment itself; hosts build a
//! [`PanelConfig`] here and hand the pieces to the panel and adapters.

use crate::address::{Address, AddressError};

/// Guardrail deployment on Sepolia.
pub const DEFAULT_GUARDRAIL: Address = Address::from_bytes([
    0xe8, 0x09, 0xd8, 0x1a, 0xc6, 0x7b, 0x36, 0x29, 0xa5, 0xda, 0xb4, 0xe0, 0x29, 0x3f, 0x64, 0x53, 0x73, 0x53, 0xf4, 0x0d,
]);

/// Canonical Safe `MultiSendCallOnly` v1.4.1 deployment.
pub const DEFAULT_MULTISEND_CALL_ONLY: Address = Address::from_bytes([
    0x96, 0x41, 0xd7, 0x64, 0xfc, 0x13, 0xc8, 0xb6, 0x24, 0xc0, 0x44, 0x30, 0xc7, 0x35, 0x6c, 0x1c, 0x7c, 0x81, 0x02, 0xe2,
]);

pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;
pub const DEFAULT_RPC_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RPC_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid address: {source}")]
    InvalidAddress { var: &'static str, source: AddressError },
    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Contract addresses the panel acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractConfig {
    pub guardrail: Address,
    /// Relay granted an immediate allowance on activation. `None` skips the grant.
    pub multisend_call_only: Option<Address>,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self { guardrail: DEFAULT_GUARDRAIL, multisend_call_only: Some(DEFAULT_MULTISEND_CALL_ONLY) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    pub contracts: ContractConfig,
    pub rpc_url: Option<String>,
    pub safe_address: Option<Address>,
    pub chain_id: u64,
    pub timeouts: RpcTimeouts,
}

impl PanelConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `GUARDRAIL_ADDRESS`: guard contract, Sepolia deployment by default
    /// - `GUARDRAIL_MULTISEND_ADDRESS`: relay allowed on activation, `none` to skip
    /// - `GUARDRAIL_RPC_URL`: JSON-RPC endpoint for reads
    /// - `GUARDRAIL_SAFE_ADDRESS`: Safe account to operate on
    /// - `GUARDRAIL_CHAIN_ID`: default 11155111
    /// - `GUARDRAIL_RPC_REQUEST_TIMEOUT_SECS`: default 30
    /// - `GUARDRAIL_RPC_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a set variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let guardrail = parse_address(&lookup, "GUARDRAIL_ADDRESS")?.unwrap_or(DEFAULT_GUARDRAIL);
        let multisend_call_only = match lookup("GUARDRAIL_MULTISEND_ADDRESS").as_deref().map(str::trim) {
            Some("none" | "") => None,
            Some(_) => parse_address(&lookup, "GUARDRAIL_MULTISEND_ADDRESS")?,
            None => Some(DEFAULT_MULTISEND_CALL_ONLY),
        };
        let rpc_url = lookup("GUARDRAIL_RPC_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        let safe_address = parse_address(&lookup, "GUARDRAIL_SAFE_ADDRESS")?;
        let chain_id = match lookup("GUARDRAIL_CHAIN_ID") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var: "GUARDRAIL_CHAIN_ID", value: raw })?,
            None => DEFAULT_CHAIN_ID,
        };
        let timeouts = RpcTimeouts {
            request_secs: parse_u64(&lookup, "GUARDRAIL_RPC_REQUEST_TIMEOUT_SECS", DEFAULT_RPC_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64(&lookup, "GUARDRAIL_RPC_CONNECT_TIMEOUT_SECS", DEFAULT_RPC_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            contracts: ContractConfig { guardrail, multisend_call_only },
            rpc_url,
            safe_address,
            chain_id,
            timeouts,
        })
    }

    /// The RPC endpoint, required by hosts that read from a node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `GUARDRAIL_RPC_URL` is unset.
    pub fn require_rpc_url(&self) -> Result<&str, ConfigError> {
        self.rpc_url.as_deref().ok_or(ConfigError::Missing("GUARDRAIL_RPC_URL"))
    }
}

fn parse_address(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<Address>, ConfigError> {
    lookup(var)
        .map(|raw| raw.parse().map_err(|source| ConfigError::InvalidAddress { var, source }))
        .transpose()
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, var: &str, default: u64) -> u64 {
    lookup(var)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
