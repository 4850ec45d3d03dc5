//! External collaborator seams.
//!
//! DESIGN
//! ======
//! The panel never talks to a wallet host directly. It reads through a
//! [`ReadSink`], submits through a [`TransactionSink`], asks a
//! [`SessionProvider`] which account is connected and a [`Clock`] what time
//! it is. Hosts supply real implementations; tests supply mocks.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::address::{Address, bytes_to_hex};

// =============================================================================
// ERROR
// =============================================================================

/// Failure reported by a read or transaction sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The transport could not deliver the request.
    #[error("transport failed: {0}")]
    Transport(String),
    /// The remote side answered with an error.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
    /// The user or host declined the submission.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The response could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

// =============================================================================
// SESSION
// =============================================================================

/// The currently connected Safe account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub safe_address: Address,
    pub chain_id: u64,
}

pub trait SessionProvider: Send + Sync {
    /// `None` while no account is connected.
    fn current(&self) -> Option<Session>;
}

/// A session fixed at startup, for hosts that operate on one configured Safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSession(pub Option<Session>);

impl SessionProvider for StaticSession {
    fn current(&self) -> Option<Session> {
        self.0
    }
}

// =============================================================================
// CLOCK
// =============================================================================

pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

// =============================================================================
// READS
// =============================================================================

/// Executes read-only calls against the ledger.
#[async_trait::async_trait]
pub trait ReadSink: Send + Sync {
    /// Run `data` against `to` and return the raw return data.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the call cannot be executed.
    async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, SinkError>;
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// One call in a submission batch, shaped like the Safe Apps SDK's
/// `BaseTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseTransaction {
    pub to: Address,
    /// Wei, as a decimal string.
    pub value: String,
    /// `0x`-prefixed call data.
    pub data: String,
}

impl BaseTransaction {
    /// A zero-value contract call.
    #[must_use]
    pub fn call(to: Address, data: &[u8]) -> Self {
        Self { to, value: "0".into(), data: format!("0x{}", bytes_to_hex(data)) }
    }
}

/// Submits an ordered batch of transactions as a single unit.
#[async_trait::async_trait]
pub trait TransactionSink: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the batch is rejected or cannot be sent.
    async fn send(&self, txs: &[BaseTransaction]) -> Result<(), SinkError>;
}
