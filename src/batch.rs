//! Transaction sink that emits Safe Transaction Builder batch files.
//!
//! DESIGN
//! ======
//! Hosts without an embedded wallet cannot submit directly. Instead each
//! batch is written as Transaction Builder JSON, which the Safe owners
//! import, sign and execute. The batch stays one unit: the builder proposes
//! it as a single multi-send transaction.

use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::abi::SCHEMA_VERSION;
use crate::address::Address;
use crate::sink::{BaseTransaction, SinkError, TransactionSink};

pub const BATCH_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFile<'a> {
    pub version: &'static str,
    pub chain_id: String,
    pub created_at: u64,
    pub meta: BatchMeta,
    pub transactions: &'a [BaseTransaction],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMeta {
    pub name: String,
    pub description: String,
    /// Interface schema the call data was encoded against.
    pub guardrail_schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_from_safe_address: Option<Address>,
}

/// Build the batch document for `txs`.
#[must_use]
pub fn batch_file(chain_id: u64, safe: Option<Address>, created_at: u64, txs: &[BaseTransaction]) -> BatchFile<'_> {
    BatchFile {
        version: BATCH_FORMAT_VERSION,
        chain_id: chain_id.to_string(),
        created_at,
        meta: BatchMeta {
            name: "Guardrail".into(),
            description: format!("{} guardrail transaction(s)", txs.len()),
            guardrail_schema_version: SCHEMA_VERSION,
            created_from_safe_address: safe,
        },
        transactions: txs,
    }
}

pub struct BatchPrinter<W> {
    chain_id: u64,
    safe: Option<Address>,
    out: Mutex<W>,
}

impl BatchPrinter<std::io::Stdout> {
    #[must_use]
    pub fn stdout(chain_id: u64, safe: Option<Address>) -> Self {
        Self::new(chain_id, safe, std::io::stdout())
    }
}

impl<W: Write + Send> BatchPrinter<W> {
    pub fn new(chain_id: u64, safe: Option<Address>, out: W) -> Self {
        Self { chain_id, safe, out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_batch(&self, txs: &[BaseTransaction]) -> Result<(), SinkError> {
        if txs.is_empty() {
            return Err(SinkError::Rejected("empty batch".into()));
        }
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        let json = serde_json::to_string_pretty(&batch_file(self.chain_id, self.safe, created_at, txs))
            .map_err(|e| SinkError::Malformed(e.to_string()))?;

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{json}")
            .and_then(|()| out.flush())
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}

#[async_trait::async_trait]
impl<W: Write + Send> TransactionSink for BatchPrinter<W> {
    async fn send(&self, txs: &[BaseTransaction]) -> Result<(), SinkError> {
        self.write_batch(txs)?;
        tracing::info!(count = txs.len(), chain_id = self.chain_id, "wrote transaction builder batch");
        Ok(())
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod tests;
