//! Typed guardrail reads.
//!
//! Thin wrapper over a [`ReadSink`]: encode with [`crate::abi`], call, decode
//! the single return value. Decoding is pure and lives in `abi` for testability.

use std::sync::Arc;

use crate::abi;
use crate::address::Address;
use crate::error::PanelError;
use crate::sink::ReadSink;
use crate::state::DelegateAllowance;

pub struct GuardrailClient {
    reader: Arc<dyn ReadSink>,
    guardrail: Address,
}

impl GuardrailClient {
    #[must_use]
    pub fn new(reader: Arc<dyn ReadSink>, guardrail: Address) -> Self {
        Self { reader, guardrail }
    }

    #[must_use]
    pub fn guardrail(&self) -> Address {
        self.guardrail
    }

    async fn call(&self, what: &str, to: Address, data: Vec<u8>) -> Result<Vec<u8>, PanelError> {
        self.reader
            .call(to, &data)
            .await
            .map_err(|e| PanelError::read(what, e))
    }

    /// Guard currently installed on `account`, read from its guard storage slot.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::ReadFailure`] if the call fails or the storage is malformed.
    pub async fn get_installed_guard(&self, account: Address) -> Result<Address, PanelError> {
        const WHAT: &str = "transaction guard";
        let ret = self
            .call(WHAT, account, abi::encode_get_storage_at(abi::GUARD_STORAGE_SLOT, 1))
            .await?;
        let storage = abi::decode_storage(&ret).map_err(|e| PanelError::read(WHAT, e))?;
        abi::guard_from_storage(&storage).map_err(|e| PanelError::read(WHAT, e))
    }

    /// Removal timestamp in seconds, `0` when none is scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::ReadFailure`] if the call fails or the value is malformed.
    pub async fn get_removal_schedule(&self, account: Address) -> Result<u64, PanelError> {
        const WHAT: &str = "guard removal info";
        let ret = self
            .call(WHAT, self.guardrail, abi::encode_removal_schedule(account))
            .await?;
        abi::decode_removal_schedule(&ret).map_err(|e| PanelError::read(WHAT, e))
    }

    /// Delegates registered for `account`, in the order the contract returns them.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::ReadFailure`] if the call fails or the list is malformed.
    pub async fn list_delegates(&self, account: Address) -> Result<Vec<Address>, PanelError> {
        const WHAT: &str = "current delegates";
        let ret = self
            .call(WHAT, self.guardrail, abi::encode_get_delegates(account))
            .await?;
        abi::decode_delegates(&ret).map_err(|e| PanelError::read(WHAT, e))
    }

    /// Allowance recorded for one delegate.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::ReadFailure`] naming the delegate if the read fails.
    pub async fn get_delegate_allowance(
        &self,
        account: Address,
        delegate: Address,
    ) -> Result<DelegateAllowance, PanelError> {
        let what = format!("delegate info for {delegate}");
        let ret = self
            .call(&what, self.guardrail, abi::encode_delegated_allowance(account, delegate))
            .await?;
        let (is_one_time, allowed_from_epoch_seconds) =
            abi::decode_delegated_allowance(&ret).map_err(|e| PanelError::read(&what, e))?;
        tracing::debug!(%delegate, allowed_from_epoch_seconds, is_one_time, "delegate allowance");
        Ok(DelegateAllowance { delegate_address: delegate, allowed_from_epoch_seconds, is_one_time })
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
