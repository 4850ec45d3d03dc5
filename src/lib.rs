//! # guardrail-panel
//!
//! Control panel for the Safe guardrail: a transaction guard that forces a
//! cool-down before it can be removed and gates delegates behind a delay.
//!
//! The crate reads guard, removal-schedule and delegate state through a
//! [`sink::ReadSink`], derives the guard lifecycle, and turns operator
//! actions into transaction batches for a [`sink::TransactionSink`]. Hosts
//! plug in the wallet side; `rpc` and `batch` provide a node-backed reader
//! and a Transaction Builder file writer.

pub mod abi;
pub mod address;
pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod panel;
pub mod rpc;
pub mod sink;
pub mod state;
pub mod view;

#[cfg(test)]
mod test_helpers;

pub use address::Address;
pub use error::{ErrorCode, PanelError};
pub use panel::{Collaborators, GuardrailPanel};
pub use state::{DelegateIntent, GuardPhase, PanelViewState};
pub use view::PanelView;
