//! Panel view state.
//!
//! DESIGN
//! ======
//! Everything here is rebuilt from ledger reads on each refresh. The guard
//! lifecycle is not stored; [`GuardPhase`] is derived once per refresh from
//! the installed guard and the removal schedule, and every eligibility check
//! matches on it.

use serde::Serialize;

use crate::address::Address;
use crate::sink::Session;

pub const MILLISECONDS_IN_SECOND: u64 = 1000;

// =============================================================================
// LEDGER ENTITIES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardStatus {
    pub installed_guard_address: Address,
}

/// Removal timestamp in seconds; `0` means nothing is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalSchedule {
    pub scheduled_at_epoch_seconds: u64,
}

impl RemovalSchedule {
    #[must_use]
    pub fn at(&self) -> Option<u64> {
        (self.scheduled_at_epoch_seconds > 0).then_some(self.scheduled_at_epoch_seconds)
    }

    #[must_use]
    pub fn scheduled_at_ms(&self) -> u64 {
        self.scheduled_at_epoch_seconds.saturating_mul(MILLISECONDS_IN_SECOND)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateAllowance {
    pub delegate_address: Address,
    pub allowed_from_epoch_seconds: u64,
    pub is_one_time: bool,
}

impl DelegateAllowance {
    #[must_use]
    pub fn allowed_from_ms(&self) -> u64 {
        self.allowed_from_epoch_seconds.saturating_mul(MILLISECONDS_IN_SECOND)
    }

    #[must_use]
    pub fn is_active(&self, now_secs: u64) -> bool {
        self.allowed_from_epoch_seconds < now_secs
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum GuardPhase {
    Uninstalled,
    Installed { schedule: Option<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStage {
    NotScheduled,
    Pending { at: u64 },
    Due { at: u64 },
}

impl GuardPhase {
    /// Derive the phase from the two top-level reads.
    #[must_use]
    pub fn derive(installed: Address, expected: Address, schedule: RemovalSchedule) -> Self {
        if installed == expected {
            Self::Installed { schedule: schedule.at() }
        } else {
            Self::Uninstalled
        }
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }

    /// Removal stage at `now_secs`; `None` while uninstalled.
    #[must_use]
    pub fn removal_stage(&self, now_secs: u64) -> Option<RemovalStage> {
        match *self {
            Self::Uninstalled => None,
            Self::Installed { schedule: None } => Some(RemovalStage::NotScheduled),
            Self::Installed { schedule: Some(at) } if now_secs < at => Some(RemovalStage::Pending { at }),
            Self::Installed { schedule: Some(at) } => Some(RemovalStage::Due { at }),
        }
    }
}

// =============================================================================
// INTENTS
// =============================================================================

/// What a delegate-allowance submission is meant to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateIntent {
    Grant { once: bool },
    Reset,
}

impl DelegateIntent {
    /// `(oneTimeAllowance, reset)` arguments for `delegateAllowance`.
    #[must_use]
    pub fn call_flags(self) -> (bool, bool) {
        match self {
            Self::Grant { once } => (once, false),
            Self::Reset => (false, true),
        }
    }
}

// =============================================================================
// AGGREGATE
// =============================================================================

/// The sole input to rendering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelViewState {
    pub session: Option<Session>,
    pub guard: Option<GuardStatus>,
    pub removal: Option<RemovalSchedule>,
    /// Delegate directory as listed, including delegates whose allowance read failed.
    pub delegates: Vec<Address>,
    pub delegates_info: Vec<DelegateAllowance>,
    /// `None` until both the guard and the schedule have been read.
    pub phase: Option<GuardPhase>,
    pub is_guard_installed: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl PanelViewState {
    /// Recompute the derived fields after `guard` or `removal` changed.
    pub(crate) fn rederive(&mut self, expected_guard: Address) {
        self.is_guard_installed = self.guard.is_some_and(|g| g.installed_guard_address == expected_guard);
        self.phase = match (self.guard, self.removal) {
            (Some(guard), Some(removal)) => {
                Some(GuardPhase::derive(guard.installed_guard_address, expected_guard, removal))
            }
            // Without a schedule read the install state alone is only known when negative.
            (Some(_), None) if !self.is_guard_installed => Some(GuardPhase::Uninstalled),
            _ => None,
        };
    }

    #[must_use]
    pub fn has_delegate(&self, delegate: Address) -> bool {
        self.delegates.contains(&delegate)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
