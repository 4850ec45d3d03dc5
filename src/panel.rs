//! Guardrail control panel: refresh cycle and action surface.
//!
//! DESIGN
//! ======
//! The panel owns one [`PanelViewState`] behind a mutex that is only held
//! for short synchronous sections, never across an await. A refresh issues
//! the three top-level reads concurrently, fans out one allowance read per
//! delegate, assembles a complete replacement state and commits it in one
//! step.
//!
//! Each refresh takes a generation number. A commit only lands if its
//! generation is still the latest, so a slow refresh for an account the
//! user already switched away from cannot overwrite newer state. Writes
//! that land between a refresh's start and its commit (an action error, the
//! targeted schedule re-read) are stamped from the same sequence and survive
//! that commit.
//!
//! Loading is an in-flight counter released by a drop guard, so an
//! operation that fails (or panics) can never leave `is_loading` stuck.
//!
//! Actions check eligibility against the derived [`GuardPhase`] before
//! building a batch. A failure is recorded in `last_error` and also
//! returned, so callers may ignore the result without losing the message.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::abi;
use crate::address::Address;
use crate::client::GuardrailClient;
use crate::config::ContractConfig;
use crate::error::{ErrorCode, PanelError};
use crate::sink::{BaseTransaction, Clock, ReadSink, Session, SessionProvider, TransactionSink};
use crate::state::{
    DelegateAllowance, DelegateIntent, GuardPhase, GuardStatus, PanelViewState, RemovalSchedule, RemovalStage,
};

// =============================================================================
// LOADING GUARD
// =============================================================================

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// PANEL
// =============================================================================

/// External collaborators the panel is wired to.
pub struct Collaborators {
    pub reader: Arc<dyn ReadSink>,
    pub transactions: Arc<dyn TransactionSink>,
    pub session: Arc<dyn SessionProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Outcome of the per-delegate fan-out.
struct DelegateReads {
    listed: Vec<Address>,
    found: Vec<DelegateAllowance>,
    failed: Vec<(Address, PanelError)>,
}

/// View state plus the sequence stamps that order writes to it.
#[derive(Default)]
struct Shared {
    state: PanelViewState,
    seq: u64,
    /// Generation of the newest refresh started.
    latest: u64,
    /// Stamp of the last write to `last_error`.
    error_seq: u64,
    /// Stamp of the last targeted removal schedule read.
    removal_seq: u64,
}

impl Shared {
    fn tick(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn set_error(&mut self, error: Option<String>) {
        let seq = self.tick();
        self.error_seq = seq;
        self.state.last_error = error;
    }
}

pub struct GuardrailPanel {
    client: GuardrailClient,
    transactions: Arc<dyn TransactionSink>,
    session: Arc<dyn SessionProvider>,
    clock: Arc<dyn Clock>,
    multisend_call_only: Option<Address>,
    shared: Mutex<Shared>,
    in_flight: AtomicUsize,
}

impl GuardrailPanel {
    #[must_use]
    pub fn new(contracts: ContractConfig, collaborators: Collaborators) -> Self {
        Self {
            client: GuardrailClient::new(collaborators.reader, contracts.guardrail),
            transactions: collaborators.transactions,
            session: collaborators.session,
            clock: collaborators.clock,
            multisend_call_only: contracts.multisend_call_only,
            shared: Mutex::new(Shared::default()),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// The guard this panel installs.
    #[must_use]
    pub fn guardrail(&self) -> Address {
        self.client.guardrail()
    }

    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.clock.now_secs()
    }

    /// Copy of the current view state.
    #[must_use]
    pub fn snapshot(&self) -> PanelViewState {
        let mut state = self.shared().state.clone();
        state.is_loading = self.in_flight.load(Ordering::SeqCst) > 0;
        state
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, action: &'static str, err: &PanelError) {
        warn!(action, code = err.error_code(), retryable = err.retryable(), error = %err, "guardrail operation failed");
        self.shared().set_error(Some(err.to_string()));
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// Rebuild the whole view state from the ledger.
    ///
    /// # Errors
    ///
    /// Returns the most recent failure of this cycle, which is also stored in
    /// `last_error`. Per-delegate failures do not discard the other delegates.
    pub async fn refresh(&self) -> Result<(), PanelError> {
        let generation = self.start_generation();
        let _loading = InFlight::enter(&self.in_flight);

        let Some(session) = self.session.current() else {
            let err = PanelError::SessionUnavailable;
            let next = PanelViewState { last_error: Some(err.to_string()), ..PanelViewState::default() };
            self.commit(generation, next);
            return Err(err);
        };
        let account = session.safe_address;
        debug!(generation, %account, "refreshing guardrail state");

        let (guard, removal, delegates) = tokio::join!(
            self.client.get_installed_guard(account),
            self.client.get_removal_schedule(account),
            self.read_delegates(account),
        );

        let mut next = PanelViewState { session: Some(session), ..PanelViewState::default() };
        let mut errors = Vec::new();
        match guard {
            Ok(installed_guard_address) => next.guard = Some(GuardStatus { installed_guard_address }),
            Err(e) => errors.push(e),
        }
        match removal {
            Ok(scheduled_at_epoch_seconds) => next.removal = Some(RemovalSchedule { scheduled_at_epoch_seconds }),
            Err(e) => errors.push(e),
        }
        match delegates {
            Ok(reads) => {
                next.delegates = reads.listed;
                next.delegates_info = reads.found;
                if !reads.failed.is_empty() {
                    for (delegate, err) in &reads.failed {
                        warn!(%delegate, error = %err, "delegate allowance read failed");
                    }
                    let failed = reads.failed.iter().map(|(d, _)| d.to_string()).collect();
                    errors.push(PanelError::PartialReadFailure { failed });
                }
            }
            Err(e) => errors.push(e),
        }
        next.rederive(self.guardrail());

        for err in &errors {
            warn!(generation, code = err.error_code(), retryable = err.retryable(), error = %err, "refresh read failed");
        }
        let outcome = errors.pop();
        next.last_error = outcome.as_ref().map(ToString::to_string);

        if self.commit(generation, next) {
            info!(generation, %account, "guardrail state refreshed");
        }
        outcome.map_or(Ok(()), Err)
    }

    async fn read_delegates(&self, account: Address) -> Result<DelegateReads, PanelError> {
        let delegates = self.client.list_delegates(account).await?;
        let results = join_all(
            delegates
                .iter()
                .map(|delegate| self.client.get_delegate_allowance(account, *delegate)),
        )
        .await;

        let mut reads =
            DelegateReads { listed: Vec::new(), found: Vec::with_capacity(delegates.len()), failed: Vec::new() };
        for (delegate, result) in delegates.iter().copied().zip(results) {
            match result {
                Ok(allowance) => reads.found.push(allowance),
                Err(e) => reads.failed.push((delegate, e)),
            }
        }
        reads.listed = delegates;
        Ok(reads)
    }

    /// Open a refresh cycle: new generation, error cleared.
    fn start_generation(&self) -> u64 {
        let mut shared = self.shared();
        let generation = shared.tick();
        shared.latest = generation;
        shared.error_seq = generation;
        shared.state.last_error = None;
        generation
    }

    /// Replace the view state if `generation` is still the latest refresh.
    ///
    /// An error or schedule written after the cycle started is newer than
    /// anything this cycle read, so it is carried into `next`.
    fn commit(&self, generation: u64, mut next: PanelViewState) -> bool {
        let mut shared = self.shared();
        if generation != shared.latest {
            debug!(generation, latest = shared.latest, "dropping stale refresh");
            return false;
        }
        if next.last_error.is_none() && shared.error_seq > generation {
            next.last_error = shared.state.last_error.take();
        }
        if shared.removal_seq > generation && next.session == shared.state.session {
            debug!(generation, "keeping newer removal schedule");
            next.removal = shared.state.removal;
            next.rederive(self.guardrail());
        }
        shared.state = next;
        true
    }

    /// Re-read only the removal schedule for `account`.
    async fn refresh_removal_schedule(&self, account: Address) {
        let generation = self.shared().latest;
        let result = self.client.get_removal_schedule(account).await;

        let mut shared = self.shared();
        if generation != shared.latest || shared.state.session.map(|s| s.safe_address) != Some(account) {
            debug!(generation, "dropping stale removal schedule read");
            return;
        }
        match result {
            Ok(scheduled_at_epoch_seconds) => {
                let seq = shared.tick();
                shared.removal_seq = seq;
                shared.state.removal = Some(RemovalSchedule { scheduled_at_epoch_seconds });
                shared.state.rederive(self.client.guardrail());
            }
            Err(e) => {
                warn!(code = e.error_code(), error = %e, "removal schedule refresh failed");
                shared.set_error(Some(e.to_string()));
            }
        }
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Install the guardrail. Legal only while it is not installed.
    ///
    /// # Errors
    ///
    /// `InvalidAction` when the guard is installed or its state is unknown,
    /// `SubmissionFailure` when the batch is rejected.
    pub async fn activate(&self) -> Result<(), PanelError> {
        let _loading = self.begin();
        let result = self.activate_inner().await;
        self.finish("activate", result)
    }

    /// Uninstall the guardrail. Legal only once a scheduled removal is due.
    ///
    /// # Errors
    ///
    /// `InvalidAction` before the removal time or without a schedule,
    /// `SubmissionFailure` when the batch is rejected.
    pub async fn deactivate(&self) -> Result<(), PanelError> {
        let _loading = self.begin();
        let result = self.deactivate_inner().await;
        self.finish("deactivate", result)
    }

    /// Schedule guardrail removal, then re-read the schedule.
    ///
    /// # Errors
    ///
    /// `InvalidAction` unless installed with nothing scheduled,
    /// `SubmissionFailure` when the batch is rejected.
    pub async fn schedule_removal(&self) -> Result<(), PanelError> {
        let _loading = self.begin();
        let result = self.schedule_removal_inner().await;
        self.finish("schedule_removal", result)
    }

    /// Submit a time-delayed allowance change for `delegate`.
    ///
    /// `Grant` requires the guardrail to be installed. `Reset` applies to an
    /// already registered delegate in any phase.
    ///
    /// # Errors
    ///
    /// `InvalidAction` when the intent is not legal now,
    /// `SubmissionFailure` when the batch is rejected.
    pub async fn schedule_delegate_allowance(&self, delegate: Address, intent: DelegateIntent) -> Result<(), PanelError> {
        let _loading = self.begin();
        let result = self.schedule_delegate_allowance_inner(delegate, intent).await;
        self.finish("schedule_delegate_allowance", result)
    }

    /// Grant an allowance that takes effect immediately. Only legal while
    /// the guardrail is not installed.
    ///
    /// # Errors
    ///
    /// `InvalidAction` when the guardrail is installed,
    /// `SubmissionFailure` when the batch is rejected.
    pub async fn grant_immediate_delegate_allowance(&self, delegate: Address, once: bool) -> Result<(), PanelError> {
        let _loading = self.begin();
        let result = self.grant_immediate_inner(delegate, once).await;
        self.finish("grant_immediate_delegate_allowance", result)
    }

    /// Route a delegate intent to the call the current phase allows:
    /// scheduled while installed, immediate otherwise. `Reset` is always
    /// scheduled.
    ///
    /// # Errors
    ///
    /// See [`Self::schedule_delegate_allowance`] and
    /// [`Self::grant_immediate_delegate_allowance`].
    pub async fn grant_or_schedule_delegate_allowance(
        &self,
        delegate: Address,
        intent: DelegateIntent,
    ) -> Result<(), PanelError> {
        let installed = self.snapshot().phase.is_some_and(|p| p.is_installed());
        match intent {
            DelegateIntent::Grant { once } if !installed => self.grant_immediate_delegate_allowance(delegate, once).await,
            _ => self.schedule_delegate_allowance(delegate, intent).await,
        }
    }

    fn begin(&self) -> InFlight<'_> {
        let loading = InFlight::enter(&self.in_flight);
        self.shared().set_error(None);
        loading
    }

    fn finish(&self, action: &'static str, result: Result<(), PanelError>) -> Result<(), PanelError> {
        if let Err(err) = &result {
            self.record_error(action, err);
        }
        result
    }

    /// Current session and phase, both required for any action.
    fn loaded(&self) -> Result<(Session, PanelViewState, GuardPhase), PanelError> {
        let session = self.session.current().ok_or(PanelError::SessionUnavailable)?;
        let view = self.snapshot();
        if view.session.map(|s| s.safe_address) != Some(session.safe_address) {
            return Err(PanelError::invalid("Guardrail state not loaded for the connected Safe"));
        }
        let phase = view
            .phase
            .ok_or_else(|| PanelError::invalid("Guardrail state unknown, refresh first"))?;
        Ok((session, view, phase))
    }

    async fn submit(&self, action: &'static str, txs: Vec<BaseTransaction>) -> Result<(), PanelError> {
        info!(action, count = txs.len(), "submitting transaction batch");
        self.transactions.send(&txs).await?;
        info!(action, "transaction batch submitted");
        Ok(())
    }

    async fn activate_inner(&self) -> Result<(), PanelError> {
        let (session, view, phase) = self.loaded()?;
        if phase.is_installed() {
            return Err(PanelError::invalid("Guardrail is already activated"));
        }

        let guardrail = self.guardrail();
        let mut txs = Vec::with_capacity(2);
        // The relay must be allowed before the guard starts vetting batched calls.
        if let Some(relay) = self.multisend_call_only.filter(|r| !view.has_delegate(*r)) {
            txs.push(BaseTransaction::call(guardrail, &abi::encode_immediate_delegate_allowance(relay, false)));
        }
        txs.push(BaseTransaction::call(session.safe_address, &abi::encode_set_guard(guardrail)));
        self.submit("activate", txs).await
    }

    async fn deactivate_inner(&self) -> Result<(), PanelError> {
        let (session, _, phase) = self.loaded()?;
        match phase.removal_stage(self.now_secs()) {
            Some(RemovalStage::Due { .. }) => {}
            None => return Err(PanelError::invalid("Guardrail is not activated")),
            Some(RemovalStage::NotScheduled) => {
                return Err(PanelError::invalid("Guardrail removal has not been scheduled"));
            }
            Some(RemovalStage::Pending { at }) => {
                return Err(PanelError::invalid(format!("Guardrail removal is not due until {at}")));
            }
        }
        let txs = vec![BaseTransaction::call(session.safe_address, &abi::encode_set_guard(Address::ZERO))];
        self.submit("deactivate", txs).await
    }

    async fn schedule_removal_inner(&self) -> Result<(), PanelError> {
        let (session, _, phase) = self.loaded()?;
        match phase.removal_stage(self.now_secs()) {
            Some(RemovalStage::NotScheduled) => {}
            None => return Err(PanelError::invalid("Guardrail is not activated")),
            Some(_) => return Err(PanelError::invalid("Guardrail removal is already scheduled")),
        }
        let txs = vec![BaseTransaction::call(self.guardrail(), &abi::encode_schedule_guard_removal())];
        self.submit("schedule_removal", txs).await?;
        self.refresh_removal_schedule(session.safe_address).await;
        Ok(())
    }

    async fn schedule_delegate_allowance_inner(
        &self,
        delegate: Address,
        intent: DelegateIntent,
    ) -> Result<(), PanelError> {
        check_delegate(delegate)?;
        let (_, view, phase) = self.loaded()?;
        match intent {
            DelegateIntent::Grant { .. } if !phase.is_installed() => {
                return Err(PanelError::invalid(
                    "Scheduled allowances require an active guardrail; grant an immediate allowance instead",
                ));
            }
            DelegateIntent::Reset if !view.has_delegate(delegate) => {
                return Err(PanelError::invalid(format!("{delegate} is not a registered delegate")));
            }
            _ => {}
        }
        let (once, reset) = intent.call_flags();
        let txs = vec![BaseTransaction::call(self.guardrail(), &abi::encode_delegate_allowance(delegate, once, reset))];
        self.submit("schedule_delegate_allowance", txs).await
    }

    async fn grant_immediate_inner(&self, delegate: Address, once: bool) -> Result<(), PanelError> {
        check_delegate(delegate)?;
        let (_, _, phase) = self.loaded()?;
        if phase.is_installed() {
            return Err(PanelError::invalid(
                "Immediate allowances are disabled while the guardrail is active; schedule one instead",
            ));
        }
        let txs = vec![BaseTransaction::call(
            self.guardrail(),
            &abi::encode_immediate_delegate_allowance(delegate, once),
        )];
        self.submit("grant_immediate_delegate_allowance", txs).await
    }
}

fn check_delegate(delegate: Address) -> Result<(), PanelError> {
    if delegate.is_zero() {
        return Err(PanelError::invalid("Delegate address must not be the zero address"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "panel_test.rs"]
mod tests;
