//! In-memory ledger, sinks and clock for panel tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::abi::{self, Function, returns};
use crate::address::{Address, hex_to_bytes};
use crate::config::ContractConfig;
use crate::panel::{Collaborators, GuardrailPanel};
use crate::sink::{BaseTransaction, Clock, ReadSink, Session, SessionProvider, SinkError, TransactionSink};

pub const SAFE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const OTHER_SAFE: &str = "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb";
pub const GUARDRAIL: &str = "0xe809d81ac67b3629a5dab4e0293f64537353f40d";
pub const RELAY: &str = "0x9641d764fc13c8b624c04430c7356c1c7c8102e2";
pub const DELEGATES: [&str; 3] = [
    "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
    "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
    "0x1111111111111111111111111111111111111111",
];

pub const START_SECS: u64 = 1_700_000_000;
pub const REMOVAL_DELAY_SECS: u64 = 86_400;

pub fn addr(raw: &str) -> Address {
    raw.parse().unwrap()
}

// =========================================================================
// MockClock
// =========================================================================

pub struct MockClock(AtomicU64);

impl MockClock {
    pub fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// =========================================================================
// MockSession
// =========================================================================

pub struct MockSession(Mutex<Option<Session>>);

impl MockSession {
    pub fn connect(&self, safe: &str) {
        *self.0.lock().unwrap() = Some(Session { safe_address: addr(safe), chain_id: 11_155_111 });
    }

    pub fn disconnect(&self) {
        *self.0.lock().unwrap() = None;
    }
}

impl SessionProvider for MockSession {
    fn current(&self) -> Option<Session> {
        *self.0.lock().unwrap()
    }
}

// =========================================================================
// MockLedger
// =========================================================================

#[derive(Clone, Copy)]
struct Allowance {
    delegate: Address,
    one_time: bool,
    allowed_at: u64,
}

/// Answers guardrail reads from in-memory per-account state.
pub struct MockLedger {
    clock: Arc<MockClock>,
    guards: Mutex<HashMap<Address, Address>>,
    schedules: Mutex<HashMap<Address, u64>>,
    delegates: Mutex<HashMap<Address, Vec<Allowance>>>,
    failing_delegates: Mutex<HashSet<Address>>,
    failing: Mutex<HashSet<Function>>,
    held: Mutex<HashMap<Address, Arc<Notify>>>,
    calls: Mutex<Vec<Function>>,
}

fn arg(data: &[u8], index: usize) -> Address {
    let start = 4 + index * 32;
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&data[start + 12..start + 32]);
    Address::from_bytes(bytes)
}

fn flag(data: &[u8], index: usize) -> bool {
    data[4 + index * 32 + 31] == 1
}

fn function_of(data: &[u8]) -> Function {
    *Function::ALL
        .iter()
        .find(|f| f.selector() == data[..4])
        .expect("unknown selector")
}

impl MockLedger {
    pub fn new(clock: Arc<MockClock>) -> Self {
        Self {
            clock,
            guards: Mutex::new(HashMap::new()),
            schedules: Mutex::new(HashMap::new()),
            delegates: Mutex::new(HashMap::new()),
            failing_delegates: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            held: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_guard(&self, safe: &str, guard: &str) {
        self.guards.lock().unwrap().insert(addr(safe), addr(guard));
    }

    pub fn set_schedule(&self, safe: &str, at: u64) {
        self.schedules.lock().unwrap().insert(addr(safe), at);
    }

    pub fn add_delegate(&self, safe: &str, delegate: &str, one_time: bool, allowed_at: u64) {
        self.delegates
            .lock()
            .unwrap()
            .entry(addr(safe))
            .or_default()
            .push(Allowance { delegate: addr(delegate), one_time, allowed_at });
    }

    pub fn fail_delegate(&self, delegate: &str) {
        self.failing_delegates.lock().unwrap().insert(addr(delegate));
    }

    pub fn fail(&self, function: Function) {
        self.failing.lock().unwrap().insert(function);
    }

    /// Block guard reads against `safe` until the returned handle is notified.
    pub fn hold(&self, safe: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.held.lock().unwrap().insert(addr(safe), notify.clone());
        notify
    }

    pub fn calls(&self, function: Function) -> usize {
        self.calls.lock().unwrap().iter().filter(|f| **f == function).count()
    }

    fn apply(&self, sender: Address, tx: &BaseTransaction) {
        let data = hex_to_bytes(&tx.data).unwrap();
        let now = self.clock.now_secs();
        match function_of(&data) {
            Function::SetGuard => {
                let guard = arg(&data, 0);
                self.guards.lock().unwrap().insert(tx.to, guard);
                if guard.is_zero() {
                    self.schedules.lock().unwrap().remove(&tx.to);
                }
            }
            Function::ScheduleGuardRemoval => {
                self.schedules.lock().unwrap().insert(sender, now + REMOVAL_DELAY_SECS);
            }
            Function::DelegateAllowance => {
                let delegate = arg(&data, 0);
                let mut all = self.delegates.lock().unwrap();
                let list = all.entry(sender).or_default();
                list.retain(|a| a.delegate != delegate);
                if !flag(&data, 2) {
                    list.push(Allowance { delegate, one_time: flag(&data, 1), allowed_at: now + REMOVAL_DELAY_SECS });
                }
            }
            Function::ImmediateDelegateAllowance => {
                let delegate = arg(&data, 0);
                let mut all = self.delegates.lock().unwrap();
                let list = all.entry(sender).or_default();
                list.retain(|a| a.delegate != delegate);
                list.push(Allowance { delegate, one_time: flag(&data, 1), allowed_at: now });
            }
            other => panic!("{} is not a write", other.name()),
        }
    }
}

#[async_trait::async_trait]
impl ReadSink for MockLedger {
    async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, SinkError> {
        let function = function_of(data);
        self.calls.lock().unwrap().push(function);

        if function == Function::GetStorageAt {
            let held = self.held.lock().unwrap().get(&to).cloned();
            if let Some(notify) = held {
                notify.notified().await;
            }
        }
        if self.failing.lock().unwrap().contains(&function) {
            return Err(SinkError::Transport("connection reset".into()));
        }

        match function {
            Function::GetStorageAt => {
                let guard = self.guards.lock().unwrap().get(&to).copied().unwrap_or(Address::ZERO);
                Ok(returns::storage_with_guard(guard))
            }
            Function::RemovalSchedule => {
                let at = self.schedules.lock().unwrap().get(&arg(data, 0)).copied().unwrap_or(0);
                Ok(returns::uint(at))
            }
            Function::GetDelegates => {
                let all = self.delegates.lock().unwrap();
                let list: Vec<Address> = all
                    .get(&arg(data, 0))
                    .map(|l| l.iter().map(|a| a.delegate).collect())
                    .unwrap_or_default();
                Ok(returns::delegates(&list))
            }
            Function::DelegatedAllowance => {
                let delegate = arg(data, 1);
                if self.failing_delegates.lock().unwrap().contains(&delegate) {
                    return Err(SinkError::Remote { code: -32000, message: "execution reverted".into() });
                }
                let all = self.delegates.lock().unwrap();
                let found = all
                    .get(&arg(data, 0))
                    .and_then(|l| l.iter().find(|a| a.delegate == delegate).copied());
                Ok(found.map_or_else(
                    || returns::allowance(false, 0),
                    |a| returns::allowance(a.one_time, a.allowed_at),
                ))
            }
            other => Err(SinkError::Remote { code: 3, message: format!("{} is not a view", other.name()) }),
        }
    }
}

// =========================================================================
// MockTransactions
// =========================================================================

/// Records submitted batches and applies them to the ledger.
pub struct MockTransactions {
    ledger: Arc<MockLedger>,
    session: Arc<MockSession>,
    sent: Mutex<Vec<Vec<BaseTransaction>>>,
    reject: Mutex<Option<SinkError>>,
}

impl MockTransactions {
    pub fn reject_with(&self, err: SinkError) {
        *self.reject.lock().unwrap() = Some(err);
    }

    pub fn accept(&self) {
        *self.reject.lock().unwrap() = None;
    }

    pub fn sent(&self) -> Vec<Vec<BaseTransaction>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TransactionSink for MockTransactions {
    async fn send(&self, txs: &[BaseTransaction]) -> Result<(), SinkError> {
        if let Some(err) = self.reject.lock().unwrap().clone() {
            return Err(err);
        }
        let sender = self.session.current().expect("send without session").safe_address;
        for tx in txs {
            self.ledger.apply(sender, tx);
        }
        self.sent.lock().unwrap().push(txs.to_vec());
        Ok(())
    }
}

// =========================================================================
// Harness
// =========================================================================

pub struct Harness {
    pub clock: Arc<MockClock>,
    pub session: Arc<MockSession>,
    pub ledger: Arc<MockLedger>,
    pub txs: Arc<MockTransactions>,
    pub panel: GuardrailPanel,
}

impl Harness {
    /// Panel connected to `SAFE` with an empty ledger at `START_SECS`.
    pub fn new() -> Self {
        Self::with_contracts(ContractConfig { guardrail: addr(GUARDRAIL), multisend_call_only: Some(addr(RELAY)) })
    }

    pub fn with_contracts(contracts: ContractConfig) -> Self {
        let clock = Arc::new(MockClock(AtomicU64::new(START_SECS)));
        let session = Arc::new(MockSession(Mutex::new(None)));
        session.connect(SAFE);
        let ledger = Arc::new(MockLedger::new(clock.clone()));
        let txs = Arc::new(MockTransactions {
            ledger: ledger.clone(),
            session: session.clone(),
            sent: Mutex::new(Vec::new()),
            reject: Mutex::new(None),
        });
        let panel = GuardrailPanel::new(
            contracts,
            Collaborators {
                reader: ledger.clone(),
                transactions: txs.clone(),
                session: session.clone(),
                clock: clock.clone(),
            },
        );
        Self { clock, session, ledger, txs, panel }
    }

    /// Ledger state with the guardrail installed on `SAFE`.
    pub fn installed() -> Self {
        let h = Self::new();
        h.ledger.set_guard(SAFE, GUARDRAIL);
        h
    }
}

/// Decode the selector of a submitted transaction.
pub fn function_sent(tx: &BaseTransaction) -> Function {
    function_of(&hex_to_bytes(&tx.data).unwrap())
}

/// Raw call data of a submitted transaction.
pub fn data_sent(tx: &BaseTransaction) -> Vec<u8> {
    hex_to_bytes(&tx.data).unwrap()
}

#[tokio::test]
async fn mock_ledger_round_trips_abi() {
    let h = Harness::new();
    h.ledger.set_schedule(SAFE, 5);
    let ret = h.ledger.call(addr(GUARDRAIL), &abi::encode_removal_schedule(addr(SAFE))).await.unwrap();
    assert_eq!(abi::decode_removal_schedule(&ret), Ok(5));
}
