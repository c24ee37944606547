//! Scripted collaborator double.
//!
//! Submissions pop from a queue of scripted outcomes (default: accept with a
//! sequential tx id). Confirmations either resolve immediately from their
//! own queue or, in manual mode, block until the test calls
//! [`ScriptedLedger::release`]. Either call can be made to panic once.
//! Notifications are whatever the test publishes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::BroadcastStream;

use arc_ledger::{
    BalanceReader, ConfirmationError, ConfirmationWatcher, EventFeed, LedgerQuery, LedgerReader,
    LedgerValue, ReadError, SubmissionError, SubmitRequest, WagerSubmitter,
};
use arc_schemas::{Address, FeedKind, NoticeBatch, RoundReading, TxHash, Wei};

type ConfirmResult = Result<(), ConfirmationError>;

#[derive(Default)]
struct State {
    submit_script: VecDeque<Result<TxHash, SubmissionError>>,
    submissions: Vec<SubmitRequest>,
    next_tx: u64,
    manual_confirmations: bool,
    confirm_script: VecDeque<ConfirmResult>,
    waiters: HashMap<TxHash, oneshot::Sender<ConfirmResult>>,
    released: HashMap<TxHash, ConfirmResult>,
    submit_panic: Option<String>,
    confirm_panic: Option<String>,
    round: Option<RoundReading>,
    balance: Wei,
    min_bet: Wei,
}

struct Inner {
    state: Mutex<State>,
    bus: broadcast::Sender<NoticeBatch>,
}

#[derive(Clone)]
pub struct ScriptedLedger {
    inner: Arc<Inner>,
}

impl Default for ScriptedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLedger {
    pub fn new() -> Self {
        let (bus, _rx) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                bus,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_balance(&self, balance: Wei) {
        self.state().balance = balance;
    }

    pub fn set_min_bet(&self, min_bet: Wei) {
        self.state().min_bet = min_bet;
    }

    /// Value returned by subsequent round reads.
    pub fn set_round(&self, reading: RoundReading) {
        self.state().round = Some(reading);
    }

    pub fn script_submission(&self, outcome: Result<TxHash, SubmissionError>) {
        self.state().submit_script.push_back(outcome);
    }

    pub fn script_confirmation(&self, outcome: ConfirmResult) {
        self.state().confirm_script.push_back(outcome);
    }

    /// The next submission panics with `message` instead of returning.
    pub fn panic_on_submit(&self, message: impl Into<String>) {
        self.state().submit_panic = Some(message.into());
    }

    /// The next confirmation wait panics with `message`.
    pub fn panic_on_confirmation(&self, message: impl Into<String>) {
        self.state().confirm_panic = Some(message.into());
    }

    /// Confirmations wait for [`ScriptedLedger::release`].
    pub fn manual_confirmations(&self) {
        self.state().manual_confirmations = true;
    }

    /// Resolve a pending (or future) confirmation of `tx`.
    pub fn release(&self, tx: &TxHash, outcome: ConfirmResult) {
        let mut st = self.state();
        match st.waiters.remove(tx) {
            Some(waiter) => {
                let _ = waiter.send(outcome);
            }
            None => {
                st.released.insert(tx.clone(), outcome);
            }
        }
    }

    /// Transactions currently blocked in manual confirmation.
    pub fn awaiting(&self) -> Vec<TxHash> {
        self.state().waiters.keys().cloned().collect()
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.state().submissions.clone()
    }

    pub fn publish(&self, batch: NoticeBatch) {
        let _ = self.inner.bus.send(batch);
    }

    /// Wait until at least `n` feed subscriptions exist, so that published
    /// batches are not lost.
    pub async fn wait_for_subscribers(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.inner.bus.receiver_count() < n {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

#[async_trait::async_trait]
impl WagerSubmitter for ScriptedLedger {
    async fn submit_wager(&self, req: SubmitRequest) -> Result<TxHash, SubmissionError> {
        let fault = {
            let mut st = self.state();
            st.submissions.push(req);
            st.submit_panic.take()
        };
        if let Some(message) = fault {
            panic!("{message}");
        }
        let mut st = self.state();
        match st.submit_script.pop_front() {
            Some(outcome) => outcome,
            None => {
                st.next_tx += 1;
                Ok(TxHash::new(format!("0x{:064x}", st.next_tx)))
            }
        }
    }
}

#[async_trait::async_trait]
impl ConfirmationWatcher for ScriptedLedger {
    async fn await_confirmation(&self, tx: &TxHash) -> Result<(), ConfirmationError> {
        let fault = self.state().confirm_panic.take();
        if let Some(message) = fault {
            panic!("{message}");
        }
        let rx = {
            let mut st = self.state();
            if let Some(outcome) = st.released.remove(tx) {
                return outcome;
            }
            if !st.manual_confirmations {
                return st.confirm_script.pop_front().unwrap_or(Ok(()));
            }
            let (waiter, rx) = oneshot::channel();
            st.waiters.insert(tx.clone(), waiter);
            rx
        };
        rx.await
            .unwrap_or_else(|_| Err(ConfirmationError::Fault("ledger double dropped".into())))
    }
}

impl EventFeed for ScriptedLedger {
    fn subscribe(&self, feed: FeedKind) -> BoxStream<'static, NoticeBatch> {
        BroadcastStream::new(self.inner.bus.subscribe())
            .filter_map(move |item| {
                futures_util::future::ready(match item {
                    Ok(batch) if batch.feed() == feed => Some(batch),
                    _ => None,
                })
            })
            .boxed()
    }
}

#[async_trait::async_trait]
impl LedgerReader for ScriptedLedger {
    async fn read_value(&self, query: LedgerQuery) -> Result<LedgerValue, ReadError> {
        let st = self.state();
        let round = st.round.clone();
        let no_round = || ReadError::Unavailable("no round scripted".to_string());
        let value = match &query {
            LedgerQuery::CurrentRoundId => LedgerValue::RoundId(round.ok_or_else(no_round)?.round_id),
            LedgerQuery::PoolTotal => LedgerValue::Amount(round.ok_or_else(no_round)?.pool_total),
            LedgerQuery::DrawTime => {
                LedgerValue::TimestampMs(round.ok_or_else(no_round)?.deadline_ms)
            }
            LedgerQuery::PlayerTotal { round_id, .. } => {
                let r = round.ok_or_else(no_round)?;
                let total = if r.round_id == *round_id {
                    r.user_total.unwrap_or(0)
                } else {
                    0
                };
                LedgerValue::Amount(total)
            }
            LedgerQuery::MinBet => LedgerValue::Amount(st.min_bet),
        };
        Ok(value)
    }
}

#[async_trait::async_trait]
impl BalanceReader for ScriptedLedger {
    async fn read_balance(&self, _who: &Address) -> Result<Wei, ReadError> {
        Ok(self.state().balance)
    }
}
