//! Deterministic in-memory ledger.
//!
//! Implements every `arc-ledger` contract so the engine, CLI and daemon can
//! run end-to-end without a chain:
//! - transaction ids are `0x` + sha256 of `(seed, nonce, player)`;
//! - outcomes are derived from `(seed, tx)` (see [`outcome`]);
//! - result notifications are published when a transaction confirms;
//! - the jackpot round draws lazily once its deadline has passed and a new
//!   round starts immediately.
//!
//! The only time source is the wall clock via `chrono::Utc`, which the
//! jackpot round uses for its deadline.

pub mod outcome;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use arc_ledger::{
    BalanceReader, ConfirmationError, ConfirmationWatcher, EventFeed, LedgerQuery, LedgerReader,
    LedgerValue, ReadError, SubmissionError, SubmitRequest, WagerSubmitter,
};
use arc_schemas::{
    Address, ContributionNotice, DrawNotice, FeedKind, NoticeBatch, ResultNotice, RoundStarted,
    TxHash, WagerParams, Wei,
};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub seed: String,
    /// Balance credited to a player the first time they are seen.
    pub starting_balance: Wei,
    pub min_bet: Wei,
    pub round_duration_ms: i64,
    /// Simulated inclusion latency.
    pub confirm_delay: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: "arcade-sim".to_string(),
            starting_balance: 10 * arc_schemas::units::WEI_PER_UNIT,
            min_bet: 0,
            round_duration_ms: 5 * 60 * 1000,
            confirm_delay: Duration::from_millis(50),
        }
    }
}

impl SimConfig {
    pub fn from_settings(s: &arc_config::SimSettings) -> Self {
        Self {
            seed: s.seed.clone(),
            starting_balance: s.starting_balance,
            min_bet: s.min_bet,
            round_duration_ms: s.round_duration_ms,
            confirm_delay: Duration::from_millis(s.confirm_delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
struct SimRound {
    round_id: u64,
    pool: Wei,
    deadline_ms: i64,
    entries: Vec<(Address, Wei)>,
}

#[derive(Debug)]
struct SimState {
    nonce: u64,
    balances: BTreeMap<Address, Wei>,
    pending: BTreeMap<TxHash, SubmitRequest>,
    mined: BTreeSet<TxHash>,
    round: SimRound,
    player_totals: BTreeMap<(u64, Address), Wei>,
}

#[derive(Debug)]
struct Inner {
    cfg: SimConfig,
    state: Mutex<SimState>,
    bus: broadcast::Sender<NoticeBatch>,
}

#[derive(Debug, Clone)]
pub struct SimLedger {
    inner: Arc<Inner>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SimLedger {
    pub fn new(cfg: SimConfig) -> Self {
        let (bus, _rx) = broadcast::channel(256);
        let round = SimRound {
            round_id: 1,
            pool: 0,
            deadline_ms: now_ms() + cfg.round_duration_ms,
            entries: Vec::new(),
        };
        let state = SimState {
            nonce: 0,
            balances: BTreeMap::new(),
            pending: BTreeMap::new(),
            mined: BTreeSet::new(),
            round,
            player_totals: BTreeMap::new(),
        };
        Self {
            inner: Arc::new(Inner {
                cfg,
                state: Mutex::new(state),
                bus,
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>, String> {
        self.inner
            .state
            .lock()
            .map_err(|_| "sim ledger state poisoned".to_string())
    }

    fn publish(&self, batch: NoticeBatch) {
        // No subscribers is fine; notifications are fire-and-forget.
        let _ = self.inner.bus.send(batch);
    }

    /// Set a player's balance outright.
    pub fn fund(&self, who: &Address, amount: Wei) -> Result<(), String> {
        self.state()?.balances.insert(who.clone(), amount);
        Ok(())
    }

    pub fn current_round_id(&self) -> Result<u64, String> {
        Ok(self.state()?.round.round_id)
    }

    /// Draw the current round if its deadline has passed.
    pub fn draw_if_due(&self) -> Result<bool, String> {
        self.draw_at(now_ms(), false)
    }

    /// Draw the current round immediately regardless of its deadline.
    pub fn force_draw(&self) -> Result<bool, String> {
        self.draw_at(now_ms(), true)
    }

    fn draw_at(&self, now: i64, force: bool) -> Result<bool, String> {
        let mut batches = Vec::new();
        {
            let mut st = self.state()?;
            if !force && now < st.round.deadline_ms {
                return Ok(false);
            }
            let closing = st.round.clone();
            if let Some(winner) =
                outcome::pick_winner(&self.inner.cfg.seed, closing.round_id, &closing.entries)
                    .cloned()
            {
                *st.balances.entry(winner.clone()).or_insert(0) += closing.pool;
                batches.push(NoticeBatch::Draws(vec![DrawNotice {
                    round_id: closing.round_id,
                    winner,
                    prize: closing.pool,
                }]));
            }
            st.round = SimRound {
                round_id: closing.round_id + 1,
                pool: 0,
                deadline_ms: now + self.inner.cfg.round_duration_ms,
                entries: Vec::new(),
            };
            tracing::info!(
                closed = closing.round_id,
                opened = st.round.round_id,
                "sim jackpot round rolled over"
            );
            batches.push(NoticeBatch::Rounds(vec![RoundStarted {
                round_id: st.round.round_id,
                start_ms: now,
                deadline_ms: st.round.deadline_ms,
            }]));
        }
        for b in batches {
            self.publish(b);
        }
        Ok(true)
    }

    fn balance_of(&self, st: &mut SimState, who: &Address) -> Wei {
        *st.balances
            .entry(who.clone())
            .or_insert(self.inner.cfg.starting_balance)
    }

    /// Include a pending transaction and publish its notification.
    fn mine(&self, tx: &TxHash) -> Result<(), ConfirmationError> {
        let batch = {
            let mut st = self.state().map_err(ConfirmationError::Fault)?;
            if st.mined.contains(tx) {
                return Ok(());
            }
            let req = st
                .pending
                .remove(tx)
                .ok_or_else(|| ConfirmationError::Failed(format!("unknown transaction {tx}")))?;
            st.mined.insert(tx.clone());

            match &req.params {
                WagerParams::Jackpot => {
                    let round_id = st.round.round_id;
                    let entry_index = st.round.entries.len() as u64;
                    st.round.entries.push((req.player.clone(), req.stake));
                    st.round.pool += req.stake;
                    *st.player_totals
                        .entry((round_id, req.player.clone()))
                        .or_insert(0) += req.stake;
                    NoticeBatch::Contributions(vec![ContributionNotice {
                        round_id,
                        entry_index,
                        contributor: req.player.clone(),
                        amount: req.stake,
                        pool_after: st.round.pool,
                        tx: Some(tx.clone()),
                    }])
                }
                params => {
                    let decided = outcome::decide(&self.inner.cfg.seed, tx, params, req.stake)
                        .ok_or_else(|| ConfirmationError::Fault("no outcome for kind".to_string()))?;
                    if decided.payout > 0 {
                        *st.balances.entry(req.player.clone()).or_insert(0) += decided.payout;
                    }
                    let game_id = st.mined.len() as u64;
                    NoticeBatch::Results(vec![ResultNotice {
                        tx: tx.clone(),
                        player: Some(req.player.clone()),
                        game_id: Some(game_id),
                        won: decided.won,
                        payout: decided.payout,
                        detail: decided.detail,
                    }])
                }
            }
        };
        self.publish(batch);
        Ok(())
    }
}

#[async_trait::async_trait]
impl WagerSubmitter for SimLedger {
    async fn submit_wager(&self, req: SubmitRequest) -> Result<TxHash, SubmissionError> {
        if req.params.kind().is_pooled() {
            self.draw_if_due().map_err(SubmissionError::Fault)?;
        }
        let mut st = self.state().map_err(SubmissionError::Fault)?;

        if req.stake < self.inner.cfg.min_bet {
            return Err(SubmissionError::Failed("bet below minimum".to_string()));
        }
        let balance = self.balance_of(&mut st, &req.player);
        if balance < req.stake {
            return Err(SubmissionError::Failed("insufficient funds".to_string()));
        }
        if let Some(round_id) = req.round_id {
            if round_id != st.round.round_id {
                return Err(SubmissionError::Failed(format!(
                    "round {round_id} is closed"
                )));
            }
        }

        st.nonce += 1;
        let d = outcome::digest(
            &self.inner.cfg.seed,
            &format!("tx:{}", st.nonce),
            req.player.as_str(),
        );
        let tx = TxHash::new(format!("0x{}", hex::encode(d)));
        st.balances.insert(req.player.clone(), balance - req.stake);
        st.pending.insert(tx.clone(), req);
        Ok(tx)
    }
}

#[async_trait::async_trait]
impl ConfirmationWatcher for SimLedger {
    async fn await_confirmation(&self, tx: &TxHash) -> Result<(), ConfirmationError> {
        tokio::time::sleep(self.inner.cfg.confirm_delay).await;
        self.mine(tx)
    }
}

impl EventFeed for SimLedger {
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
impl LedgerReader for SimLedger {
    async fn read_value(&self, query: LedgerQuery) -> Result<LedgerValue, ReadError> {
        self.draw_if_due().map_err(ReadError::Unavailable)?;
        let st = self.state().map_err(ReadError::Unavailable)?;
        let value = match &query {
            LedgerQuery::CurrentRoundId => LedgerValue::RoundId(st.round.round_id),
            LedgerQuery::PoolTotal => LedgerValue::Amount(st.round.pool),
            LedgerQuery::DrawTime => LedgerValue::TimestampMs(st.round.deadline_ms),
            LedgerQuery::PlayerTotal { round_id, player } => LedgerValue::Amount(
                st.player_totals
                    .get(&(*round_id, player.clone()))
                    .copied()
                    .unwrap_or(0),
            ),
            LedgerQuery::MinBet => LedgerValue::Amount(self.inner.cfg.min_bet),
        };
        Ok(value)
    }
}

#[async_trait::async_trait]
impl BalanceReader for SimLedger {
    async fn read_balance(&self, who: &Address) -> Result<Wei, ReadError> {
        let mut st = self.state().map_err(ReadError::Unavailable)?;
        Ok(self.balance_of(&mut st, who))
    }
}
