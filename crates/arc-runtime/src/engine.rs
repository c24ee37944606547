//! Pure engine core.
//!
//! [`Engine`] owns the wager session, the round controller and the last known
//! balance. It performs no IO: every input returns the [`Effect`]s the caller
//! must execute (ledger calls, journal appends, bus publications). The actor
//! in [`crate::actor`] is the only production caller; tests drive it
//! directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arc_config::EngineConfig;
use arc_journal::{JournalEvent, Recovered};
use arc_ledger::SubmitRequest;
use arc_round::{ContributionOutcome, DrawOutcome, RoundController, RoundSnapshot, RoundUpdate};
use arc_schemas::units::opt_wei_serde;
use arc_schemas::{
    Address, ContributionNotice, DrawNotice, FailureNotice, GameKind, NoticeBatch, ResultNotice,
    RoundReading, RoundStarted, TxHash, WagerParams, Wei,
};
use arc_session::{
    GateInputs, HistoryEntry, Ingest, RoundWindow, SessionError, Step, ValidationError, Wager,
    WagerSession, WagerStatus,
};

use crate::event::EngineEvent;

// ---------------------------------------------------------------------------
// Inputs / effects
// ---------------------------------------------------------------------------

/// Everything that can happen to the engine besides a placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    SubmissionAccepted { wager_id: Uuid, tx: TxHash },
    SubmissionFailed { wager_id: Uuid, reason: String },
    Confirmed { wager_id: Uuid },
    ConfirmationFailed { wager_id: Uuid, reason: String },
    Results(Vec<ResultNotice>),
    Contributions(Vec<ContributionNotice>),
    Draws(Vec<DrawNotice>),
    RoundsStarted(Vec<RoundStarted>),
    Failures(Vec<FailureNotice>),
    RoundRead(RoundReading),
    MinBetRead(Wei),
    BalanceRead(Wei),
    Tick,
    /// Clear one kind's history, or every kind's when `None`.
    Reset(Option<GameKind>),
}

impl From<NoticeBatch> for Input {
    fn from(batch: NoticeBatch) -> Self {
        match batch {
            NoticeBatch::Results(v) => Input::Results(v),
            NoticeBatch::Contributions(v) => Input::Contributions(v),
            NoticeBatch::Draws(v) => Input::Draws(v),
            NoticeBatch::Rounds(v) => Input::RoundsStarted(v),
            NoticeBatch::Failures(v) => Input::Failures(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Submit(SubmitRequest),
    AwaitConfirmation { wager_id: Uuid, tx: TxHash },
    RefreshRound,
    RefreshBalance,
    Journal(JournalEvent),
    Emit(EngineEvent),
}

/// A wager accepted by the gate, now `Submitting`.
#[derive(Debug, Clone, PartialEq)]
pub struct Placed {
    pub wager: Wager,
    pub effects: Vec<Effect>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Counters for signals that are dropped rather than surfaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub correlation_misses: u64,
    pub redeliveries: u64,
    pub stale_contributions: u64,
    pub stale_rounds: u64,
    pub stale_callbacks: u64,
    pub transition_errors: u64,
}

/// Read-only view handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub identity: Option<Address>,
    pub wager: Option<Wager>,
    pub histories: BTreeMap<GameKind, Vec<HistoryEntry>>,
    pub round: RoundSnapshot,
    pub remaining_ms: Option<i64>,
    #[serde(with = "opt_wei_serde")]
    pub balance: Option<Wei>,
    /// Time since the in-flight wager was placed.
    pub pending_for_ms: Option<i64>,
    pub slow: bool,
    pub diagnostics: Diagnostics,
    pub taken_at_ms: i64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Engine {
    session: WagerSession,
    round: RoundController,
    balance: Option<Wei>,
    configured_min_stake: Wei,
    ledger_min_bet: Wei,
    require_balance_check: bool,
    slow_after_ms: i64,
    diagnostics: Diagnostics,
}

impl Engine {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            session: WagerSession::new(
                cfg.identity.clone(),
                cfg.history,
                cfg.correlator_memory,
            ),
            round: RoundController::with_capacities(
                cfg.identity.clone(),
                cfg.round.winners_capacity,
                cfg.round.entries_capacity,
            ),
            balance: None,
            configured_min_stake: cfg.wager.min_stake,
            ledger_min_bet: 0,
            require_balance_check: cfg.wager.require_balance_check,
            slow_after_ms: cfg.wager.slow_after_ms,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn identity(&self) -> Option<&Address> {
        self.session.identity()
    }

    pub fn current(&self) -> Option<&Wager> {
        self.session.current()
    }

    pub fn session(&self) -> &WagerSession {
        &self.session
    }

    pub fn round(&self) -> &RoundController {
        &self.round
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn min_stake(&self) -> Wei {
        self.configured_min_stake.max(self.ledger_min_bet)
    }

    /// Reinstate state recovered from the journal. Returns how many history
    /// entries were restored.
    pub fn restore(&mut self, recovered: Recovered) -> usize {
        let restored = recovered
            .history
            .into_iter()
            .filter(|e| self.session.restore_history(e.clone()))
            .count();
        if let Some(w) = recovered.pending {
            let wager_id = w.wager_id;
            if self.session.restore(w) {
                tracing::info!(%wager_id, "resumed in-flight wager from journal");
            }
        }
        for w in &recovered.abandoned {
            tracing::warn!(
                wager_id = %w.wager_id,
                status = %w.status,
                "journal holds a wager that cannot be resumed"
            );
        }
        restored
    }

    /// Reads and watches needed right after start (or restart).
    pub fn startup_effects(&self) -> Vec<Effect> {
        let mut out = vec![Effect::RefreshRound, Effect::RefreshBalance];
        if let Some(w) = self.session.current() {
            if let (WagerStatus::AwaitingConfirmation, Some(tx)) = (w.status, &w.tx) {
                out.push(Effect::AwaitConfirmation {
                    wager_id: w.wager_id,
                    tx: tx.clone(),
                });
            }
        }
        out
    }

    fn gate_inputs(&self, now_ms: i64) -> GateInputs {
        GateInputs {
            min_stake: self.min_stake(),
            require_balance_check: self.require_balance_check,
            balance: self.balance,
            round: self
                .round
                .round_id()
                .zip(self.round.deadline_ms())
                .map(|(round_id, deadline_ms)| RoundWindow {
                    round_id,
                    deadline_ms,
                }),
            now_ms,
        }
    }

    /// Validate and start a wager. On success the wager is `Submitting` and
    /// the returned effects include the submission.
    pub fn place(
        &mut self,
        params: WagerParams,
        stake: Wei,
        now_ms: i64,
    ) -> Result<Placed, ValidationError> {
        let inputs = self.gate_inputs(now_ms);
        let round_id = if params.kind().is_pooled() {
            self.round.round_id()
        } else {
            None
        };
        let step = self.session.place(params, stake, round_id, &inputs)?;
        let player = self
            .session
            .identity()
            .cloned()
            .ok_or(ValidationError::NoIdentity)?;

        tracing::info!(
            wager_id = %step.wager.wager_id,
            kind = %step.wager.kind,
            stake = %arc_schemas::format_units(stake),
            "wager placed"
        );

        let req = SubmitRequest {
            wager_id: step.wager.wager_id,
            player,
            params: step.wager.params.clone(),
            stake,
            round_id,
        };
        let wager = step.wager.clone();
        let mut effects = Vec::new();
        push_step(&mut effects, step);
        effects.push(Effect::Submit(req));
        Ok(Placed { wager, effects })
    }

    pub fn handle(&mut self, input: Input, now_ms: i64) -> Vec<Effect> {
        let mut out = Vec::new();
        match input {
            Input::SubmissionAccepted { wager_id, tx } => {
                let r = self.session.submission_accepted(wager_id, tx.clone());
                if self.absorb(r, &mut out) {
                    tracing::info!(%wager_id, %tx, "submission accepted");
                    out.push(Effect::AwaitConfirmation { wager_id, tx });
                    out.push(Effect::RefreshBalance);
                }
            }
            Input::SubmissionFailed { wager_id, reason } => {
                let r = self.session.submission_rejected(wager_id, reason.clone());
                if self.absorb(r, &mut out) {
                    tracing::warn!(%wager_id, %reason, "submission failed");
                    out.push(Effect::Emit(EngineEvent::log("WARN", reason)));
                }
            }
            Input::Confirmed { wager_id } => {
                let pooled = self.current_is_pooled();
                let r = self.session.confirmed(wager_id, now_ms);
                if self.absorb(r, &mut out) {
                    tracing::info!(%wager_id, "transaction confirmed");
                    if pooled {
                        out.push(Effect::RefreshRound);
                    }
                }
            }
            Input::ConfirmationFailed { wager_id, reason } => {
                let r = self.session.confirmation_failed(wager_id, reason.clone());
                if self.absorb(r, &mut out) {
                    tracing::warn!(%wager_id, %reason, "confirmation failed");
                    out.push(Effect::Emit(EngineEvent::log("WARN", reason)));
                    out.push(Effect::RefreshBalance);
                }
            }
            Input::Results(batch) => {
                let r = self.session.ingest_results(&batch, now_ms);
                self.ingest(r, &mut out);
            }
            Input::Contributions(batch) => self.on_contributions(batch, now_ms, &mut out),
            Input::Draws(batch) => self.on_draws(batch, &mut out),
            Input::RoundsStarted(batch) => {
                for n in &batch {
                    let update = self.round.on_round_started(n, now_ms);
                    if let RoundUpdate::Replaced { .. } = update {
                        // Start notifications carry no pool; read it.
                        out.push(Effect::RefreshRound);
                    }
                    self.round_update(update, &mut out);
                }
            }
            Input::Failures(batch) => {
                for f in &batch {
                    let r = self.session.late_error(&f.tx, f.reason.clone());
                    if self.absorb(r, &mut out) {
                        tracing::warn!(tx = %f.tx, reason = %f.reason, "ledger reported error");
                        out.push(Effect::Emit(EngineEvent::log("WARN", f.reason.clone())));
                    }
                }
            }
            Input::RoundRead(reading) => {
                let update = self.round.on_reading(&reading, now_ms);
                self.round_update(update, &mut out);
            }
            Input::MinBetRead(min) => self.ledger_min_bet = min,
            Input::BalanceRead(b) => self.balance = Some(b),
            Input::Tick => {
                if let Some(tick) = self.round.tick(now_ms) {
                    if tick.closed_now {
                        tracing::info!(round_id = ?self.round.round_id(), "round deadline reached");
                        out.push(Effect::RefreshRound);
                    }
                    if let Some(round_id) = self.round.round_id() {
                        out.push(Effect::Emit(EngineEvent::Tick {
                            round_id,
                            remaining_ms: tick.remaining_ms,
                            closed_now: tick.closed_now,
                        }));
                    }
                }
            }
            Input::Reset(kind) => {
                match kind {
                    Some(k) => self.session.clear_history(k),
                    None => self.session.clear_all_history(),
                }
                out.push(Effect::Journal(JournalEvent::HistoryCleared { kind }));
                let label = kind.map(|k| k.as_str()).unwrap_or("all");
                out.push(Effect::Emit(EngineEvent::log(
                    "INFO",
                    format!("history cleared: {label}"),
                )));
            }
        }
        out
    }

    pub fn snapshot(&self, now_ms: i64) -> EngineSnapshot {
        let pending_for_ms = self
            .session
            .current()
            .filter(|_| self.session.in_flight())
            .map(|w| (now_ms - w.placed_at_ms).max(0));
        EngineSnapshot {
            identity: self.session.identity().cloned(),
            wager: self.session.current().cloned(),
            histories: self.session.histories().snapshot(),
            round: self.round.snapshot(),
            remaining_ms: self.round.remaining_ms(now_ms),
            balance: self.balance,
            pending_for_ms,
            slow: pending_for_ms
                .map(|p| p >= self.slow_after_ms)
                .unwrap_or(false),
            diagnostics: self.diagnostics,
            taken_at_ms: now_ms,
        }
    }

    fn current_is_pooled(&self) -> bool {
        self.session
            .current()
            .map(|w| w.kind.is_pooled())
            .unwrap_or(false)
    }

    fn on_contributions(
        &mut self,
        batch: Vec<ContributionNotice>,
        now_ms: i64,
        out: &mut Vec<Effect>,
    ) {
        let mut changed = false;
        let mut refresh = false;
        for c in &batch {
            match self.round.on_contribution(c) {
                ContributionOutcome::Applied => changed = true,
                ContributionOutcome::Duplicate => {}
                ContributionOutcome::StaleRound => {
                    self.diagnostics.stale_contributions += 1;
                    tracing::debug!(
                        round_id = c.round_id,
                        "contribution for another round dropped"
                    );
                }
                ContributionOutcome::AheadOfRound => refresh = true,
            }
        }
        if changed {
            out.push(Effect::Emit(EngineEvent::Round {
                round: self.round.snapshot(),
            }));
        }
        if refresh {
            out.push(Effect::RefreshRound);
        }

        let r = self.session.ingest_contributions(&batch, now_ms);
        self.ingest(r, out);
    }

    fn on_draws(&mut self, batch: Vec<DrawNotice>, out: &mut Vec<Effect>) {
        for d in &batch {
            match self.round.on_draw(d) {
                DrawOutcome::Recorded { settled_current } => {
                    tracing::info!(round_id = d.round_id, winner = %d.winner, "round drawn");
                    if settled_current {
                        out.push(Effect::RefreshRound);
                    }
                    if Some(&d.winner) == self.session.identity() {
                        out.push(Effect::RefreshBalance);
                    }
                    out.push(Effect::Emit(EngineEvent::Round {
                        round: self.round.snapshot(),
                    }));
                }
                DrawOutcome::Duplicate => {}
            }
        }
    }

    fn round_update(&mut self, update: RoundUpdate, out: &mut Vec<Effect>) {
        match update {
            RoundUpdate::Replaced { previous, round_id } => {
                tracing::info!(?previous, round_id, "round replaced");
                out.push(Effect::Emit(EngineEvent::Round {
                    round: self.round.snapshot(),
                }));
            }
            RoundUpdate::Updated => out.push(Effect::Emit(EngineEvent::Round {
                round: self.round.snapshot(),
            })),
            RoundUpdate::Unchanged => {}
            RoundUpdate::Stale => {
                self.diagnostics.stale_rounds += 1;
                tracing::debug!("stale round notification dropped");
            }
        }
    }

    /// Returns true when the ingest resolved the wager.
    fn ingest(&mut self, r: Result<Ingest, SessionError>, out: &mut Vec<Effect>) -> bool {
        match r {
            Ok(Ingest::Applied(steps)) => {
                let resolved = steps.iter().any(|s| s.to == WagerStatus::Resolved);
                let pooled = steps
                    .iter()
                    .any(|s| s.to == WagerStatus::Resolved && s.wager.kind.is_pooled());
                for s in steps {
                    push_step(out, s);
                }
                if resolved {
                    out.push(Effect::RefreshBalance);
                }
                if pooled && !out.iter().any(|e| matches!(e, Effect::RefreshRound)) {
                    out.push(Effect::RefreshRound);
                }
                resolved
            }
            Ok(Ingest::Buffered) => {
                tracing::debug!("result arrived before confirmation; buffered");
                false
            }
            Ok(Ingest::Miss) => {
                self.diagnostics.correlation_misses += 1;
                tracing::debug!("notification batch matched no tracked transaction");
                false
            }
            Ok(Ingest::Redelivery) => {
                self.diagnostics.redeliveries += 1;
                tracing::debug!("redelivered result ignored");
                false
            }
            Err(e) => {
                self.session_error(e);
                false
            }
        }
    }

    /// Push the steps of a collaborator callback; true when anything moved.
    fn absorb(&mut self, r: Result<Vec<Step>, SessionError>, out: &mut Vec<Effect>) -> bool {
        match r {
            Ok(steps) => {
                let moved = !steps.is_empty();
                for s in steps {
                    push_step(out, s);
                }
                moved
            }
            Err(e) => {
                self.session_error(e);
                false
            }
        }
    }

    fn session_error(&mut self, e: SessionError) {
        match &e {
            SessionError::StaleWager { .. } => {
                self.diagnostics.stale_callbacks += 1;
                tracing::warn!(error = %e, "callback for a wager that is no longer current");
            }
            SessionError::Transition(_) => {
                self.diagnostics.transition_errors += 1;
                tracing::warn!(error = %e, "illegal wager transition ignored");
            }
        }
    }
}

fn push_step(out: &mut Vec<Effect>, step: Step) {
    out.push(Effect::Journal(JournalEvent::WagerTransition {
        from: step.from,
        to: step.to,
        wager: step.wager.clone(),
    }));
    out.push(Effect::Emit(EngineEvent::Wager {
        from: step.from,
        to: step.to,
        wager: step.wager,
    }));
    if let Some(entry) = step.appended {
        out.push(Effect::Journal(JournalEvent::HistoryAppended {
            entry: entry.clone(),
        }));
        out.push(Effect::Emit(EngineEvent::History { entry }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_schemas::{CoinFace, LedgerDetail};

    fn cfg() -> EngineConfig {
        EngineConfig {
            identity: Some(Address::new("0xme")),
            ..EngineConfig::default()
        }
    }

    fn funded() -> Engine {
        let mut e = Engine::from_config(&cfg());
        e.handle(Input::BalanceRead(1_000), 0);
        e
    }

    fn submitted(effects: &[Effect]) -> SubmitRequest {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Submit(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn place_journals_then_submits() {
        let mut e = funded();
        let placed = e
            .place(WagerParams::Flip { face: CoinFace::Heads }, 10, 5)
            .unwrap();
        assert_eq!(placed.wager.status, WagerStatus::Submitting);
        let fx = placed.effects;
        assert!(matches!(
            fx[0],
            Effect::Journal(JournalEvent::WagerTransition {
                to: WagerStatus::Submitting,
                ..
            })
        ));
        let req = submitted(&fx);
        assert_eq!(req.player, Address::new("0xme"));
        assert_eq!(req.round_id, None);
    }

    #[test]
    fn ledger_min_bet_raises_configured_minimum() {
        let mut e = funded();
        e.handle(Input::MinBetRead(50), 0);
        let err = e
            .place(WagerParams::Flip { face: CoinFace::Heads }, 10, 0)
            .unwrap_err();
        assert_eq!(err, ValidationError::BelowMinimum { min: 50, stake: 10 });
    }

    #[test]
    fn miss_is_counted_not_surfaced() {
        let mut e = funded();
        let fx = e.handle(
            Input::Results(vec![ResultNotice {
                tx: TxHash::new("0xother"),
                player: None,
                game_id: None,
                won: true,
                payout: 1,
                detail: LedgerDetail::Flip {
                    face: CoinFace::Tails,
                },
            }]),
            0,
        );
        assert!(fx.is_empty());
        assert_eq!(e.diagnostics().correlation_misses, 1);
    }

    #[test]
    fn stale_callback_is_counted() {
        let mut e = funded();
        e.handle(
            Input::Confirmed {
                wager_id: Uuid::new_v4(),
            },
            0,
        );
        assert_eq!(e.diagnostics().stale_callbacks, 1);
    }

    #[test]
    fn slow_flag_follows_pending_time() {
        let mut e = funded();
        e.place(WagerParams::Flip { face: CoinFace::Heads }, 10, 1_000)
            .unwrap();
        assert!(!e.snapshot(2_000).slow);
        let snap = e.snapshot(31_000);
        assert_eq!(snap.pending_for_ms, Some(30_000));
        assert!(snap.slow);
    }

    #[test]
    fn reset_journals_clear() {
        let mut e = funded();
        let fx = e.handle(Input::Reset(Some(GameKind::Race)), 0);
        assert_eq!(
            fx[0],
            Effect::Journal(JournalEvent::HistoryCleared {
                kind: Some(GameKind::Race)
            })
        );
    }
}
