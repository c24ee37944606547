//! The single active wager session.
//!
//! Owns the current [`Wager`], the [`EventCorrelator`] watching its
//! transaction and the per-kind [`HistoryBook`]. All mutation goes through
//! the methods below; each returns the transitions it performed so the
//! caller can log, journal and publish them.

use uuid::Uuid;

use arc_schemas::{
    Address, ContributionNotice, GameKind, Outcome, ResultNotice, TxHash, WagerParams, Wei,
};

use crate::correlator::{Correlation, EventCorrelator};
use crate::gate::{check_placement, GateInputs, ValidationError};
use crate::history::{HistoryBook, HistoryCapacities, HistoryEntry};
use crate::wager::{Transition, TransitionError, Wager, WagerEvent, WagerStatus};

/// One performed transition, with the wager as it stands afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub wager: Wager,
    pub from: WagerStatus,
    pub to: WagerStatus,
    /// Set when this step appended to the history ledger.
    pub appended: Option<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A collaborator reported back for a wager that is no longer current.
    StaleWager { current: Option<Uuid>, got: Uuid },
    Transition(TransitionError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::StaleWager { current, got } => match current {
                Some(c) => write!(f, "stale wager {got}: current wager is {c}"),
                None => write!(f, "stale wager {got}: no current wager"),
            },
            SessionError::Transition(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TransitionError> for SessionError {
    fn from(e: TransitionError) -> Self {
        SessionError::Transition(e)
    }
}

/// What a notification batch did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    Applied(Vec<Step>),
    /// Matched the tracked transaction before its confirmation arrived; held
    /// until the confirmation is applied.
    Buffered,
    Miss,
    Redelivery,
}

#[derive(Debug, Clone)]
pub struct WagerSession {
    identity: Option<Address>,
    current: Option<Wager>,
    early: Option<Outcome>,
    correlator: EventCorrelator,
    histories: HistoryBook,
}

impl WagerSession {
    pub fn new(identity: Option<Address>, caps: HistoryCapacities, correlator_memory: usize) -> Self {
        Self {
            correlator: EventCorrelator::with_memory(identity.clone(), correlator_memory),
            identity,
            current: None,
            early: None,
            histories: HistoryBook::new(caps),
        }
    }

    pub fn identity(&self) -> Option<&Address> {
        self.identity.as_ref()
    }

    pub fn current(&self) -> Option<&Wager> {
        self.current.as_ref()
    }

    pub fn histories(&self) -> &HistoryBook {
        &self.histories
    }

    pub fn correlator(&self) -> &EventCorrelator {
        &self.correlator
    }

    /// True while a wager is between placement and a terminal state.
    pub fn in_flight(&self) -> bool {
        self.current
            .as_ref()
            .map(|w| !w.status.is_terminal())
            .unwrap_or(false)
    }

    /// Validate and create a wager, moving it straight to `Submitting`.
    pub fn place(
        &mut self,
        params: WagerParams,
        stake: Wei,
        round_id: Option<u64>,
        inputs: &GateInputs,
    ) -> Result<Step, ValidationError> {
        check_placement(
            self.identity.is_some(),
            self.in_flight(),
            &params,
            stake,
            inputs,
        )?;

        let mut wager = Wager::new(params, stake, round_id, inputs.now_ms);
        let from = wager.status;
        // Idle + Submit is always legal on a fresh wager.
        let to = match wager.apply(&WagerEvent::Submit) {
            Ok(Transition::Changed { to, .. }) => to,
            _ => wager.status,
        };
        self.early = None;
        self.current = Some(wager.clone());
        Ok(Step {
            wager,
            from,
            to,
            appended: None,
        })
    }

    pub fn submission_accepted(
        &mut self,
        wager_id: Uuid,
        tx: TxHash,
    ) -> Result<Vec<Step>, SessionError> {
        let event = WagerEvent::SubmissionAccepted { tx: tx.clone() };
        let steps = self.apply_to(wager_id, &event, 0)?;
        if !steps.is_empty() {
            self.correlator.track(tx);
        }
        Ok(steps)
    }

    pub fn submission_rejected(
        &mut self,
        wager_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<Vec<Step>, SessionError> {
        self.apply_to(
            wager_id,
            &WagerEvent::SubmissionRejected {
                reason: reason.into(),
            },
            0,
        )
    }

    /// Apply a confirmation; a result buffered while confirming resolves now.
    pub fn confirmed(&mut self, wager_id: Uuid, now_ms: i64) -> Result<Vec<Step>, SessionError> {
        let mut steps = self.apply_to(wager_id, &WagerEvent::Confirmed, now_ms)?;
        if !steps.is_empty() {
            if let Some(outcome) = self.early.take() {
                steps.extend(self.apply_to(wager_id, &WagerEvent::Resolve { outcome }, now_ms)?);
            }
        }
        Ok(steps)
    }

    pub fn confirmation_failed(
        &mut self,
        wager_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<Vec<Step>, SessionError> {
        self.early = None;
        let steps = self.apply_to(
            wager_id,
            &WagerEvent::ConfirmationFailed {
                reason: reason.into(),
            },
            0,
        )?;
        if !steps.is_empty() {
            self.correlator.untrack();
        }
        Ok(steps)
    }

    /// Explicit error for a confirmed transaction.
    pub fn late_error(
        &mut self,
        tx: &TxHash,
        reason: impl Into<String>,
    ) -> Result<Vec<Step>, SessionError> {
        let Some(wager_id) = self
            .current
            .as_ref()
            .filter(|w| w.tx.as_ref() == Some(tx))
            .map(|w| w.wager_id)
        else {
            return Ok(Vec::new());
        };
        let steps = self.apply_to(
            wager_id,
            &WagerEvent::LateError {
                reason: reason.into(),
            },
            0,
        )?;
        if !steps.is_empty() {
            self.correlator.untrack();
        }
        Ok(steps)
    }

    pub fn ingest_results(
        &mut self,
        batch: &[ResultNotice],
        now_ms: i64,
    ) -> Result<Ingest, SessionError> {
        let correlation = self.correlator.correlate(batch);
        self.settle(correlation, now_ms)
    }

    /// Resolve a pooled wager from the contribution feed.
    pub fn ingest_contributions(
        &mut self,
        batch: &[ContributionNotice],
        now_ms: i64,
    ) -> Result<Ingest, SessionError> {
        let correlation = match &self.current {
            Some(w) if w.kind.is_pooled() && !w.status.is_terminal() => {
                self.correlator.correlate_contributions(batch, w)
            }
            _ => Correlation::Miss,
        };
        self.settle(correlation, now_ms)
    }

    fn settle(&mut self, correlation: Correlation, now_ms: i64) -> Result<Ingest, SessionError> {
        let notice = match correlation {
            Correlation::Match(n) => n,
            Correlation::Miss => return Ok(Ingest::Miss),
            Correlation::Redelivery => return Ok(Ingest::Redelivery),
        };
        let Some(wager) = &self.current else {
            return Ok(Ingest::Miss);
        };
        let (wager_id, status) = (wager.wager_id, wager.status);
        match status {
            WagerStatus::AwaitingConfirmation => {
                self.early = Some(notice.outcome());
                Ok(Ingest::Buffered)
            }
            WagerStatus::AwaitingResolution => {
                let steps = self.apply_to(
                    wager_id,
                    &WagerEvent::Resolve {
                        outcome: notice.outcome(),
                    },
                    now_ms,
                )?;
                Ok(Ingest::Applied(steps))
            }
            _ => Ok(Ingest::Miss),
        }
    }

    /// Reinstate an in-flight wager recovered from durable storage.
    ///
    /// Refused when another wager is in flight or `wager` is not waiting on
    /// the ledger with a known transaction id.
    pub fn restore(&mut self, wager: Wager) -> bool {
        if self.in_flight() {
            return false;
        }
        let waiting = matches!(
            wager.status,
            WagerStatus::AwaitingConfirmation | WagerStatus::AwaitingResolution
        );
        let Some(tx) = wager.tx.clone().filter(|_| waiting) else {
            return false;
        };
        self.correlator.track(tx);
        self.early = None;
        self.current = Some(wager);
        true
    }

    /// Re-insert a history entry recovered from durable storage.
    pub fn restore_history(&mut self, entry: HistoryEntry) -> bool {
        self.correlator.mark_resolved(&entry.tx);
        self.histories.append(entry)
    }

    pub fn clear_history(&mut self, kind: GameKind) {
        self.histories.clear(kind);
    }

    pub fn clear_all_history(&mut self) {
        self.histories.clear_all();
    }

    fn apply_to(
        &mut self,
        wager_id: Uuid,
        event: &WagerEvent,
        now_ms: i64,
    ) -> Result<Vec<Step>, SessionError> {
        let current_id = self.current.as_ref().map(|w| w.wager_id);
        let wager = match self.current.as_mut() {
            Some(w) if w.wager_id == wager_id => w,
            _ => {
                return Err(SessionError::StaleWager {
                    current: current_id,
                    got: wager_id,
                })
            }
        };

        let (from, to) = match wager.apply(event)? {
            Transition::Changed { from, to } => (from, to),
            Transition::NoOp => return Ok(Vec::new()),
        };

        let mut appended = None;
        if to == WagerStatus::Resolved {
            if let Some(entry) = HistoryEntry::from_resolved(wager, now_ms) {
                self.correlator.mark_resolved(&entry.tx);
                if self.histories.append(entry.clone()) {
                    appended = Some(entry);
                }
            }
        }

        Ok(vec![Step {
            wager: wager.clone(),
            from,
            to,
            appended,
        }])
    }
}
