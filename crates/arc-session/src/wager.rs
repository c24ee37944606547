//! Wager state machine.
//!
//! # Design
//!
//! One generic machine serves every game kind; the kind-specific parts travel
//! as [`WagerParams`] on the way in and [`Outcome`] on the way out. Every
//! lifecycle signal is applied via [`Wager::apply`], which enforces:
//!
//! 1. **Legal transitions only.** Illegal events return [`TransitionError`]
//!    and leave the wager untouched.
//! 2. **Idempotent redelivery.** A result redelivered to a `Resolved` wager or
//!    a failure redelivered to a terminal wager is a silent no-op.
//!
//! ```text
//!   Idle ──Submit──► Submitting ──Accepted(tx)──► AwaitingConfirmation ──Confirmed──► AwaitingResolution
//!                        │                                │                                │      │
//!                     Rejected                     ConfirmationFailed                   Resolve  LateError
//!                        ▼                                ▼                                ▼      ▼
//!                     Failed (term.) ◄────────────────────┴──────────────────────── Resolved  Failed
//! ```
//!
//! Nothing here times out: a wager waits in `AwaitingResolution` until the
//! ledger reports a result or an explicit error.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arc_schemas::{GameKind, Outcome, TxHash, WagerParams, Wei};

// ---------------------------------------------------------------------------
// WagerStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    /// Created locally, not yet handed to the ledger.
    Idle,
    Submitting,
    /// Ledger accepted the submission and assigned a transaction id.
    AwaitingConfirmation,
    /// Transaction confirmed; waiting for the ledger to report the outcome.
    AwaitingResolution,
    /// Outcome recorded. **Terminal.**
    Resolved,
    /// Rejected, reverted, or explicitly errored. **Terminal.**
    Failed,
}

impl WagerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Idle => "idle",
            WagerStatus::Submitting => "submitting",
            WagerStatus::AwaitingConfirmation => "awaiting_confirmation",
            WagerStatus::AwaitingResolution => "awaiting_resolution",
            WagerStatus::Resolved => "resolved",
            WagerStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WagerEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum WagerEvent {
    /// Hand the wager to the submission collaborator (→ `Submitting`).
    Submit,
    SubmissionAccepted { tx: TxHash },
    SubmissionRejected { reason: String },
    Confirmed,
    ConfirmationFailed { reason: String },
    /// A correlated ledger result (→ `Resolved`).
    Resolve { outcome: Outcome },
    /// Explicit error reported after confirmation (→ `Failed`).
    LateError { reason: String },
}

impl WagerEvent {
    fn name(&self) -> &'static str {
        match self {
            WagerEvent::Submit => "Submit",
            WagerEvent::SubmissionAccepted { .. } => "SubmissionAccepted",
            WagerEvent::SubmissionRejected { .. } => "SubmissionRejected",
            WagerEvent::Confirmed => "Confirmed",
            WagerEvent::ConfirmationFailed { .. } => "ConfirmationFailed",
            WagerEvent::Resolve { .. } => "Resolve",
            WagerEvent::LateError { .. } => "LateError",
        }
    }
}

// ---------------------------------------------------------------------------
// Transition / TransitionError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed { from: WagerStatus, to: WagerStatus },
    /// Redelivery to a terminal wager; nothing changed.
    NoOp,
}

/// Returned when an event cannot legally be applied in the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub wager_id: Uuid,
    pub from: WagerStatus,
    pub event: &'static str,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal wager transition: {} + {} (wager {})",
            self.from, self.event, self.wager_id
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Wager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub wager_id: Uuid,
    pub kind: GameKind,
    pub params: WagerParams,
    #[serde(with = "arc_schemas::units::wei_serde")]
    pub stake: Wei,
    /// Absent until the ledger accepts the submission; never reassigned.
    pub tx: Option<TxHash>,
    /// Pooled kind only: the round active when the wager was placed.
    pub round_id: Option<u64>,
    pub status: WagerStatus,
    pub outcome: Option<Outcome>,
    pub error: Option<String>,
    pub placed_at_ms: i64,
}

impl Wager {
    pub fn new(params: WagerParams, stake: Wei, round_id: Option<u64>, placed_at_ms: i64) -> Self {
        Self {
            wager_id: Uuid::new_v4(),
            kind: params.kind(),
            params,
            stake,
            tx: None,
            round_id,
            status: WagerStatus::Idle,
            outcome: None,
            error: None,
            placed_at_ms,
        }
    }

    /// Apply one lifecycle event.
    ///
    /// # Errors
    /// [`TransitionError`] for out-of-sequence events; the wager is unchanged.
    pub fn apply(&mut self, event: &WagerEvent) -> Result<Transition, TransitionError> {
        use WagerEvent::*;
        use WagerStatus::*;

        let from = self.status;
        match (from, event) {
            (Idle, Submit) => self.status = Submitting,

            (Submitting, SubmissionAccepted { tx }) => {
                self.tx = Some(tx.clone());
                self.status = AwaitingConfirmation;
            }
            (Submitting, SubmissionRejected { reason }) => self.fail(reason),

            (AwaitingConfirmation, Confirmed) => self.status = AwaitingResolution,
            (AwaitingConfirmation, ConfirmationFailed { reason }) => self.fail(reason),

            (AwaitingResolution, Resolve { outcome }) => {
                self.outcome = Some(outcome.clone());
                self.status = Resolved;
            }
            (AwaitingResolution, LateError { reason }) => self.fail(reason),

            // Redelivered result: the ledger already decided.
            (Resolved, Resolve { .. }) => return Ok(Transition::NoOp),
            // Late failure signals cannot overturn a recorded outcome.
            (Resolved, ConfirmationFailed { .. } | LateError { .. }) => {
                return Ok(Transition::NoOp)
            }
            (Failed, SubmissionRejected { .. } | ConfirmationFailed { .. } | LateError { .. }) => {
                return Ok(Transition::NoOp)
            }

            (state, ev) => {
                return Err(TransitionError {
                    wager_id: self.wager_id,
                    from: state,
                    event: ev.name(),
                });
            }
        }

        Ok(Transition::Changed {
            from,
            to: self.status,
        })
    }

    fn fail(&mut self, reason: &str) {
        self.error = Some(reason.to_string());
        self.status = WagerStatus::Failed;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
