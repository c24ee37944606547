//! Pre-submission checks.
//!
//! [`check_placement`] runs every check in a fixed order and refuses with
//! the first [`ValidationError`] that applies. A refusal creates no wager and
//! changes no state.

use arc_schemas::{ParamsError, WagerParams, Wei};

/// The reason a placement was refused before reaching the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NoIdentity,
    WagerInFlight,
    NonPositiveStake,
    BelowMinimum { min: Wei, stake: Wei },
    InvalidParameters(ParamsError),
    RoundNotLoaded,
    RoundClosed,
    /// `balance` is `None` when no balance reading is available yet.
    InsufficientBalance { balance: Option<Wei>, stake: Wei },
}

impl ValidationError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NoIdentity => "NO_IDENTITY",
            ValidationError::WagerInFlight => "WAGER_IN_FLIGHT",
            ValidationError::NonPositiveStake => "NON_POSITIVE_STAKE",
            ValidationError::BelowMinimum { .. } => "BELOW_MINIMUM",
            ValidationError::InvalidParameters(_) => "INVALID_PARAMETERS",
            ValidationError::RoundNotLoaded => "ROUND_NOT_LOADED",
            ValidationError::RoundClosed => "ROUND_CLOSED",
            ValidationError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NoIdentity => write!(f, "no session identity connected"),
            ValidationError::WagerInFlight => write!(f, "another wager is still in flight"),
            ValidationError::NonPositiveStake => write!(f, "stake must be greater than zero"),
            ValidationError::BelowMinimum { min, stake } => write!(
                f,
                "stake {} is below the minimum {}",
                arc_schemas::format_units(*stake),
                arc_schemas::format_units(*min)
            ),
            ValidationError::InvalidParameters(e) => write!(f, "invalid parameters: {e}"),
            ValidationError::RoundNotLoaded => write!(f, "round state has not loaded yet"),
            ValidationError::RoundClosed => write!(f, "round deadline has passed"),
            ValidationError::InsufficientBalance { balance, stake } => match balance {
                Some(b) => write!(
                    f,
                    "insufficient balance: have {}, need {}",
                    arc_schemas::format_units(*b),
                    arc_schemas::format_units(*stake)
                ),
                None => write!(f, "balance unknown; cannot cover stake"),
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Pooled-round view needed by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundWindow {
    pub round_id: u64,
    pub deadline_ms: i64,
}

/// Everything outside the session the gate looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInputs {
    pub min_stake: Wei,
    pub require_balance_check: bool,
    pub balance: Option<Wei>,
    /// `None` until the pooled round has been read at least once.
    pub round: Option<RoundWindow>,
    pub now_ms: i64,
}

pub fn check_placement(
    has_identity: bool,
    in_flight: bool,
    params: &WagerParams,
    stake: Wei,
    inputs: &GateInputs,
) -> Result<(), ValidationError> {
    if !has_identity {
        return Err(ValidationError::NoIdentity);
    }
    if in_flight {
        return Err(ValidationError::WagerInFlight);
    }
    if stake == 0 {
        return Err(ValidationError::NonPositiveStake);
    }
    if stake < inputs.min_stake {
        return Err(ValidationError::BelowMinimum {
            min: inputs.min_stake,
            stake,
        });
    }
    params
        .validate()
        .map_err(ValidationError::InvalidParameters)?;

    if params.kind().is_pooled() {
        let round = inputs.round.ok_or(ValidationError::RoundNotLoaded)?;
        if inputs.now_ms >= round.deadline_ms {
            return Err(ValidationError::RoundClosed);
        }
    }

    if inputs.require_balance_check {
        match inputs.balance {
            Some(b) if b >= stake => {}
            balance => return Err(ValidationError::InsufficientBalance { balance, stake }),
        }
    }
    Ok(())
}
