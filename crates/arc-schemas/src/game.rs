use serde::{Deserialize, Serialize};

use crate::tables::ReelSymbol;
use crate::units::{wei_serde, Wei};

// ---------------------------------------------------------------------------
// GameKind
// ---------------------------------------------------------------------------

/// The five structurally different wager kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Dice,
    Flip,
    Slots,
    Race,
    /// Pooled contribution to a multi-participant round.
    Jackpot,
}

impl GameKind {
    pub const ALL: [GameKind; 5] = [
        GameKind::Dice,
        GameKind::Flip,
        GameKind::Slots,
        GameKind::Race,
        GameKind::Jackpot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Dice => "dice",
            GameKind::Flip => "flip",
            GameKind::Slots => "slots",
            GameKind::Race => "race",
            GameKind::Jackpot => "jackpot",
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, GameKind::Jackpot)
    }
}

impl std::fmt::Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dice" => Ok(GameKind::Dice),
            "flip" => Ok(GameKind::Flip),
            "slots" => Ok(GameKind::Slots),
            "race" | "lightning" => Ok(GameKind::Race),
            "jackpot" => Ok(GameKind::Jackpot),
            other => Err(format!("unknown game kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Lowest and highest sum of two dice.
pub const DICE_MIN: u8 = 2;
pub const DICE_MAX: u8 = 12;

/// Racer ids on the lightning track.
pub const RACER_MIN: u8 = 1;
pub const RACER_MAX: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceDirection {
    Over,
    Under,
    Exactly,
}

impl DiceDirection {
    pub fn wins(&self, target: u8, roll: u8) -> bool {
        match self {
            DiceDirection::Over => roll > target,
            DiceDirection::Under => roll < target,
            DiceDirection::Exactly => roll == target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinFace {
    Heads,
    Tails,
}

/// Kind-specific wager parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WagerParams {
    Dice { direction: DiceDirection, target: u8 },
    Flip { face: CoinFace },
    Slots,
    Race { racer: u8 },
    Jackpot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    DiceTargetOutOfRange(u8),
    /// `over 12` and `under 2` can never win.
    DiceUnwinnable { direction: DiceDirection, target: u8 },
    RacerOutOfRange(u8),
}

impl std::fmt::Display for ParamsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamsError::DiceTargetOutOfRange(t) => {
                write!(f, "dice target {t} outside {DICE_MIN}..={DICE_MAX}")
            }
            ParamsError::DiceUnwinnable { direction, target } => {
                write!(f, "dice bet {direction:?} {target} can never win")
            }
            ParamsError::RacerOutOfRange(r) => {
                write!(f, "racer {r} outside {RACER_MIN}..={RACER_MAX}")
            }
        }
    }
}

impl std::error::Error for ParamsError {}

impl WagerParams {
    pub fn kind(&self) -> GameKind {
        match self {
            WagerParams::Dice { .. } => GameKind::Dice,
            WagerParams::Flip { .. } => GameKind::Flip,
            WagerParams::Slots => GameKind::Slots,
            WagerParams::Race { .. } => GameKind::Race,
            WagerParams::Jackpot => GameKind::Jackpot,
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        match *self {
            WagerParams::Dice { direction, target } => {
                if !(DICE_MIN..=DICE_MAX).contains(&target) {
                    return Err(ParamsError::DiceTargetOutOfRange(target));
                }
                let unwinnable = match direction {
                    DiceDirection::Over => target >= DICE_MAX,
                    DiceDirection::Under => target <= DICE_MIN,
                    DiceDirection::Exactly => false,
                };
                if unwinnable {
                    return Err(ParamsError::DiceUnwinnable { direction, target });
                }
                Ok(())
            }
            WagerParams::Race { racer } => {
                if !(RACER_MIN..=RACER_MAX).contains(&racer) {
                    return Err(ParamsError::RacerOutOfRange(racer));
                }
                Ok(())
            }
            WagerParams::Flip { .. } | WagerParams::Slots | WagerParams::Jackpot => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger-reported outcome
// ---------------------------------------------------------------------------

/// Game-specific part of a ledger-decided result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerDetail {
    Dice {
        roll: u8,
    },
    Flip {
        face: CoinFace,
    },
    Slots {
        reels: [ReelSymbol; 3],
    },
    Race {
        winner: u8,
    },
    /// A pooled contribution resolves once the ledger reports its entry.
    Jackpot {
        round_id: u64,
        entry_index: u64,
        #[serde(with = "wei_serde")]
        pool_after: Wei,
    },
}

impl LedgerDetail {
    pub fn kind(&self) -> GameKind {
        match self {
            LedgerDetail::Dice { .. } => GameKind::Dice,
            LedgerDetail::Flip { .. } => GameKind::Flip,
            LedgerDetail::Slots { .. } => GameKind::Slots,
            LedgerDetail::Race { .. } => GameKind::Race,
            LedgerDetail::Jackpot { .. } => GameKind::Jackpot,
        }
    }
}

/// What the ledger decided for one wager. Never computed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub won: bool,
    #[serde(with = "wei_serde")]
    pub payout: Wei,
    pub detail: LedgerDetail,
}
