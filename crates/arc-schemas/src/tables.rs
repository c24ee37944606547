//! Payout tables shown next to the wager form and used by the simulated ledger.
//!
//! Multipliers are integer hundredths (`150` = ×1.5). The on-chain contract
//! stays authoritative for real payouts; these tables never decide an outcome
//! inside the session.

use serde::{Deserialize, Serialize};

use crate::game::{DiceDirection, WagerParams};
use crate::units::{apply_multiplier, Wei};

pub const DICE_THRESHOLD_MULTIPLIER: u32 = 150;
pub const DICE_EXACT_MULTIPLIER: u32 = 500;
pub const FLIP_MULTIPLIER: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReelSymbol {
    Btc,
    Eth,
    Mon,
    Usdc,
    Star,
}

impl ReelSymbol {
    pub const ALL: [ReelSymbol; 5] = [
        ReelSymbol::Btc,
        ReelSymbol::Eth,
        ReelSymbol::Mon,
        ReelSymbol::Usdc,
        ReelSymbol::Star,
    ];

    fn triple_multiplier(&self) -> u32 {
        match self {
            ReelSymbol::Btc => 5000,
            ReelSymbol::Eth => 2500,
            ReelSymbol::Mon => 1500,
            ReelSymbol::Usdc => 1000,
            ReelSymbol::Star => 500,
        }
    }

    fn pair_multiplier(&self) -> u32 {
        match self {
            ReelSymbol::Btc => 400,
            ReelSymbol::Eth => 300,
            ReelSymbol::Mon => 200,
            ReelSymbol::Usdc => 150,
            ReelSymbol::Star => 100,
        }
    }
}

/// Multiplier for a spin; `0` means no winning combination.
pub fn slots_multiplier(reels: &[ReelSymbol; 3]) -> u32 {
    let [a, b, c] = *reels;
    if a == b && b == c {
        return a.triple_multiplier();
    }
    if a == b || a == c {
        return a.pair_multiplier();
    }
    if b == c {
        return b.pair_multiplier();
    }
    0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Racer {
    pub id: u8,
    pub name: &'static str,
    /// Fallback odds in hundredths, used when the ledger read is unavailable.
    pub odds: u32,
}

pub const RACERS: [Racer; 5] = [
    Racer { id: 1, name: "Blue Bolt", odds: 250 },
    Racer { id: 2, name: "Red Flash", odds: 300 },
    Racer { id: 3, name: "Green Spark", odds: 200 },
    Racer { id: 4, name: "Purple Surge", odds: 400 },
    Racer { id: 5, name: "Yellow Strike", odds: 350 },
];

pub fn racer(id: u8) -> Option<&'static Racer> {
    RACERS.iter().find(|r| r.id == id)
}

/// Fixed win multiplier for the kinds that have one.
///
/// Slots pay by combination and the jackpot pays the pool, so both are `None`.
pub fn win_multiplier(params: &WagerParams) -> Option<u32> {
    match params {
        WagerParams::Dice { direction, .. } => Some(match direction {
            DiceDirection::Exactly => DICE_EXACT_MULTIPLIER,
            DiceDirection::Over | DiceDirection::Under => DICE_THRESHOLD_MULTIPLIER,
        }),
        WagerParams::Flip { .. } => Some(FLIP_MULTIPLIER),
        WagerParams::Race { racer: id } => racer(*id).map(|r| r.odds),
        WagerParams::Slots | WagerParams::Jackpot => None,
    }
}

/// Display-only payout if the wager wins.
pub fn potential_payout(params: &WagerParams, stake: Wei) -> Option<Wei> {
    win_multiplier(params).map(|m| apply_multiplier(stake, m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::CoinFace;
    use crate::units::parse_units;

    #[test]
    fn slots_combinations() {
        use ReelSymbol::*;
        assert_eq!(slots_multiplier(&[Btc, Btc, Btc]), 5000);
        assert_eq!(slots_multiplier(&[Star, Star, Star]), 500);
        assert_eq!(slots_multiplier(&[Eth, Eth, Mon]), 300);
        assert_eq!(slots_multiplier(&[Mon, Usdc, Usdc]), 150);
        assert_eq!(slots_multiplier(&[Btc, Eth, Mon]), 0);
    }

    #[test]
    fn display_payouts() {
        let stake = parse_units("0.1").unwrap();
        let over = WagerParams::Dice { direction: DiceDirection::Over, target: 7 };
        assert_eq!(potential_payout(&over, stake), Some(parse_units("0.15").unwrap()));

        let exact = WagerParams::Dice { direction: DiceDirection::Exactly, target: 7 };
        assert_eq!(potential_payout(&exact, stake), Some(parse_units("0.5").unwrap()));

        let flip = WagerParams::Flip { face: CoinFace::Heads };
        assert_eq!(potential_payout(&flip, stake), Some(parse_units("0.2").unwrap()));

        let race = WagerParams::Race { racer: 4 };
        assert_eq!(potential_payout(&race, stake), Some(parse_units("0.4").unwrap()));

        assert_eq!(potential_payout(&WagerParams::Slots, stake), None);
    }
}
