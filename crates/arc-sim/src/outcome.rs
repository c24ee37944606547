//! Outcome derivation for the simulated ledger.
//!
//! Every outcome is a pure function of `(seed, tx)`: the same transaction on
//! the same seed always produces the same result.

use sha2::{Digest, Sha256};

use arc_schemas::tables::{potential_payout, slots_multiplier};
use arc_schemas::units::apply_multiplier;
use arc_schemas::{CoinFace, LedgerDetail, Outcome, ReelSymbol, TxHash, WagerParams, Wei};

pub(crate) fn digest(seed: &str, label: &str, tail: &str) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(seed.as_bytes());
    h.update(b":");
    h.update(label.as_bytes());
    h.update(b":");
    h.update(tail.as_bytes());
    h.finalize().into()
}

/// Decide a single-player wager. `None` for the pooled kind.
pub fn decide(seed: &str, tx: &TxHash, params: &WagerParams, stake: Wei) -> Option<Outcome> {
    let d = digest(seed, "outcome", tx.as_str());
    let (won, detail, payout) = match params {
        WagerParams::Dice { direction, target } => {
            let roll = 2 + d[0] % 6 + d[1] % 6;
            let won = direction.wins(*target, roll);
            (won, LedgerDetail::Dice { roll }, potential_payout(params, stake))
        }
        WagerParams::Flip { face } => {
            let landed = if d[0] & 1 == 0 {
                CoinFace::Heads
            } else {
                CoinFace::Tails
            };
            (
                landed == *face,
                LedgerDetail::Flip { face: landed },
                potential_payout(params, stake),
            )
        }
        WagerParams::Slots => {
            let reel = |b: u8| ReelSymbol::ALL[usize::from(b) % ReelSymbol::ALL.len()];
            let reels = [reel(d[0]), reel(d[1]), reel(d[2])];
            let m = slots_multiplier(&reels);
            (m > 0, LedgerDetail::Slots { reels }, Some(apply_multiplier(stake, m)))
        }
        WagerParams::Race { racer } => {
            let winner = 1 + d[0] % 5;
            (
                winner == *racer,
                LedgerDetail::Race { winner },
                potential_payout(params, stake),
            )
        }
        WagerParams::Jackpot => return None,
    };

    Some(Outcome {
        won,
        payout: if won { payout.unwrap_or(0) } else { 0 },
        detail,
    })
}

/// Pick a pool winner weighted by contribution.
pub fn pick_winner<'a, A>(seed: &str, round_id: u64, entries: &'a [(A, Wei)]) -> Option<&'a A> {
    let pool: Wei = entries.iter().map(|(_, a)| *a).sum();
    if pool == 0 {
        return None;
    }
    let d = digest(seed, "draw", &round_id.to_string());
    let mut word = [0u8; 16];
    word.copy_from_slice(&d[..16]);
    let mut ticket = u128::from_be_bytes(word) % pool;
    for (who, amount) in entries {
        if ticket < *amount {
            return Some(who);
        }
        ticket -= *amount;
    }
    entries.last().map(|(who, _)| who)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_schemas::DiceDirection;

    #[test]
    fn outcomes_are_deterministic() {
        let tx = TxHash::new("0xabc");
        let p = WagerParams::Dice {
            direction: DiceDirection::Over,
            target: 7,
        };
        let a = decide("seed", &tx, &p, 100);
        let b = decide("seed", &tx, &p, 100);
        assert_eq!(a, b);
        match a.map(|o| o.detail) {
            Some(LedgerDetail::Dice { roll }) => assert!((2..=12).contains(&roll)),
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn payout_only_on_win() {
        for i in 0..32 {
            let tx = TxHash::new(format!("0x{i}"));
            let o = decide("s", &tx, &WagerParams::Race { racer: 2 }, 100).unwrap();
            if o.won {
                assert_eq!(o.payout, 300);
            } else {
                assert_eq!(o.payout, 0);
            }
        }
        assert_eq!(decide("s", &TxHash::new("0x1"), &WagerParams::Jackpot, 1), None);
    }

    #[test]
    fn winner_is_weighted_member() {
        let entries = vec![("a", 0u128), ("b", 10), ("c", 5)];
        let w = pick_winner("s", 3, &entries).copied();
        assert!(matches!(w, Some("b") | Some("c")));
        let empty: Vec<(&str, Wei)> = vec![];
        assert_eq!(pick_winner("s", 3, &empty), None);
    }
}
