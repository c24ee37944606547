//! Notification builders.

use arc_schemas::{
    Address, ContributionNotice, DiceDirection, DrawNotice, LedgerDetail, ResultNotice,
    RoundReading, RoundStarted, TxHash, Wei,
};

pub fn me() -> Address {
    Address::new("0x00000000000000000000000000000000000000aa")
}

/// Dice result for `tx`; `won` and `payout` are derived from the bet.
pub fn dice_result(
    tx: &TxHash,
    direction: DiceDirection,
    target: u8,
    roll: u8,
    stake: Wei,
) -> ResultNotice {
    let won = direction.wins(target, roll);
    let params = arc_schemas::WagerParams::Dice { direction, target };
    let payout = if won {
        arc_schemas::tables::potential_payout(&params, stake).unwrap_or(0)
    } else {
        0
    };
    ResultNotice {
        tx: tx.clone(),
        player: Some(me()),
        game_id: None,
        won,
        payout,
        detail: LedgerDetail::Dice { roll },
    }
}

pub fn contribution(
    round_id: u64,
    entry_index: u64,
    contributor: &Address,
    amount: Wei,
    pool_after: Wei,
    tx: Option<&TxHash>,
) -> ContributionNotice {
    ContributionNotice {
        round_id,
        entry_index,
        contributor: contributor.clone(),
        amount,
        pool_after,
        tx: tx.cloned(),
    }
}

pub fn draw(round_id: u64, winner: &Address, prize: Wei) -> DrawNotice {
    DrawNotice {
        round_id,
        winner: winner.clone(),
        prize,
    }
}

pub fn round_started(round_id: u64, start_ms: i64, deadline_ms: i64) -> RoundStarted {
    RoundStarted {
        round_id,
        start_ms,
        deadline_ms,
    }
}

pub fn reading(
    round_id: u64,
    pool_total: Wei,
    deadline_ms: i64,
    user_total: Option<Wei>,
) -> RoundReading {
    RoundReading {
        round_id,
        pool_total,
        deadline_ms,
        user_total,
    }
}
