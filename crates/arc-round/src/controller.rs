//! Round controller for the pooled wager kind.
//!
//! # Invariants
//!
//! - At most one round is held. An authoritative round-id change (start
//!   notification or polled read) replaces it wholesale; nothing from the old
//!   round survives except `recent_winners`.
//! - Round ids only move forward. Notifications for an older round are
//!   dropped.
//! - Within a round `pool_total` never decreases, and a contribution counts
//!   at most once no matter how often it is redelivered.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use arc_schemas::units::wei_serde;
use arc_schemas::{Address, ContributionNotice, DrawNotice, RoundReading, RoundStarted, Wei};

use crate::chance::{prospective_win_chance_pct, win_chance_pct};
use crate::deadline::{DeadlineClock, Tick};

pub const DEFAULT_WINNERS_CAPACITY: usize = 5;
pub const DEFAULT_ENTRIES_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub contributor: Address,
    #[serde(with = "wei_serde")]
    pub amount: Wei,
    pub entry_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub round_id: u64,
    pub winner: Address,
    #[serde(with = "wei_serde")]
    pub prize: Wei,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Round {
    round_id: u64,
    pool_total: Wei,
    clock: DeadlineClock,
    contributions: Vec<Contribution>,
    /// Last authoritative per-user cumulative read for this round.
    read_user_total: Option<Wei>,
    drawn: bool,
}

impl Round {
    fn fresh(round_id: u64, pool_total: Wei, deadline_ms: i64) -> Self {
        Self {
            round_id,
            pool_total,
            clock: DeadlineClock::new(deadline_ms),
            contributions: Vec::new(),
            read_user_total: None,
            drawn: false,
        }
    }

    /// Sum of the held contributions made by `identity`.
    fn local_user_total(&self, identity: Option<&Address>) -> Wei {
        let Some(me) = identity else {
            return 0;
        };
        self.contributions
            .iter()
            .filter(|c| &c.contributor == me)
            .fold(0, |acc: Wei, c| acc.saturating_add(c.amount))
    }

    fn user_total(&self, identity: Option<&Address>) -> Wei {
        self.local_user_total(identity)
            .max(self.read_user_total.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundUpdate {
    /// A different round is now held.
    Replaced { previous: Option<u64>, round_id: u64 },
    /// Same round; pool or deadline moved.
    Updated,
    Unchanged,
    /// Notification for a round older than the held one.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionOutcome {
    Applied,
    Duplicate,
    /// For a round other than the held one (or none is held); dropped.
    StaleRound,
    /// For a round newer than the held one; the caller should refresh.
    AheadOfRound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Recorded { settled_current: bool },
    Duplicate,
}

/// Read-only view of the controller, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_id: Option<u64>,
    #[serde(with = "wei_serde")]
    pub pool_total: Wei,
    pub deadline_ms: Option<i64>,
    pub contributions: Vec<Contribution>,
    #[serde(with = "wei_serde")]
    pub user_total: Wei,
    pub win_chance_pct: f64,
    pub drawn: bool,
    pub recent_winners: Vec<Winner>,
    pub recent_entries: Vec<ContributionNotice>,
}

type EntryKey = (u64, u64, Address, Wei);

#[derive(Debug, Clone)]
pub struct RoundController {
    identity: Option<Address>,
    round: Option<Round>,
    seen: HashSet<EntryKey>,
    recent_winners: VecDeque<Winner>,
    winners_capacity: usize,
    recent_entries: VecDeque<ContributionNotice>,
    entries_capacity: usize,
}

impl RoundController {
    pub fn new(identity: Option<Address>) -> Self {
        Self::with_capacities(identity, DEFAULT_WINNERS_CAPACITY, DEFAULT_ENTRIES_CAPACITY)
    }

    pub fn with_capacities(
        identity: Option<Address>,
        winners_capacity: usize,
        entries_capacity: usize,
    ) -> Self {
        Self {
            identity,
            round: None,
            seen: HashSet::new(),
            recent_winners: VecDeque::new(),
            winners_capacity: winners_capacity.max(1),
            recent_entries: VecDeque::new(),
            entries_capacity: entries_capacity.max(1),
        }
    }

    pub fn round_id(&self) -> Option<u64> {
        self.round.as_ref().map(|r| r.round_id)
    }

    pub fn deadline_ms(&self) -> Option<i64> {
        self.round.as_ref().map(|r| r.clock.deadline_ms())
    }

    pub fn pool_total(&self) -> Wei {
        self.round.as_ref().map(|r| r.pool_total).unwrap_or(0)
    }

    pub fn user_total(&self) -> Wei {
        self.round
            .as_ref()
            .map(|r| r.user_total(self.identity.as_ref()))
            .unwrap_or(0)
    }

    pub fn remaining_ms(&self, now_ms: i64) -> Option<i64> {
        self.round.as_ref().map(|r| r.clock.remaining(now_ms))
    }

    pub fn win_chance_pct(&self) -> f64 {
        win_chance_pct(self.user_total(), self.pool_total())
    }

    pub fn prospective_win_chance_pct(&self, amount: Wei) -> f64 {
        prospective_win_chance_pct(amount, self.pool_total())
    }

    fn replace(&mut self, round: Round) -> RoundUpdate {
        let previous = self.round_id();
        let round_id = round.round_id;
        self.round = Some(round);
        self.seen.clear();
        self.recent_entries.clear();
        RoundUpdate::Replaced { previous, round_id }
    }

    fn is_older(&self, round_id: u64) -> bool {
        self.round_id().map(|held| round_id < held).unwrap_or(false)
    }

    pub fn on_round_started(&mut self, n: &RoundStarted, now_ms: i64) -> RoundUpdate {
        if self.is_older(n.round_id) {
            return RoundUpdate::Stale;
        }
        match self.round.as_mut() {
            Some(r) if r.round_id == n.round_id => {
                if r.clock.deadline_ms() == n.deadline_ms {
                    RoundUpdate::Unchanged
                } else {
                    r.clock.reschedule(n.deadline_ms, now_ms);
                    RoundUpdate::Updated
                }
            }
            _ => self.replace(Round::fresh(n.round_id, 0, n.deadline_ms)),
        }
    }

    pub fn on_reading(&mut self, read: &RoundReading, now_ms: i64) -> RoundUpdate {
        if self.is_older(read.round_id) {
            return RoundUpdate::Stale;
        }
        match self.round.as_mut() {
            Some(r) if r.round_id == read.round_id => {
                let before = (r.pool_total, r.clock.deadline_ms(), r.read_user_total);
                r.pool_total = r.pool_total.max(read.pool_total);
                if r.clock.deadline_ms() != read.deadline_ms {
                    r.clock.reschedule(read.deadline_ms, now_ms);
                }
                // A settled round reports no stake until the next one starts.
                if let Some(u) = read.user_total.filter(|_| !r.drawn) {
                    r.read_user_total = Some(r.read_user_total.unwrap_or(0).max(u));
                }
                if before == (r.pool_total, r.clock.deadline_ms(), r.read_user_total) {
                    RoundUpdate::Unchanged
                } else {
                    RoundUpdate::Updated
                }
            }
            _ => {
                let mut fresh = Round::fresh(read.round_id, read.pool_total, read.deadline_ms);
                fresh.read_user_total = read.user_total;
                self.replace(fresh)
            }
        }
    }

    pub fn on_contribution(&mut self, c: &ContributionNotice) -> ContributionOutcome {
        let Some(r) = self.round.as_mut() else {
            return ContributionOutcome::StaleRound;
        };
        if c.round_id > r.round_id {
            return ContributionOutcome::AheadOfRound;
        }
        if c.round_id != r.round_id {
            return ContributionOutcome::StaleRound;
        }

        let key = (c.round_id, c.entry_index, c.contributor.clone(), c.amount);
        if !self.seen.insert(key) {
            return ContributionOutcome::Duplicate;
        }

        r.contributions.push(Contribution {
            contributor: c.contributor.clone(),
            amount: c.amount,
            entry_index: c.entry_index,
        });
        r.pool_total = r.pool_total.max(c.pool_after);

        self.recent_entries.push_front(c.clone());
        self.recent_entries.truncate(self.entries_capacity);
        ContributionOutcome::Applied
    }

    pub fn on_draw(&mut self, d: &DrawNotice) -> DrawOutcome {
        let already = self
            .recent_winners
            .iter()
            .any(|w| w.round_id == d.round_id && w.winner == d.winner);
        if already {
            return DrawOutcome::Duplicate;
        }
        self.recent_winners.push_front(Winner {
            round_id: d.round_id,
            winner: d.winner.clone(),
            prize: d.prize,
        });
        self.recent_winners.truncate(self.winners_capacity);

        let mut settled_current = false;
        if let Some(r) = self.round.as_mut().filter(|r| r.round_id == d.round_id) {
            r.contributions.clear();
            r.read_user_total = None;
            r.drawn = true;
            self.recent_entries.clear();
            settled_current = true;
        }
        DrawOutcome::Recorded { settled_current }
    }

    /// Advance the countdown. `None` until a round is held.
    pub fn tick(&mut self, now_ms: i64) -> Option<Tick> {
        self.round.as_mut().map(|r| r.clock.tick(now_ms))
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        let r = self.round.as_ref();
        RoundSnapshot {
            round_id: self.round_id(),
            pool_total: self.pool_total(),
            deadline_ms: self.deadline_ms(),
            contributions: r.map(|r| r.contributions.clone()).unwrap_or_default(),
            user_total: self.user_total(),
            win_chance_pct: self.win_chance_pct(),
            drawn: r.map(|r| r.drawn).unwrap_or(false),
            recent_winners: self.recent_winners.iter().cloned().collect(),
            recent_entries: self.recent_entries.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> Address {
        Address::new("0xme")
    }

    fn reading(round_id: u64, pool: Wei, user: Option<Wei>) -> RoundReading {
        RoundReading {
            round_id,
            pool_total: pool,
            deadline_ms: 60_000,
            user_total: user,
        }
    }

    fn entry(round_id: u64, idx: u64, who: Address, amount: Wei, pool_after: Wei) -> ContributionNotice {
        ContributionNotice {
            round_id,
            entry_index: idx,
            contributor: who,
            amount,
            pool_after,
            tx: None,
        }
    }

    #[test]
    fn contribution_counts_once() {
        let mut rc = RoundController::new(Some(me()));
        rc.on_reading(&reading(3, 100, Some(0)), 0);
        let c = entry(3, 0, me(), 10, 110);
        assert_eq!(rc.on_contribution(&c), ContributionOutcome::Applied);
        assert_eq!(rc.on_contribution(&c), ContributionOutcome::Duplicate);
        assert_eq!(rc.pool_total(), 110);
        assert_eq!(rc.user_total(), 10);
        assert_eq!(rc.snapshot().contributions.len(), 1);
    }

    #[test]
    fn rollover_replaces_wholesale() {
        let mut rc = RoundController::new(Some(me()));
        rc.on_reading(&reading(3, 100, None), 0);
        rc.on_contribution(&entry(3, 0, me(), 10, 110));

        let upd = rc.on_reading(&reading(4, 5, None), 1);
        assert_eq!(
            upd,
            RoundUpdate::Replaced {
                previous: Some(3),
                round_id: 4
            }
        );
        assert_eq!(rc.pool_total(), 5);
        assert_eq!(rc.user_total(), 0);
        assert!(rc.snapshot().contributions.is_empty());
        assert!(rc.snapshot().recent_entries.is_empty());

        // Late notices for round 3 are dropped.
        assert_eq!(
            rc.on_contribution(&entry(3, 1, me(), 10, 120)),
            ContributionOutcome::StaleRound
        );
        assert_eq!(rc.on_reading(&reading(3, 500, Some(50)), 2), RoundUpdate::Stale);
        assert_eq!(rc.pool_total(), 5);
    }

    #[test]
    fn pool_is_monotone_within_round() {
        let mut rc = RoundController::new(Some(me()));
        rc.on_reading(&reading(3, 100, None), 0);
        assert_eq!(rc.on_reading(&reading(3, 90, None), 1), RoundUpdate::Unchanged);
        assert_eq!(rc.pool_total(), 100);
        assert_eq!(rc.on_reading(&reading(3, 130, None), 1), RoundUpdate::Updated);
        assert_eq!(rc.pool_total(), 130);
    }

    #[test]
    fn user_total_takes_the_larger_source() {
        let mut rc = RoundController::new(Some(me()));
        rc.on_reading(&reading(3, 100, Some(25)), 0);
        rc.on_contribution(&entry(3, 0, me(), 10, 110));
        assert_eq!(rc.user_total(), 25);
        rc.on_contribution(&entry(3, 1, me(), 30, 140));
        assert_eq!(rc.user_total(), 40);
        rc.on_contribution(&entry(3, 2, Address::new("0xother"), 60, 200));
        assert_eq!(rc.user_total(), 40);
        assert_eq!(rc.win_chance_pct(), 20.0);
    }

    #[test]
    fn newer_round_contribution_asks_for_refresh() {
        let mut rc = RoundController::new(Some(me()));
        assert_eq!(
            rc.on_contribution(&entry(3, 0, me(), 10, 10)),
            ContributionOutcome::StaleRound
        );
        rc.on_reading(&reading(3, 0, None), 0);
        assert_eq!(
            rc.on_contribution(&entry(4, 0, me(), 10, 10)),
            ContributionOutcome::AheadOfRound
        );
    }

    #[test]
    fn draw_settles_and_keeps_winners() {
        let mut rc = RoundController::with_capacities(Some(me()), 2, 10);
        rc.on_reading(&reading(3, 100, None), 0);
        let c = entry(3, 0, me(), 10, 110);
        rc.on_contribution(&c);

        let d = DrawNotice {
            round_id: 3,
            winner: me(),
            prize: 110,
        };
        assert_eq!(rc.on_draw(&d), DrawOutcome::Recorded { settled_current: true });
        assert_eq!(rc.on_draw(&d), DrawOutcome::Duplicate);
        assert_eq!(rc.user_total(), 0);
        assert!(rc.snapshot().drawn);
        // Redelivered contribution stays a no-op after settlement.
        assert_eq!(rc.on_contribution(&c), ContributionOutcome::Duplicate);

        for round in 4..=6 {
            rc.on_draw(&DrawNotice {
                round_id: round,
                winner: Address::new("0xw"),
                prize: 1,
            });
        }
        let winners = rc.snapshot().recent_winners;
        assert_eq!(winners.len(), 2);
        assert_eq!(winners[0].round_id, 6);

        rc.on_reading(&reading(7, 0, None), 1);
        assert_eq!(rc.snapshot().recent_winners.len(), 2, "winners survive rollover");
    }

    #[test]
    fn settled_round_ignores_late_user_reads() {
        let mut rc = RoundController::new(Some(me()));
        rc.on_reading(&reading(3, 100, None), 0);
        rc.on_contribution(&entry(3, 0, me(), 10, 110));
        rc.on_draw(&DrawNotice {
            round_id: 3,
            winner: me(),
            prize: 110,
        });

        rc.on_reading(&reading(3, 110, Some(10)), 1);
        assert_eq!(rc.user_total(), 0);
        assert_eq!(rc.win_chance_pct(), 0.0);
        assert_eq!(rc.pool_total(), 110);

        rc.on_reading(&reading(4, 0, Some(0)), 2);
        rc.on_contribution(&entry(4, 0, me(), 7, 7));
        assert_eq!(rc.user_total(), 7);
    }

    #[test]
    fn local_total_is_the_sum_of_held_entries() {
        let mut rc = RoundController::new(Some(me()));
        rc.on_reading(&reading(3, 0, None), 0);
        rc.on_contribution(&entry(3, 0, me(), 10, 10));
        rc.on_contribution(&entry(3, 1, Address::new("0xother"), 5, 15));
        rc.on_contribution(&entry(3, 2, me(), 20, 35));
        rc.on_contribution(&entry(3, 2, me(), 20, 35));
        let snap = rc.snapshot();
        let mine: Wei = snap
            .contributions
            .iter()
            .filter(|c| c.contributor == me())
            .map(|c| c.amount)
            .sum();
        assert_eq!(mine, 30);
        assert_eq!(snap.user_total, mine);

        let anonymous = {
            let mut rc = RoundController::new(None);
            rc.on_reading(&reading(3, 0, None), 0);
            rc.on_contribution(&entry(3, 0, me(), 10, 10));
            rc.user_total()
        };
        assert_eq!(anonymous, 0);
    }

    #[test]
    fn start_notice_resets_pool() {
        let mut rc = RoundController::new(Some(me()));
        rc.on_reading(&reading(3, 100, None), 0);
        let start = RoundStarted {
            round_id: 4,
            start_ms: 1,
            deadline_ms: 90_000,
        };
        assert!(matches!(rc.on_round_started(&start, 1), RoundUpdate::Replaced { .. }));
        assert_eq!(rc.pool_total(), 0);
        assert_eq!(rc.deadline_ms(), Some(90_000));
        assert_eq!(rc.on_round_started(&start, 2), RoundUpdate::Unchanged);
    }

    #[test]
    fn tick_reports_close_once_per_round() {
        let mut rc = RoundController::new(None);
        assert_eq!(rc.tick(0), None);
        rc.on_reading(&reading(3, 0, None), 0);
        assert!(!rc.tick(59_999).map(|t| t.closed_now).unwrap_or(true));
        assert!(rc.tick(60_000).map(|t| t.closed_now).unwrap_or(false));
        assert!(!rc.tick(61_000).map(|t| t.closed_now).unwrap_or(true));

        let next = RoundReading {
            round_id: 4,
            pool_total: 0,
            deadline_ms: 120_000,
            user_total: None,
        };
        rc.on_reading(&next, 61_000);
        assert!(rc.tick(120_000).map(|t| t.closed_now).unwrap_or(false));
    }
}
