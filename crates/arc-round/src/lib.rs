//! Pooled-round bookkeeping: deadline countdown, round identity and rollover,
//! contribution accounting and win chance. Pure; callers supply `now`.

pub mod chance;
pub mod controller;
pub mod deadline;

pub use chance::{prospective_win_chance_pct, win_chance_pct};
pub use controller::{
    Contribution, ContributionOutcome, DrawOutcome, RoundController, RoundSnapshot, RoundUpdate,
    Winner, DEFAULT_ENTRIES_CAPACITY, DEFAULT_WINNERS_CAPACITY,
};
pub use deadline::{format_countdown, remaining_ms, DeadlineClock, Tick};
