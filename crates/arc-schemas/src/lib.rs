//! Shared vocabulary for the arcade engine: game kinds, wager parameters,
//! ledger notifications and fixed-point amounts.

pub mod game;
pub mod notice;
pub mod tables;
pub mod units;

pub use game::{
    CoinFace, DiceDirection, GameKind, LedgerDetail, Outcome, ParamsError, WagerParams,
};
pub use notice::{
    Address, ContributionNotice, DrawNotice, FailureNotice, FeedKind, NoticeBatch, ResultNotice,
    RoundReading, RoundStarted, TxHash,
};
pub use tables::ReelSymbol;
pub use units::{format_units, parse_units, UnitsError, Wei};
