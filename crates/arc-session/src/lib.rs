//! Wager session: the per-wager state machine, result correlation, bounded
//! history and the pre-submission gate. Pure; no IO and no clock.

pub mod correlator;
pub mod gate;
pub mod history;
pub mod session;
pub mod wager;

pub use correlator::{Correlation, EventCorrelator, DEFAULT_RESOLVED_MEMORY};
pub use gate::{check_placement, GateInputs, RoundWindow, ValidationError};
pub use history::{HistoryBook, HistoryCapacities, HistoryEntry, HistoryLedger};
pub use session::{Ingest, SessionError, Step, WagerSession};
pub use wager::{Transition, TransitionError, Wager, WagerEvent, WagerStatus};
