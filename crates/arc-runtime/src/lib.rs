//! Engine runtime: the pure [`Engine`] core, its actor wrapper and the
//! handle presentation layers talk to.

pub mod actor;
pub mod boot;
pub mod engine;
pub mod event;

pub use actor::{EngineActor, EngineHandle, EngineStopped, PlaceError, RuntimeOptions};
pub use boot::start;
pub use engine::{Diagnostics, Effect, Engine, EngineSnapshot, Input, Placed};
pub use event::EngineEvent;
