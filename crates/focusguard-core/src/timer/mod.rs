mod engine;
mod phase;

pub use engine::{EngineSettings, PauseReason, Rejection, SessionEngine, TimerState};
pub use phase::SessionPhase;
