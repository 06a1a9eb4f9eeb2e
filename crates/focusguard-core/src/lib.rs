//! # focusguard Core Library
//!
//! Camera-assisted Pomodoro focus sessions. The timer pauses itself while
//! nobody is at the desk and resumes when the user comes back; posture and
//! movement trends turn into gentle alerts.
//!
//! ## Architecture
//!
//! - **Sensing**: a [`SensorAdapter`] wraps the blocking presence detector
//!   (timeout, no overlapping calls) and a [`SignalFuser`] debounces presence
//!   and tracks posture/movement trends
//! - **Timer**: [`SessionEngine`] is a pure Pomodoro state machine driven by
//!   elapsed time and presence changes
//! - **Monitor**: [`FocusMonitor`] ties sensing, timer, alerts and statistics
//!   together and broadcasts [`Event`]s
//! - **Scheduler**: a single tokio task drives both the countdown and sampling
//! - **Simulation**: TOML scenarios replayed on a virtual clock
//!
//! ## Key Components
//!
//! - [`FocusMonitor`]: the facade UIs and the CLI talk to
//! - [`Scheduler`]: the clock driver
//! - [`FocusConfig`]: configuration, stored as TOML

pub mod alerts;
pub mod error;
pub mod events;
pub mod monitor;
pub mod scheduler;
pub mod sensing;
pub mod simulation;
pub mod stats;
pub mod storage;
pub mod timer;

pub use alerts::{generate_alerts, AlertInputs, AlertKind, AlertRecord, Severity};
pub use error::{ConfigError, DetectorError, ScenarioError};
pub use events::Event;
pub use monitor::{CommandOutcome, FocusMonitor};
pub use scheduler::{ScheduleSettings, Scheduler, SchedulerHandle, SharedMonitor};
pub use sensing::{
    Detector, DetectorReading, MovementLevel, PostureAlerts, PostureState, PresenceState,
    SensorAdapter, SensorFault, SensorSample, SignalFuser,
};
pub use simulation::{Replay, ReplayEvent, ReplayReport, Scenario, ScenarioCommand, ScenarioStep, ScriptedDetector};
pub use stats::SessionStats;
pub use storage::{data_dir, FocusConfig};
pub use timer::{PauseReason, Rejection, SessionEngine, SessionPhase, TimerState};
