use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensing::PresenceState;
use crate::timer::{PauseReason, SessionPhase};

/// Every state change in the focus monitor produces an Event.
/// The UI subscribes to them to play sounds, show toasts and re-render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        phase: SessionPhase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// Manual pause.
    TimerPaused {
        phase: SessionPhase,
        reason: PauseReason,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// Manual resume of a paused phase.
    TimerResumed {
        phase: SessionPhase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// Work phase paused because nobody is at the desk.
    AutoPaused {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// Work phase resumed because the user came back.
    AutoResumed {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    PhaseCompleted {
        completed: SessionPhase,
        next: SessionPhase,
        completed_work_sessions: u32,
        /// Whether `next` started running without user action.
        auto_started: bool,
        at: DateTime<Utc>,
    },
    PhaseSwitched {
        from: SessionPhase,
        to: SessionPhase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        phase: SessionPhase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    PresenceChanged {
        from: PresenceState,
        to: PresenceState,
        at: DateTime<Utc>,
    },
    /// A start/resume was refused; the timer state did not change.
    StartRejected {
        message: String,
        at: DateTime<Utc>,
    },
    ConfigUpdated {
        at: DateTime<Utc>,
    },
    /// First sensor error after a run of good samples.
    SensorUnavailable {
        message: String,
        at: DateTime<Utc>,
    },
    /// First good sample after a run of sensor errors.
    SensorRecovered {
        failed_samples: u32,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Short machine-readable name of the event, as used in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TimerStarted { .. } => "TimerStarted",
            Event::TimerPaused { .. } => "TimerPaused",
            Event::TimerResumed { .. } => "TimerResumed",
            Event::AutoPaused { .. } => "AutoPaused",
            Event::AutoResumed { .. } => "AutoResumed",
            Event::PhaseCompleted { .. } => "PhaseCompleted",
            Event::PhaseSwitched { .. } => "PhaseSwitched",
            Event::TimerReset { .. } => "TimerReset",
            Event::PresenceChanged { .. } => "PresenceChanged",
            Event::StartRejected { .. } => "StartRejected",
            Event::ConfigUpdated { .. } => "ConfigUpdated",
            Event::SensorUnavailable { .. } => "SensorUnavailable",
            Event::SensorRecovered { .. } => "SensorRecovered",
        }
    }
}
