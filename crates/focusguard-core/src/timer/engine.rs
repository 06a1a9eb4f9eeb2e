//! Focus session engine.
//!
//! The engine is a pure Pomodoro state machine over [`TimerState`]. It does not
//! read the clock: the caller passes elapsed time to `tick()` and fused
//! presence changes to `presence_changed()`. Every transition returns the
//! [`Event`] it produced, if any.
//!
//! ## State Transitions
//!
//! ```text
//! Work(Running) --absence--> Work(Paused{AutoPauseAbsence}) --return--> Work(Running)
//! Work --complete--> ShortBreak | LongBreak --complete--> Work
//! Running <--manual toggle--> Paused{Manual}
//! ```
//!
//! Breaks are never paused by absence; a manual pause is never lifted by
//! presence.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::phase::SessionPhase;
use crate::events::Event;
use crate::sensing::PresenceState;
use crate::storage::FocusConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Manual,
    AutoPauseAbsence,
}

/// Authoritative session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub phase: SessionPhase,
    /// Remaining time in milliseconds for the current phase.
    pub remaining_ms: u64,
    /// Configured length of the current phase.
    pub total_ms: u64,
    pub running: bool,
    pub paused_reason: Option<PauseReason>,
    pub completed_work_sessions: u32,
    /// Running work time since the last break began.
    pub continuous_focus_ms: u64,
}

impl TimerState {
    fn new(phase: SessionPhase, total_ms: u64) -> Self {
        Self {
            phase,
            remaining_ms: total_ms,
            total_ms,
            running: false,
            paused_reason: None,
            completed_work_sessions: 0,
            continuous_focus_ms: 0,
        }
    }

    /// Not running and nothing consumed from the current phase yet.
    pub fn is_at_phase_start(&self) -> bool {
        !self.running && self.remaining_ms == self.total_ms
    }

    pub fn is_auto_paused(&self) -> bool {
        self.paused_reason == Some(PauseReason::AutoPauseAbsence)
    }

    /// Remaining time as `MM:SS`, rounded up to the next whole second.
    pub fn formatted_remaining(&self) -> String {
        let secs = self.remaining_ms.div_ceil(1000);
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

/// Engine-relevant subset of [`FocusConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub work_ms: u64,
    pub short_break_ms: u64,
    pub long_break_ms: u64,
    pub sessions_until_long_break: u32,
    pub auto_start_breaks: bool,
    pub auto_start_work: bool,
    pub auto_face_control: bool,
}

impl EngineSettings {
    pub fn from_config(config: &FocusConfig) -> Self {
        Self {
            work_ms: config.phase_duration_ms(SessionPhase::Work),
            short_break_ms: config.phase_duration_ms(SessionPhase::ShortBreak),
            long_break_ms: config.phase_duration_ms(SessionPhase::LongBreak),
            sessions_until_long_break: config.sessions_until_long_break.max(1),
            auto_start_breaks: config.auto_start_breaks,
            auto_start_work: config.auto_start_work,
            auto_face_control: config.auto_face_control,
        }
    }

    pub fn duration_ms(&self, phase: SessionPhase) -> u64 {
        match phase {
            SessionPhase::Work => self.work_ms,
            SessionPhase::ShortBreak => self.short_break_ms,
            SessionPhase::LongBreak => self.long_break_ms,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&FocusConfig::default())
    }
}

/// Why a start/resume command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Auto face control is on and nobody is in front of the camera.
    NobodyPresent,
}

impl Rejection {
    pub fn message(self) -> &'static str {
        match self {
            Rejection::NobodyPresent => {
                "Cannot start the timer while nobody is detected. Make sure you are visible to the camera."
            }
        }
    }
}

/// Pomodoro state machine.
#[derive(Debug, Clone)]
pub struct SessionEngine {
    settings: EngineSettings,
    state: TimerState,
}

impl SessionEngine {
    /// Create an engine in the idle Work phase.
    pub fn new(settings: EngineSettings) -> Self {
        let state = TimerState::new(SessionPhase::Work, settings.work_ms);
        Self { settings, state }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ── Clock ────────────────────────────────────────────────────────

    /// Advance the countdown by `elapsed_ms`.
    ///
    /// Returns `Some(Event::PhaseCompleted)` exactly once when the phase
    /// reaches zero. Time beyond zero is discarded.
    pub fn tick(&mut self, elapsed_ms: u64) -> Option<Event> {
        if !self.state.running || elapsed_ms == 0 {
            return None;
        }
        let consumed = elapsed_ms.min(self.state.remaining_ms);
        self.state.remaining_ms -= consumed;
        if self.state.phase == SessionPhase::Work {
            self.state.continuous_focus_ms = self.state.continuous_focus_ms.saturating_add(consumed);
        }
        if self.state.remaining_ms == 0 {
            return Some(self.complete_phase());
        }
        None
    }

    fn complete_phase(&mut self) -> Event {
        let completed = self.state.phase;
        let (next, auto_start) = match completed {
            SessionPhase::Work => {
                self.state.completed_work_sessions += 1;
                let next = if self.state.completed_work_sessions % self.settings.sessions_until_long_break == 0 {
                    SessionPhase::LongBreak
                } else {
                    SessionPhase::ShortBreak
                };
                (next, self.settings.auto_start_breaks)
            }
            SessionPhase::ShortBreak | SessionPhase::LongBreak => {
                (SessionPhase::Work, self.settings.auto_start_work)
            }
        };

        self.enter_phase(next);
        self.state.running = auto_start;
        self.state.paused_reason = if auto_start { None } else { Some(PauseReason::Manual) };

        info!(
            %completed,
            %next,
            completed_work_sessions = self.state.completed_work_sessions,
            auto_start,
            "phase completed"
        );
        Event::PhaseCompleted {
            completed,
            next,
            completed_work_sessions: self.state.completed_work_sessions,
            auto_started: auto_start,
            at: Utc::now(),
        }
    }

    fn enter_phase(&mut self, phase: SessionPhase) {
        let total = self.settings.duration_ms(phase);
        self.state.phase = phase;
        self.state.total_ms = total;
        self.state.remaining_ms = total;
        if phase.is_break() {
            self.state.continuous_focus_ms = 0;
        }
    }

    // ── Presence ─────────────────────────────────────────────────────

    /// React to a committed change of the fused presence verdict.
    pub fn presence_changed(&mut self, to: PresenceState) -> Option<Event> {
        match to {
            PresenceState::Absent => {
                let event = self.auto_pause();
                if event.is_none() {
                    debug!(phase = %self.state.phase, running = self.state.running, "absence ignored");
                }
                event
            }
            PresenceState::Present => {
                if !self.state.is_auto_paused() {
                    return None;
                }
                self.state.running = true;
                self.state.paused_reason = None;
                info!(remaining_ms = self.state.remaining_ms, "auto-resumed: user is back");
                Some(Event::AutoResumed {
                    remaining_ms: self.state.remaining_ms,
                    at: Utc::now(),
                })
            }
            PresenceState::Uncertain => None,
        }
    }

    /// Re-check the current presence against the session.
    ///
    /// Absence is normally acted on when it is committed, but a work phase
    /// can also start running while the user is already away: auto-started
    /// after a break, or auto face control switched on mid-session.
    pub fn settle_presence(&mut self, presence: PresenceState) -> Option<Event> {
        match presence {
            PresenceState::Absent => self.auto_pause(),
            PresenceState::Present | PresenceState::Uncertain => None,
        }
    }

    fn auto_pause(&mut self) -> Option<Event> {
        let eligible = self.settings.auto_face_control
            && self.state.phase == SessionPhase::Work
            && self.state.running;
        if !eligible {
            return None;
        }
        self.state.running = false;
        self.state.paused_reason = Some(PauseReason::AutoPauseAbsence);
        info!(remaining_ms = self.state.remaining_ms, "auto-paused: nobody at the desk");
        Some(Event::AutoPaused {
            remaining_ms: self.state.remaining_ms,
            at: Utc::now(),
        })
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start or resume the current phase.
    ///
    /// Already running is a no-op. Refused while nobody is present and auto
    /// face control is enabled.
    pub fn start(&mut self, presence: PresenceState) -> Result<Option<Event>, Rejection> {
        if self.state.running {
            return Ok(None);
        }
        if self.settings.auto_face_control && presence == PresenceState::Absent {
            debug!("start rejected: nobody present");
            return Err(Rejection::NobodyPresent);
        }
        let fresh = self.state.is_at_phase_start();
        self.state.running = true;
        self.state.paused_reason = None;
        let event = if fresh {
            Event::TimerStarted {
                phase: self.state.phase,
                remaining_ms: self.state.remaining_ms,
                at: Utc::now(),
            }
        } else {
            Event::TimerResumed {
                phase: self.state.phase,
                remaining_ms: self.state.remaining_ms,
                at: Utc::now(),
            }
        };
        Ok(Some(event))
    }

    /// Pause as a user action.
    ///
    /// An auto-paused timer becomes manually paused, so a later return to
    /// the desk no longer resumes it.
    pub fn pause(&mut self) -> Option<Event> {
        if !self.state.running && !self.state.is_auto_paused() {
            return None;
        }
        self.state.running = false;
        self.state.paused_reason = Some(PauseReason::Manual);
        Some(Event::TimerPaused {
            phase: self.state.phase,
            reason: PauseReason::Manual,
            remaining_ms: self.state.remaining_ms,
            at: Utc::now(),
        })
    }

    /// Pause when running, otherwise try to start.
    pub fn toggle(&mut self, presence: PresenceState) -> Result<Option<Event>, Rejection> {
        if self.state.running {
            Ok(self.pause())
        } else {
            self.start(presence)
        }
    }

    /// Force the phase; the timer is left stopped at the full duration.
    pub fn switch_phase(&mut self, phase: SessionPhase) -> Event {
        let from = self.state.phase;
        self.enter_phase(phase);
        self.state.running = false;
        self.state.paused_reason = None;
        Event::PhaseSwitched {
            from,
            to: phase,
            remaining_ms: self.state.remaining_ms,
            at: Utc::now(),
        }
    }

    /// Restart the current phase from its full duration, stopped.
    pub fn reset(&mut self) -> Event {
        let total = self.settings.duration_ms(self.state.phase);
        self.state.total_ms = total;
        self.state.remaining_ms = total;
        self.state.running = false;
        self.state.paused_reason = None;
        self.state.continuous_focus_ms = 0;
        Event::TimerReset {
            phase: self.state.phase,
            remaining_ms: total,
            at: Utc::now(),
        }
    }

    /// Replace settings. Durations apply from the next phase start, or
    /// immediately when the current phase has not started yet.
    pub fn apply_settings(&mut self, settings: EngineSettings) {
        self.settings = settings;
        if self.state.is_at_phase_start() {
            let total = self.settings.duration_ms(self.state.phase);
            self.state.total_ms = total;
            self.state.remaining_ms = total;
        }
        if !self.settings.auto_face_control && self.state.is_auto_paused() {
            self.state.paused_reason = Some(PauseReason::Manual);
        }
    }
}
