//! Per-session statistics.
//!
//! The monitor feeds every tick, sample and event through [`SessionStats`]:
//! - **Time**: focus, break and away (auto-paused) milliseconds
//! - **Pauses**: automatic vs manual
//! - **Attention**: how many valid samples during running work saw the user

use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::sensing::SensorSample;
use crate::timer::{SessionPhase, TimerState};

const INTERRUPTION_PENALTY: f64 = 5.0;
const COMPLETION_BONUS: f64 = 10.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub focus_ms: u64,
    pub break_ms: u64,
    pub away_ms: u64,
    pub auto_pauses: u32,
    pub manual_pauses: u32,
    pub completed_work_sessions: u32,
    /// Valid samples seeing the user while work was running.
    pub present_samples: u32,
    /// Valid samples missing the user while work was running.
    pub absent_samples: u32,
    pub sensor_errors: u32,
}

impl SessionStats {
    /// Account for `elapsed_ms` of wall time given the state before the tick.
    pub fn record_time(&mut self, before: &TimerState, elapsed_ms: u64) {
        if before.running {
            let consumed = elapsed_ms.min(before.remaining_ms);
            match before.phase {
                SessionPhase::Work => self.focus_ms += consumed,
                SessionPhase::ShortBreak | SessionPhase::LongBreak => self.break_ms += consumed,
            }
        } else if before.is_auto_paused() {
            self.away_ms += elapsed_ms;
        }
    }

    pub fn record_sample(&mut self, sample: &SensorSample, timer: &TimerState) {
        if !sample.is_valid() {
            self.sensor_errors += 1;
            return;
        }
        if timer.running && timer.phase == SessionPhase::Work {
            if sample.presence_raw {
                self.present_samples += 1;
            } else {
                self.absent_samples += 1;
            }
        }
    }

    pub fn record_event(&mut self, event: &Event) {
        match event {
            Event::AutoPaused { .. } => self.auto_pauses += 1,
            Event::TimerPaused { .. } => self.manual_pauses += 1,
            Event::PhaseCompleted {
                completed: SessionPhase::Work,
                ..
            } => self.completed_work_sessions += 1,
            _ => {}
        }
    }

    /// Share of attended samples during running work, 0..=100.
    pub fn attention_pct(&self) -> f64 {
        let total = self.present_samples + self.absent_samples;
        if total == 0 {
            return 100.0;
        }
        f64::from(self.present_samples) * 100.0 / f64::from(total)
    }

    /// Focus quality score, 0..=100.
    pub fn focus_score(&self) -> f64 {
        let mut score = self.attention_pct() - INTERRUPTION_PENALTY * f64::from(self.auto_pauses);
        if self.completed_work_sessions > 0 {
            score += COMPLETION_BONUS;
        }
        score.clamp(0.0, 100.0)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::{DetectorReading, SensorFault};
    use crate::timer::PauseReason;
    use chrono::Utc;
    use std::time::Instant;

    fn work(running: bool) -> TimerState {
        TimerState {
            phase: SessionPhase::Work,
            remaining_ms: 60_000,
            total_ms: 25 * 60_000,
            running,
            paused_reason: None,
            completed_work_sessions: 0,
            continuous_focus_ms: 0,
        }
    }

    #[test]
    fn time_split_by_state() {
        let mut stats = SessionStats::default();
        stats.record_time(&work(true), 2_000);
        let mut away = work(false);
        away.paused_reason = Some(PauseReason::AutoPauseAbsence);
        stats.record_time(&away, 3_000);
        stats.record_time(&work(false), 5_000);
        let brk = TimerState {
            phase: SessionPhase::ShortBreak,
            ..work(true)
        };
        stats.record_time(&brk, 1_000);

        assert_eq!(stats.focus_ms, 2_000);
        assert_eq!(stats.away_ms, 3_000);
        assert_eq!(stats.break_ms, 1_000);
    }

    #[test]
    fn focus_time_capped_at_remaining() {
        let mut stats = SessionStats::default();
        stats.record_time(&work(true), 90_000);
        assert_eq!(stats.focus_ms, 60_000);
    }

    #[test]
    fn attention_counts_only_running_work() {
        let mut stats = SessionStats::default();
        let present = SensorSample::from_reading(DetectorReading::present(1.0), Instant::now());
        let absent = SensorSample::from_reading(DetectorReading::absent(), Instant::now());
        let error = SensorSample::sensor_error(SensorFault::TimedOut, Instant::now());

        stats.record_sample(&present, &work(true));
        stats.record_sample(&present, &work(true));
        stats.record_sample(&present, &work(true));
        stats.record_sample(&absent, &work(true));
        stats.record_sample(&absent, &work(false));
        stats.record_sample(&error, &work(true));

        assert_eq!(stats.attention_pct(), 75.0);
        assert_eq!(stats.sensor_errors, 1);
    }

    #[test]
    fn focus_score_formula() {
        let mut stats = SessionStats::default();
        assert_eq!(stats.focus_score(), 100.0);

        stats.present_samples = 8;
        stats.absent_samples = 2;
        stats.record_event(&Event::AutoPaused {
            remaining_ms: 0,
            at: Utc::now(),
        });
        assert_eq!(stats.focus_score(), 75.0);

        stats.record_event(&Event::PhaseCompleted {
            completed: SessionPhase::Work,
            next: SessionPhase::ShortBreak,
            completed_work_sessions: 1,
            auto_started: true,
            at: Utc::now(),
        });
        assert_eq!(stats.focus_score(), 85.0);

        stats.auto_pauses = 40;
        assert_eq!(stats.focus_score(), 0.0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut stats = SessionStats {
            focus_ms: 10,
            manual_pauses: 3,
            ..SessionStats::default()
        };
        stats.reset();
        assert_eq!(stats, SessionStats::default());
    }
}
