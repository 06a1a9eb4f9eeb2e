//! Signal fusion.
//!
//! Keeps a bounded history of samples and derives:
//! - **Presence**: a debounced `Present` / `Absent` verdict that flips only
//!   after K consecutive agreeing raw readings
//! - **Posture / movement trends**: trailing means over the most recent
//!   valid samples, classified against configurable thresholds
//!
//! Sensor-error samples carry no information about the user. They are kept in
//! the history but neither advance nor reset the debounce streak.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::adapter::SensorSample;
use crate::storage::FocusConfig;

/// Fused, debounced presence verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Present,
    Absent,
    /// No verdict committed yet.
    #[default]
    Uncertain,
}

impl PresenceState {
    fn observed(raw: bool) -> Self {
        if raw {
            PresenceState::Present
        } else {
            PresenceState::Absent
        }
    }
}

/// Posture category over the trailing posture mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureState {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

impl PostureState {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => PostureState::Unknown,
            Some(s) if s >= 80.0 => PostureState::Excellent,
            Some(s) if s >= 65.0 => PostureState::Good,
            Some(s) if s >= 50.0 => PostureState::Fair,
            Some(_) => PostureState::Poor,
        }
    }
}

/// Movement category over the trailing movement mean, relative to the
/// configured alert threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementLevel {
    Still,
    Minimal,
    Moderate,
    High,
    Unknown,
}

impl MovementLevel {
    pub fn classify(mean: Option<f64>, threshold: f64) -> Self {
        let Some(mean) = mean else {
            return MovementLevel::Unknown;
        };
        if threshold <= 0.0 {
            return if mean > 0.0 { MovementLevel::High } else { MovementLevel::Still };
        }
        let ratio = mean / threshold;
        if ratio < 0.25 {
            MovementLevel::Still
        } else if ratio < 0.5 {
            MovementLevel::Minimal
        } else if ratio < 1.0 {
            MovementLevel::Moderate
        } else {
            MovementLevel::High
        }
    }
}

/// Trend summary over the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureAlerts {
    pub posture: PostureState,
    pub movement: MovementLevel,
    pub mean_posture: Option<f64>,
    pub mean_movement: Option<f64>,
    pub poor_posture: bool,
    pub excessive_movement: bool,
    /// Sensor errors since the last valid sample.
    pub consecutive_sensor_errors: u32,
}

impl Default for PostureAlerts {
    fn default() -> Self {
        Self {
            posture: PostureState::Unknown,
            movement: MovementLevel::Unknown,
            mean_posture: None,
            mean_movement: None,
            poor_posture: false,
            excessive_movement: false,
            consecutive_sensor_errors: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceTransition {
    pub from: PresenceState,
    pub to: PresenceState,
}

/// Result of pushing one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutput {
    pub presence: PresenceState,
    /// Set when this sample committed a new presence verdict.
    pub transition: Option<PresenceTransition>,
    pub alerts: PostureAlerts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuserSettings {
    /// W: samples retained.
    pub history_window: usize,
    /// Samples averaged for trends.
    pub trend_window: usize,
    /// K: consecutive agreeing samples needed to flip presence.
    pub debounce_count: u32,
    pub movement_alert_threshold: f64,
    pub posture_alert_threshold: f64,
}

impl FuserSettings {
    pub fn from_config(config: &FocusConfig) -> Self {
        Self {
            history_window: config.history_window.max(1),
            trend_window: config.trend_window.max(1),
            debounce_count: config.presence_debounce_count.max(1),
            movement_alert_threshold: config.movement_alert_threshold,
            posture_alert_threshold: config.posture_alert_threshold,
        }
    }
}

impl Default for FuserSettings {
    fn default() -> Self {
        Self::from_config(&FocusConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct SignalFuser {
    settings: FuserSettings,
    history: VecDeque<SensorSample>,
    committed: PresenceState,
    /// Verdict the current streak is voting for.
    pending: Option<PresenceState>,
    streak: u32,
    consecutive_errors: u32,
}

impl SignalFuser {
    pub fn new(settings: FuserSettings) -> Self {
        let capacity = settings.history_window;
        Self {
            settings,
            history: VecDeque::with_capacity(capacity),
            committed: PresenceState::Uncertain,
            pending: None,
            streak: 0,
            consecutive_errors: 0,
        }
    }

    pub fn presence(&self) -> PresenceState {
        self.committed
    }

    pub fn consecutive_sensor_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Ingest one sample.
    pub fn push(&mut self, sample: SensorSample) -> FusionOutput {
        let transition = if sample.is_valid() {
            self.consecutive_errors = 0;
            self.debounce(sample.presence_raw)
        } else {
            self.consecutive_errors = self.consecutive_errors.saturating_add(1);
            None
        };

        if self.history.len() == self.settings.history_window {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        FusionOutput {
            presence: self.committed,
            transition,
            alerts: self.alerts(),
        }
    }

    fn debounce(&mut self, raw: bool) -> Option<PresenceTransition> {
        let observed = PresenceState::observed(raw);
        if observed == self.committed {
            self.pending = None;
            self.streak = 0;
            return None;
        }
        if self.pending == Some(observed) {
            self.streak += 1;
        } else {
            self.pending = Some(observed);
            self.streak = 1;
        }
        if self.streak < self.settings.debounce_count {
            debug!(?observed, streak = self.streak, "presence flip pending");
            return None;
        }
        let from = self.committed;
        self.committed = observed;
        self.pending = None;
        self.streak = 0;
        debug!(?from, to = ?observed, "presence committed");
        Some(PresenceTransition { from, to: observed })
    }

    /// Trend summary recomputed from the history.
    pub fn alerts(&self) -> PostureAlerts {
        let recent: Vec<&SensorSample> = self
            .history
            .iter()
            .rev()
            .filter(|s| s.is_valid())
            .take(self.settings.trend_window)
            .collect();

        let mean_posture = mean(recent.iter().filter_map(|s| s.posture_score));
        let mean_movement = mean(
            recent
                .iter()
                .filter(|s| s.presence_raw)
                .map(|s| s.movement_magnitude),
        );

        PostureAlerts {
            posture: PostureState::from_score(mean_posture),
            movement: MovementLevel::classify(mean_movement, self.settings.movement_alert_threshold),
            mean_posture,
            mean_movement,
            poor_posture: mean_posture.is_some_and(|m| m < self.settings.posture_alert_threshold),
            excessive_movement: mean_movement
                .is_some_and(|m| m > self.settings.movement_alert_threshold),
            consecutive_sensor_errors: self.consecutive_errors,
        }
    }

    /// Apply new settings, keeping the committed verdict.
    pub fn reconfigure(&mut self, settings: FuserSettings) {
        while self.history.len() > settings.history_window {
            self.history.pop_front();
        }
        self.settings = settings;
    }

    /// Forget everything and return to `Uncertain`.
    pub fn reset(&mut self) {
        self.history.clear();
        self.committed = PresenceState::Uncertain;
        self.pending = None;
        self.streak = 0;
        self.consecutive_errors = 0;
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
