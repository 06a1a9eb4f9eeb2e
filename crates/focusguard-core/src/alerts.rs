//! User-facing alerts and recommendations.
//!
//! [`generate_alerts`] is a pure function of the current monitor snapshot: the
//! same inputs always give the same list, in a fixed order.

use serde::{Deserialize, Serialize};

use crate::sensing::{PostureAlerts, PresenceState};
use crate::timer::{Rejection, TimerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CameraUnavailable,
    AwayFromDesk,
    StartRejected,
    PoorPosture,
    ExcessiveMovement,
    TakeBreak,
    BreakReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
}

impl AlertRecord {
    fn new(kind: AlertKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }
}

/// Snapshot the alert rules look at.
#[derive(Debug, Clone, Copy)]
pub struct AlertInputs<'a> {
    pub presence: PresenceState,
    pub posture: &'a PostureAlerts,
    pub timer: &'a TimerState,
    pub posture_alert_threshold: f64,
    pub break_reminder_ms: u64,
    /// Last command refusal not yet superseded.
    pub pending_rejection: Option<Rejection>,
}

pub fn generate_alerts(inputs: &AlertInputs<'_>) -> Vec<AlertRecord> {
    let mut alerts = Vec::new();
    let posture = inputs.posture;
    let timer = inputs.timer;
    let absent = inputs.presence == PresenceState::Absent;

    if posture.consecutive_sensor_errors > 0 {
        alerts.push(AlertRecord::new(
            AlertKind::CameraUnavailable,
            Severity::Warning,
            format!(
                "Camera not responding ({} failed samples). Presence is frozen at its last value.",
                posture.consecutive_sensor_errors
            ),
        ));
    }

    if timer.is_auto_paused() {
        alerts.push(AlertRecord::new(
            AlertKind::AwayFromDesk,
            Severity::Info,
            format!(
                "Timer paused while you are away ({} left). It resumes when you return.",
                timer.formatted_remaining()
            ),
        ));
    }

    if let Some(rejection) = inputs.pending_rejection {
        alerts.push(AlertRecord::new(
            AlertKind::StartRejected,
            Severity::Warning,
            rejection.message(),
        ));
    }

    if posture.poor_posture && !absent {
        let mean = posture.mean_posture.unwrap_or(0.0);
        let severity = if mean < inputs.posture_alert_threshold / 2.0 {
            Severity::Critical
        } else {
            Severity::Warning
        };
        alerts.push(AlertRecord::new(
            AlertKind::PoorPosture,
            severity,
            format!("Posture score {mean:.0}/100. Sit up straight and relax your shoulders."),
        ));
    }

    if posture.excessive_movement && !absent {
        alerts.push(AlertRecord::new(
            AlertKind::ExcessiveMovement,
            Severity::Warning,
            "Lots of movement detected. Try to settle into the task.",
        ));
    }

    if timer.continuous_focus_ms >= inputs.break_reminder_ms {
        alerts.push(AlertRecord::new(
            AlertKind::TakeBreak,
            Severity::Warning,
            format!(
                "You have been focusing for {} minutes. Consider taking a break.",
                timer.continuous_focus_ms / 60_000
            ),
        ));
    }

    if timer.phase.is_break() && timer.is_at_phase_start() {
        alerts.push(AlertRecord::new(
            AlertKind::BreakReady,
            Severity::Info,
            format!("{} is ready. Start it when you are.", timer.phase.label()),
        ));
    }

    alerts
}
