//! TOML-based focus monitoring configuration.
//!
//! Holds every tunable of the control loop:
//! - Phase durations and the long-break cadence
//! - Auto-start and auto face control switches
//! - Presence debounce and sampling cadence
//! - Posture / movement alert thresholds
//!
//! Configuration is stored at `~/.config/focusguard/config.toml`. Values are
//! validated before they are applied or saved; out-of-range values are
//! rejected, never clamped.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::SessionPhase;

const MAX_PHASE_MINUTES: u32 = 24 * 60;
const MAX_HISTORY_WINDOW: usize = 1000;

/// Focus monitoring configuration.
///
/// Serialized to/from TOML. Unknown keys are rejected at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FocusConfig {
    #[serde(default = "default_work_duration")]
    pub work_duration_minutes: u32,
    #[serde(default = "default_short_break")]
    pub short_break_duration_minutes: u32,
    #[serde(default = "default_long_break")]
    pub long_break_duration_minutes: u32,
    #[serde(default = "default_sessions_until_long_break")]
    pub sessions_until_long_break: u32,
    #[serde(default = "default_true")]
    pub auto_start_breaks: bool,
    #[serde(default)]
    pub auto_start_work: bool,
    /// Pause the work phase when nobody is at the desk, resume on return.
    #[serde(default)]
    pub auto_face_control: bool,
    /// Consecutive agreeing samples required to flip presence (K).
    #[serde(default = "default_debounce")]
    pub presence_debounce_count: u32,
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_ms: u64,
    /// Trailing mean movement above this raises an excessive movement alert.
    #[serde(default = "default_movement_threshold")]
    pub movement_alert_threshold: f64,
    /// Trailing mean posture score below this raises a poor posture alert.
    #[serde(default = "default_posture_threshold")]
    pub posture_alert_threshold: f64,
    /// Samples retained by the fuser (W).
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Samples averaged for posture and movement trends.
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// A detector call slower than this becomes a sensor error sample.
    #[serde(default = "default_sensor_timeout")]
    pub sensor_timeout_ms: u64,
    #[serde(default = "default_countdown_interval")]
    pub countdown_interval_ms: u64,
    /// Continuous focus time after which a break is recommended.
    #[serde(default = "default_break_reminder")]
    pub break_reminder_minutes: u32,
}

// Default functions
fn default_work_duration() -> u32 {
    25
}
fn default_short_break() -> u32 {
    5
}
fn default_long_break() -> u32 {
    15
}
fn default_sessions_until_long_break() -> u32 {
    4
}
fn default_true() -> bool {
    true
}
fn default_debounce() -> u32 {
    2
}
fn default_sampling_interval() -> u64 {
    2000
}
fn default_movement_threshold() -> f64 {
    0.6
}
fn default_posture_threshold() -> f64 {
    50.0
}
fn default_history_window() -> usize {
    30
}
fn default_trend_window() -> usize {
    10
}
fn default_sensor_timeout() -> u64 {
    3000
}
fn default_countdown_interval() -> u64 {
    1000
}
fn default_break_reminder() -> u32 {
    50
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            work_duration_minutes: default_work_duration(),
            short_break_duration_minutes: default_short_break(),
            long_break_duration_minutes: default_long_break(),
            sessions_until_long_break: default_sessions_until_long_break(),
            auto_start_breaks: true,
            auto_start_work: false,
            auto_face_control: false,
            presence_debounce_count: default_debounce(),
            sampling_interval_ms: default_sampling_interval(),
            movement_alert_threshold: default_movement_threshold(),
            posture_alert_threshold: default_posture_threshold(),
            history_window: default_history_window(),
            trend_window: default_trend_window(),
            sensor_timeout_ms: default_sensor_timeout(),
            countdown_interval_ms: default_countdown_interval(),
            break_reminder_minutes: default_break_reminder(),
        }
    }
}

fn check_range<T>(key: &str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(ConfigError::invalid(
            key,
            format!("{value} is outside the allowed range {min}..={max}"),
        ));
    }
    Ok(())
}

impl FocusConfig {
    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first offending field as [`ConfigError::InvalidValue`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("work_duration_minutes", self.work_duration_minutes, 1, MAX_PHASE_MINUTES)?;
        check_range(
            "short_break_duration_minutes",
            self.short_break_duration_minutes,
            1,
            MAX_PHASE_MINUTES,
        )?;
        check_range(
            "long_break_duration_minutes",
            self.long_break_duration_minutes,
            1,
            MAX_PHASE_MINUTES,
        )?;
        check_range("sessions_until_long_break", self.sessions_until_long_break, 1, 100)?;
        check_range("history_window", self.history_window, 1, MAX_HISTORY_WINDOW)?;
        check_range(
            "presence_debounce_count",
            self.presence_debounce_count as usize,
            1,
            self.history_window,
        )?;
        check_range("trend_window", self.trend_window, 1, self.history_window)?;
        check_range("sampling_interval_ms", self.sampling_interval_ms, 100, 60_000)?;
        check_range("countdown_interval_ms", self.countdown_interval_ms, 100, 10_000)?;
        check_range("sensor_timeout_ms", self.sensor_timeout_ms, 100, 60_000)?;
        check_range("break_reminder_minutes", self.break_reminder_minutes, 1, MAX_PHASE_MINUTES)?;

        if !self.movement_alert_threshold.is_finite() || self.movement_alert_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "movement_alert_threshold",
                format!("{} must be a finite value >= 0", self.movement_alert_threshold),
            ));
        }
        if !self.posture_alert_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.posture_alert_threshold)
        {
            return Err(ConfigError::invalid(
                "posture_alert_threshold",
                format!("{} must be within 0..=100", self.posture_alert_threshold),
            ));
        }
        Ok(())
    }

    /// Configured duration of a phase in milliseconds.
    pub fn phase_duration_ms(&self, phase: SessionPhase) -> u64 {
        let minutes = match phase {
            SessionPhase::Work => self.work_duration_minutes,
            SessionPhase::ShortBreak => self.short_break_duration_minutes,
            SessionPhase::LongBreak => self.long_break_duration_minutes,
        };
        u64::from(minutes).saturating_mul(60_000)
    }

    pub fn break_reminder_ms(&self) -> u64 {
        u64::from(self.break_reminder_minutes).saturating_mul(60_000)
    }

    fn set_json_value_by_key(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let obj = root
            .as_object_mut()
            .ok_or_else(|| ConfigError::ParseFailed("config is not a table".into()))?;
        let existing = obj
            .get(key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => value
                .parse::<bool>()
                .map(serde_json::Value::Bool)
                .map_err(|e| ConfigError::invalid(key, e.to_string()))?,
            serde_json::Value::Number(_) => {
                if let Ok(n) = value.parse::<u64>() {
                    serde_json::Value::Number(n.into())
                } else if let Ok(n) = value.parse::<f64>() {
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .ok_or_else(|| ConfigError::invalid(key, format!("cannot parse '{value}' as number")))?
                } else {
                    return Err(ConfigError::invalid(key, format!("cannot parse '{value}' as number")));
                }
            }
            _ => serde_json::Value::String(value.into()),
        };

        obj.insert(key.to_string(), new_value);
        Ok(())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("~/.config/focusguard"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation, or if the default config cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    /// Load and validate a config file at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: FocusConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get a config value as string by key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        match json.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Return a copy with `key` set to `value`, validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting configuration is out of range.
    pub fn with_value(&self, key: &str, value: &str) -> Result<Self, ConfigError> {
        let mut json =
            serde_json::to_value(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_key(&mut json, key, value)?;
        let updated: FocusConfig = serde_json::from_value(json)
            .map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        updated.validate()?;
        Ok(updated)
    }

    /// Set a config value by key and persist it to the default location.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let updated = self.with_value(key, value)?;
        updated.save()?;
        *self = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = FocusConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed = FocusConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(FocusConfig::default().validate().is_ok());
    }

    #[test]
    fn config_default_values() {
        let cfg = FocusConfig::default();
        assert_eq!(cfg.work_duration_minutes, 25);
        assert_eq!(cfg.short_break_duration_minutes, 5);
        assert_eq!(cfg.long_break_duration_minutes, 15);
        assert_eq!(cfg.sessions_until_long_break, 4);
        assert!(cfg.auto_start_breaks);
        assert!(!cfg.auto_start_work);
        assert!(!cfg.auto_face_control);
        assert_eq!(cfg.presence_debounce_count, 2);
        assert_eq!(cfg.history_window, 30);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = FocusConfig::from_toml_str("work_duration_minutes = 50\nauto_face_control = true\n")
            .unwrap();
        assert_eq!(cfg.work_duration_minutes, 50);
        assert!(cfg.auto_face_control);
        assert_eq!(cfg.short_break_duration_minutes, 5);
    }

    #[test]
    fn unknown_key_rejected_at_load() {
        let err = FocusConfig::from_toml_str("work_minutes = 50\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed(_)));
    }

    #[test]
    fn zero_duration_rejected() {
        let cfg = FocusConfig {
            work_duration_minutes: 0,
            ..FocusConfig::default()
        };
        match cfg.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "work_duration_minutes"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn debounce_larger_than_window_rejected() {
        let cfg = FocusConfig {
            presence_debounce_count: 40,
            ..FocusConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_finite_threshold_rejected() {
        let cfg = FocusConfig {
            movement_alert_threshold: f64::NAN,
            ..FocusConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = FocusConfig {
            posture_alert_threshold: 120.0,
            ..FocusConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn get_returns_string_for_all_types() {
        let cfg = FocusConfig::default();
        assert_eq!(cfg.get("auto_start_breaks").as_deref(), Some("true"));
        assert_eq!(cfg.get("work_duration_minutes").as_deref(), Some("25"));
        assert_eq!(cfg.get("posture_alert_threshold").as_deref(), Some("50.0"));
        assert!(cfg.get("missing_key").is_none());
    }

    #[test]
    fn with_value_updates_bool_and_number() {
        let cfg = FocusConfig::default();
        let cfg = cfg.with_value("auto_face_control", "true").unwrap();
        assert!(cfg.auto_face_control);
        let cfg = cfg.with_value("work_duration_minutes", "30").unwrap();
        assert_eq!(cfg.work_duration_minutes, 30);
        let cfg = cfg.with_value("movement_alert_threshold", "0.75").unwrap();
        assert_eq!(cfg.movement_alert_threshold, 0.75);
    }

    #[test]
    fn with_value_rejects_unknown_key() {
        let cfg = FocusConfig::default();
        assert_eq!(
            cfg.with_value("nonexistent_key", "1"),
            Err(ConfigError::UnknownKey("nonexistent_key".into()))
        );
    }

    #[test]
    fn with_value_rejects_invalid_type_and_range() {
        let cfg = FocusConfig::default();
        assert!(cfg.with_value("auto_start_work", "not_a_bool").is_err());
        assert!(cfg.with_value("sessions_until_long_break", "0").is_err());
        assert!(cfg.with_value("work_duration_minutes", "-5").is_err());
    }

    #[test]
    fn save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = FocusConfig {
            sampling_interval_ms: 1500,
            ..FocusConfig::default()
        };
        cfg.save_to(&path).unwrap();
        let loaded = FocusConfig::load_from(&path).unwrap();
        assert_eq!(loaded.sampling_interval_ms, 1500);
    }

    #[test]
    fn phase_durations_in_ms() {
        let cfg = FocusConfig::default();
        assert_eq!(cfg.phase_duration_ms(SessionPhase::Work), 25 * 60 * 1000);
        assert_eq!(cfg.phase_duration_ms(SessionPhase::ShortBreak), 5 * 60 * 1000);
        assert_eq!(cfg.phase_duration_ms(SessionPhase::LongBreak), 15 * 60 * 1000);
    }
}
