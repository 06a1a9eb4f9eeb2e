//! Scenario replay.
//!
//! A scenario is a TOML script of detector readings, sensor failures, user
//! commands and idle time. It can be played two ways:
//! - [`Replay`] runs it on a virtual clock through a [`FocusMonitor`], for
//!   tests and the `simulate` command. Event order, the virtual `at_ms`
//!   stamps, the final timer state and the statistics are the same on every
//!   run; the wall-clock `at` field inside each event is not
//! - [`play_live`] walks it in real time against a running scheduler, feeding
//!   readings through a [`ScriptedDetector`]
//!
//! ```toml
//! name = "walk away"
//!
//! [config]
//! auto_face_control = true
//!
//! [[steps]]
//! present = true
//! repeat = 2
//!
//! [[steps]]
//! command = "start"
//!
//! [[steps]]
//! present = false
//! repeat = 3
//! ```

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::alerts::AlertRecord;
use crate::error::{DetectorError, ScenarioError};
use crate::events::Event;
use crate::monitor::FocusMonitor;
use crate::scheduler::SharedMonitor;
use crate::sensing::{Detector, DetectorReading, PresenceState, SensorAdapter, SensorFault};
use crate::stats::SessionStats;
use crate::storage::FocusConfig;
use crate::timer::{SessionPhase, TimerState};

/// Upper bound for `repeat` on a sample step.
pub const MAX_REPEAT: u32 = 10_000;
/// Upper bound for a single `advance_secs` step: one week.
pub const MAX_ADVANCE_SECS: u64 = 7 * 24 * 60 * 60;

/// User command issued from a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioCommand {
    Start,
    Pause,
    Toggle,
    Reset,
    /// Fresh session: timer, presence and statistics start over.
    Restart,
    Switch(SessionPhase),
}

impl ScenarioCommand {
    fn apply(self, monitor: &mut FocusMonitor) -> Vec<Event> {
        match self {
            ScenarioCommand::Start => monitor.start().events,
            ScenarioCommand::Pause => monitor.pause(),
            ScenarioCommand::Toggle => monitor.toggle().events,
            ScenarioCommand::Reset => monitor.reset(),
            ScenarioCommand::Restart => monitor.restart_session(),
            ScenarioCommand::Switch(phase) => monitor.switch_phase(phase),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioStep {
    /// `repeat` samples of the same reading.
    Reading { reading: DetectorReading, repeat: u32 },
    /// `repeat` failed samples.
    Fault { fault: SensorFault, repeat: u32 },
    Command(ScenarioCommand),
    /// Idle time with no samples.
    Advance { secs: u64 },
}

/// On-disk shape of a step.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    present: Option<bool>,
    confidence: Option<f64>,
    posture: Option<f64>,
    movement: Option<f64>,
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
    repeat: Option<u32>,
    command: Option<String>,
    switch: Option<String>,
    advance_secs: Option<u64>,
}

impl RawStep {
    fn into_step(self, index: usize) -> Result<ScenarioStep, ScenarioError> {
        let invalid = |message: &str| ScenarioError::InvalidStep {
            index,
            message: message.to_string(),
        };

        let kinds = [
            self.present.is_some(),
            self.error.is_some(),
            self.timeout,
            self.command.is_some(),
            self.switch.is_some(),
            self.advance_secs.is_some(),
        ];
        match kinds.iter().filter(|k| **k).count() {
            0 => return Err(invalid("step has no action")),
            1 => {}
            _ => return Err(invalid("step mixes several actions")),
        }

        let repeat = self.repeat.unwrap_or(1);
        if repeat == 0 {
            return Err(invalid("repeat must be at least 1"));
        }
        if repeat > MAX_REPEAT {
            return Err(invalid(&format!("repeat must be at most {MAX_REPEAT}")));
        }
        let is_sample = self.present.is_some() || self.error.is_some() || self.timeout;
        if self.repeat.is_some() && !is_sample {
            return Err(invalid("repeat only applies to sample steps"));
        }
        let has_reading_fields =
            self.confidence.is_some() || self.posture.is_some() || self.movement.is_some();
        if has_reading_fields && self.present.is_none() {
            return Err(invalid("confidence, posture and movement need `present`"));
        }

        if let Some(present) = self.present {
            let mut reading = if present {
                DetectorReading::present(self.confidence.unwrap_or(1.0))
            } else {
                DetectorReading {
                    confidence: self.confidence.unwrap_or(0.0),
                    ..DetectorReading::absent()
                }
            };
            if let Some(score) = self.posture {
                reading = reading.with_posture(score);
            }
            if let Some(magnitude) = self.movement {
                reading = reading.with_movement(magnitude);
            }
            return Ok(ScenarioStep::Reading { reading, repeat });
        }
        if let Some(message) = self.error {
            return Ok(ScenarioStep::Fault {
                fault: SensorFault::Failed(message),
                repeat,
            });
        }
        if self.timeout {
            return Ok(ScenarioStep::Fault {
                fault: SensorFault::TimedOut,
                repeat,
            });
        }
        if let Some(name) = self.switch {
            let phase = name.parse::<SessionPhase>().map_err(|e| invalid(&e))?;
            return Ok(ScenarioStep::Command(ScenarioCommand::Switch(phase)));
        }
        if let Some(secs) = self.advance_secs {
            if secs > MAX_ADVANCE_SECS {
                return Err(invalid(&format!("advance_secs must be at most {MAX_ADVANCE_SECS}")));
            }
            return Ok(ScenarioStep::Advance { secs });
        }
        let command = match self.command.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("start") => ScenarioCommand::Start,
            Some("pause") => ScenarioCommand::Pause,
            Some("toggle") => ScenarioCommand::Toggle,
            Some("reset") => ScenarioCommand::Reset,
            Some("restart") => ScenarioCommand::Restart,
            Some(other) => return Err(invalid(&format!("unknown command '{other}'"))),
            None => return Err(invalid("step has no action")),
        };
        Ok(ScenarioStep::Command(command))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScenario {
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: Option<FocusConfig>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub config: FocusConfig,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate. A missing `[config]` table means defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ScenarioError> {
        let raw: RawScenario = toml::from_str(content)?;
        let config = raw.config.unwrap_or_default();
        config.validate()?;
        let steps = raw
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| step.into_step(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: raw.name,
            config,
            steps,
        })
    }
}

/// An event stamped with the virtual time it happened at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEvent {
    pub at_ms: u64,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub name: String,
    pub elapsed_ms: u64,
    pub events: Vec<ReplayEvent>,
    pub final_state: TimerState,
    pub remaining: String,
    pub presence: PresenceState,
    pub alerts: Vec<AlertRecord>,
    pub stats: SessionStats,
    pub focus_score: f64,
}

/// Replay on a virtual clock.
pub struct Replay {
    monitor: FocusMonitor,
    origin: Instant,
    clock_ms: u64,
    events: Vec<ReplayEvent>,
}

impl Replay {
    pub fn new(config: FocusConfig) -> Result<Self, ScenarioError> {
        Ok(Self {
            monitor: FocusMonitor::new(config)?,
            origin: Instant::now(),
            clock_ms: 0,
            events: Vec::new(),
        })
    }

    /// Replay a whole scenario from a fresh monitor.
    pub fn run(scenario: &Scenario) -> Result<ReplayReport, ScenarioError> {
        let mut replay = Self::new(scenario.config.clone())?;
        for step in &scenario.steps {
            replay.step(step);
        }
        info!(
            name = %scenario.name,
            events = replay.events.len(),
            elapsed_ms = replay.clock_ms,
            "scenario replayed"
        );
        Ok(replay.report(&scenario.name))
    }

    pub fn monitor(&self) -> &FocusMonitor {
        &self.monitor
    }

    pub fn step(&mut self, step: &ScenarioStep) {
        match step {
            ScenarioStep::Reading { reading, repeat } => {
                for _ in 0..*repeat {
                    self.sample(Ok(reading.clone()));
                }
            }
            ScenarioStep::Fault { fault, repeat } => {
                for _ in 0..*repeat {
                    self.sample(Err(fault.clone()));
                }
            }
            ScenarioStep::Command(command) => {
                let events = command.apply(&mut self.monitor);
                self.record(events);
            }
            ScenarioStep::Advance { secs } => self.advance(secs.saturating_mul(1000)),
        }
    }

    /// Let `ms` of virtual time pass, ticking in countdown-sized slices.
    pub fn advance(&mut self, ms: u64) {
        let slice = self.monitor.config().countdown_interval_ms.max(1);
        let mut left = ms;
        while left > 0 {
            let d = left.min(slice);
            self.clock_ms += d;
            left -= d;
            let events = self.monitor.tick(d);
            self.record(events);
        }
    }

    fn sample(&mut self, result: Result<DetectorReading, SensorFault>) {
        self.advance(self.monitor.config().sampling_interval_ms);
        let at = self.origin + Duration::from_millis(self.clock_ms);
        let events = self.monitor.ingest(SensorAdapter::normalize(result, at));
        self.record(events);
    }

    fn record(&mut self, events: Vec<Event>) {
        let at_ms = self.clock_ms;
        self.events
            .extend(events.into_iter().map(|event| ReplayEvent { at_ms, event }));
    }

    pub fn report(&self, name: &str) -> ReplayReport {
        let state = self.monitor.timer_state().clone();
        ReplayReport {
            name: name.to_string(),
            elapsed_ms: self.clock_ms,
            events: self.events.clone(),
            remaining: state.formatted_remaining(),
            final_state: state,
            presence: self.monitor.presence_state(),
            alerts: self.monitor.alerts(),
            stats: self.monitor.stats().clone(),
            focus_score: self.monitor.stats().focus_score(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ScriptedOutput {
    Reading(DetectorReading),
    Error(String),
    Hang(Duration),
}

/// Detector whose next answer is set by the caller.
#[derive(Debug)]
pub struct ScriptedDetector {
    output: Mutex<ScriptedOutput>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self {
            output: Mutex::new(ScriptedOutput::Reading(DetectorReading::absent())),
        }
    }

    pub fn set_reading(&self, reading: DetectorReading) {
        self.set(ScriptedOutput::Reading(reading));
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.set(ScriptedOutput::Error(message.into()));
    }

    /// Make every call block for `duration`.
    pub fn set_hang(&self, duration: Duration) {
        self.set(ScriptedOutput::Hang(duration));
    }

    fn set(&self, output: ScriptedOutput) {
        *self.output.lock().unwrap_or_else(PoisonError::into_inner) = output;
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self) -> Result<DetectorReading, DetectorError> {
        let output = self
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match output {
            ScriptedOutput::Reading(reading) => Ok(reading),
            ScriptedOutput::Error(message) => Err(DetectorError::Failed(message)),
            ScriptedOutput::Hang(duration) => {
                std::thread::sleep(duration);
                Err(DetectorError::Failed("detector hung".into()))
            }
        }
    }
}

/// Walk a scenario in real time.
///
/// Sample steps set the detector's answer and hold it for `repeat` sampling
/// intervals; the running scheduler does the actual sampling. Commands go
/// through the shared monitor, which settles the scheduler's clock before
/// applying them. Returns early when `cancel` fires.
pub async fn play_live(
    scenario: &Scenario,
    monitor: &SharedMonitor,
    detector: &ScriptedDetector,
    cancel: &CancellationToken,
) {
    let sampling = Duration::from_millis(scenario.config.sampling_interval_ms);
    let hang = Duration::from_millis(scenario.config.sensor_timeout_ms) * 2;

    for (index, step) in scenario.steps.iter().enumerate() {
        debug!(index, ?step, "live step");
        let hold = match step {
            ScenarioStep::Reading { reading, repeat } => {
                detector.set_reading(reading.clone());
                sampling * *repeat
            }
            ScenarioStep::Fault { fault, repeat } => {
                match fault {
                    SensorFault::Failed(message) => detector.set_error(message.clone()),
                    SensorFault::TimedOut => detector.set_hang(hang),
                }
                sampling * *repeat
            }
            ScenarioStep::Command(command) => {
                command.apply(&mut *monitor.lock().await);
                Duration::ZERO
            }
            ScenarioStep::Advance { secs } => Duration::from_secs(*secs),
        };
        if hold.is_zero() {
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(hold) => {}
        }
    }
}
