//! Focus monitor facade.
//!
//! [`FocusMonitor`] owns the fuser, the session engine and the statistics and
//! is the only thing UI code talks to. Every call returns the events it
//! produced; the same events are broadcast to subscribers.
//!
//! Time reaches the engine in one of two ways. Replays and tests call
//! [`FocusMonitor::tick`] with explicit virtual milliseconds. A live
//! scheduler attaches a monotonic clock instead; from then on every command,
//! sample and countdown tick first settles the time that passed since the
//! previous call, so the engine always sees a command at the moment it was
//! issued.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::alerts::{generate_alerts, AlertInputs, AlertRecord};
use crate::error::ConfigError;
use crate::events::Event;
use crate::sensing::{FuserSettings, PostureAlerts, PresenceState, SensorSample, SignalFuser};
use crate::stats::SessionStats;
use crate::storage::FocusConfig;
use crate::timer::{EngineSettings, Rejection, SessionEngine, SessionPhase, TimerState};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of a start/toggle command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandOutcome {
    pub events: Vec<Event>,
    pub rejection: Option<Rejection>,
}

impl CommandOutcome {
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}

/// Monotonic anchor for live operation.
#[derive(Debug, Clone, Copy)]
struct LiveClock {
    anchor: Instant,
}

impl LiveClock {
    fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }

    /// Whole milliseconds since the last call. The fractional remainder stays
    /// on the anchor so nothing is lost across calls.
    fn elapsed_ms(&mut self) -> u64 {
        let ms = u64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.anchor += Duration::from_millis(ms);
        ms
    }
}

pub struct FocusMonitor {
    config: FocusConfig,
    engine: SessionEngine,
    fuser: SignalFuser,
    stats: SessionStats,
    pending_rejection: Option<Rejection>,
    clock: Option<LiveClock>,
    sender: broadcast::Sender<Event>,
    config_tx: watch::Sender<FocusConfig>,
}

impl FocusMonitor {
    pub fn new(config: FocusConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (config_tx, _) = watch::channel(config.clone());
        Ok(Self {
            engine: SessionEngine::new(EngineSettings::from_config(&config)),
            fuser: SignalFuser::new(FuserSettings::from_config(&config)),
            stats: SessionStats::default(),
            pending_rejection: None,
            clock: None,
            sender,
            config_tx,
            config,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Follow accepted configuration changes.
    pub fn watch_config(&self) -> watch::Receiver<FocusConfig> {
        self.config_tx.subscribe()
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn timer_state(&self) -> &TimerState {
        self.engine.state()
    }

    pub fn presence_state(&self) -> PresenceState {
        self.fuser.presence()
    }

    pub fn posture_alerts(&self) -> PostureAlerts {
        self.fuser.alerts()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        let posture = self.fuser.alerts();
        generate_alerts(&AlertInputs {
            presence: self.fuser.presence(),
            posture: &posture,
            timer: self.engine.state(),
            posture_alert_threshold: self.config.posture_alert_threshold,
            break_reminder_ms: self.config.break_reminder_ms(),
            pending_rejection: self.pending_rejection,
        })
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    pub fn has_clock(&self) -> bool {
        self.clock.is_some()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> CommandOutcome {
        let settled = self.catch_up();
        let result = self.engine.start(self.fuser.presence());
        self.command_outcome(settled, result)
    }

    pub fn toggle(&mut self) -> CommandOutcome {
        let settled = self.catch_up();
        let result = self.engine.toggle(self.fuser.presence());
        self.command_outcome(settled, result)
    }

    pub fn pause(&mut self) -> Vec<Event> {
        let mut events = self.catch_up();
        self.pending_rejection = None;
        let event = self.engine.pause();
        events.extend(self.emit(event.into_iter().collect()));
        events
    }

    /// Reset the countdown of the current phase. Presence tracking and
    /// statistics are untouched.
    pub fn reset(&mut self) -> Vec<Event> {
        let mut events = self.catch_up();
        self.pending_rejection = None;
        let event = self.engine.reset();
        events.extend(self.emit(vec![event]));
        events
    }

    pub fn switch_phase(&mut self, phase: SessionPhase) -> Vec<Event> {
        let mut events = self.catch_up();
        self.pending_rejection = None;
        let event = self.engine.switch_phase(phase);
        events.extend(self.emit(vec![event]));
        events
    }

    /// Start over: idle work phase, presence back to `Uncertain`, statistics
    /// cleared. The configuration is kept.
    pub fn restart_session(&mut self) -> Vec<Event> {
        let mut events = self.catch_up();
        let presence = self.fuser.presence();
        self.engine = SessionEngine::new(EngineSettings::from_config(&self.config));
        self.fuser.reset();
        self.stats.reset();
        self.pending_rejection = None;
        info!("session restarted");

        let state = self.engine.state();
        let mut produced = vec![Event::TimerReset {
            phase: state.phase,
            remaining_ms: state.remaining_ms,
            at: Utc::now(),
        }];
        if presence != PresenceState::Uncertain {
            produced.push(Event::PresenceChanged {
                from: presence,
                to: PresenceState::Uncertain,
                at: Utc::now(),
            });
        }
        events.extend(self.emit(produced));
        events
    }

    /// Replace the configuration. An invalid config is rejected and the
    /// current one stays in effect. Accepted configs are published to
    /// [`watch_config`](Self::watch_config) receivers.
    pub fn update_config(&mut self, config: FocusConfig) -> Result<Vec<Event>, ConfigError> {
        config.validate()?;
        let mut events = self.catch_up();
        self.engine.apply_settings(EngineSettings::from_config(&config));
        self.fuser.reconfigure(FuserSettings::from_config(&config));
        self.config = config;
        self.config_tx.send_replace(self.config.clone());
        info!("configuration updated");

        let mut produced = vec![Event::ConfigUpdated { at: Utc::now() }];
        // Auto face control may just have been switched on with nobody there.
        produced.extend(self.engine.settle_presence(self.fuser.presence()));
        events.extend(self.emit(produced));
        Ok(events)
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    // ── Inputs from the scheduler ────────────────────────────────────

    /// Feed one sensor sample through the fuser into the engine.
    pub fn ingest(&mut self, sample: SensorSample) -> Vec<Event> {
        // Time up to now belongs to the state before the sample.
        let mut events = self.catch_up();
        let failed_before = self.fuser.consecutive_sensor_errors();
        self.stats.record_sample(&sample, self.engine.state());
        let fault = sample.fault().cloned();

        let output = self.fuser.push(sample);
        let mut produced = Vec::new();

        match fault {
            Some(fault) if failed_before == 0 => {
                warn!("sensor unavailable: {fault}");
                produced.push(Event::SensorUnavailable {
                    message: fault.to_string(),
                    at: Utc::now(),
                });
            }
            None if failed_before > 0 => {
                info!(failed_samples = failed_before, "sensor recovered");
                produced.push(Event::SensorRecovered {
                    failed_samples: failed_before,
                    at: Utc::now(),
                });
            }
            _ => {}
        }

        if let Some(transition) = output.transition {
            produced.push(Event::PresenceChanged {
                from: transition.from,
                to: transition.to,
                at: Utc::now(),
            });
            if let Some(event) = self.engine.presence_changed(transition.to) {
                self.pending_rejection = None;
                produced.push(event);
            }
        }

        events.extend(self.emit(produced));
        events
    }

    /// Advance the countdown by `elapsed_ms`.
    ///
    /// While a clock is attached time comes from it; use
    /// [`catch_up`](Self::catch_up) instead.
    pub fn tick(&mut self, elapsed_ms: u64) -> Vec<Event> {
        self.stats.record_time(self.engine.state(), elapsed_ms);
        let mut events: Vec<Event> = self.engine.tick(elapsed_ms).into_iter().collect();
        if !events.is_empty() {
            self.pending_rejection = None;
            // An auto-started work phase must not run for an empty desk.
            events.extend(self.engine.settle_presence(self.fuser.presence()));
        }
        self.emit(events)
    }

    // ── Live clock ───────────────────────────────────────────────────

    /// Take elapsed time from a monotonic clock starting now.
    pub fn attach_clock(&mut self) {
        debug!("live clock attached");
        self.clock = Some(LiveClock::new());
    }

    /// Settle the clock one last time and go back to explicit ticks.
    pub fn detach_clock(&mut self) -> Vec<Event> {
        let events = self.catch_up();
        if self.clock.take().is_some() {
            debug!("live clock detached");
        }
        events
    }

    /// Apply the time elapsed on the attached clock. Without a clock this
    /// does nothing.
    pub fn catch_up(&mut self) -> Vec<Event> {
        let Some(clock) = self.clock.as_mut() else {
            return Vec::new();
        };
        let elapsed_ms = clock.elapsed_ms();
        self.tick(elapsed_ms)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn command_outcome(
        &mut self,
        mut events: Vec<Event>,
        result: Result<Option<Event>, Rejection>,
    ) -> CommandOutcome {
        match result {
            Ok(event) => {
                self.pending_rejection = None;
                events.extend(self.emit(event.into_iter().collect()));
                CommandOutcome {
                    events,
                    rejection: None,
                }
            }
            Err(rejection) => {
                self.pending_rejection = Some(rejection);
                let event = Event::StartRejected {
                    message: rejection.message().to_string(),
                    at: Utc::now(),
                };
                events.extend(self.emit(vec![event]));
                CommandOutcome {
                    events,
                    rejection: Some(rejection),
                }
            }
        }
    }

    fn emit(&mut self, events: Vec<Event>) -> Vec<Event> {
        for event in &events {
            self.stats.record_event(event);
            // No subscribers is fine.
            let _ = self.sender.send(event.clone());
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertKind;
    use crate::sensing::{DetectorReading, SensorFault};
    use crate::timer::PauseReason;
    use std::time::Instant;

    fn config() -> FocusConfig {
        FocusConfig {
            auto_face_control: true,
            presence_debounce_count: 2,
            ..FocusConfig::default()
        }
    }

    fn present() -> SensorSample {
        SensorSample::from_reading(DetectorReading::present(0.9), Instant::now())
    }

    fn absent() -> SensorSample {
        SensorSample::from_reading(DetectorReading::absent(), Instant::now())
    }

    fn timeout() -> SensorSample {
        SensorSample::sensor_error(SensorFault::TimedOut, Instant::now())
    }

    #[test]
    fn rejects_invalid_config() {
        let bad = FocusConfig {
            work_duration_minutes: 0,
            ..FocusConfig::default()
        };
        assert!(FocusMonitor::new(bad).is_err());
    }

    #[test]
    fn absence_round_trip_through_fuser() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        monitor.ingest(present());
        monitor.ingest(present());
        assert!(!monitor.start().is_rejected());
        monitor.tick(2_000);

        monitor.ingest(absent());
        let events = monitor.ingest(absent());
        assert!(events.iter().any(|e| matches!(e, Event::AutoPaused { .. })));
        assert_eq!(
            monitor.timer_state().paused_reason,
            Some(PauseReason::AutoPauseAbsence)
        );
        assert!(monitor
            .alerts()
            .iter()
            .any(|a| a.kind == AlertKind::AwayFromDesk));

        monitor.ingest(present());
        let events = monitor.ingest(present());
        assert!(events.iter().any(|e| matches!(e, Event::AutoResumed { .. })));
        assert_eq!(monitor.timer_state().remaining_ms, 25 * 60_000 - 2_000);
        assert_eq!(monitor.stats().auto_pauses, 1);
    }

    #[test]
    fn rejected_start_surfaces_alert_until_next_command() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        monitor.ingest(absent());
        monitor.ingest(absent());
        let before = monitor.timer_state().clone();

        let outcome = monitor.start();
        assert_eq!(outcome.rejection, Some(Rejection::NobodyPresent));
        assert!(matches!(outcome.events[..], [Event::StartRejected { .. }]));
        assert_eq!(monitor.timer_state(), &before);
        assert!(monitor
            .alerts()
            .iter()
            .any(|a| a.kind == AlertKind::StartRejected));

        monitor.reset();
        assert!(monitor.alerts().is_empty());
    }

    #[test]
    fn sensor_outage_and_recovery_events() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        monitor.ingest(present());
        monitor.ingest(present());

        let events = monitor.ingest(timeout());
        assert!(matches!(events[..], [Event::SensorUnavailable { .. }]));
        assert!(monitor.ingest(timeout()).is_empty());
        assert_eq!(monitor.presence_state(), PresenceState::Present);
        assert!(monitor
            .alerts()
            .iter()
            .any(|a| a.kind == AlertKind::CameraUnavailable));

        let events = monitor.ingest(present());
        assert!(matches!(
            events[..],
            [Event::SensorRecovered { failed_samples: 2, .. }]
        ));
    }

    #[test]
    fn invalid_update_keeps_previous_config() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        let before = monitor.config().clone();
        let bad = FocusConfig {
            presence_debounce_count: 0,
            ..config()
        };
        assert!(monitor.update_config(bad).is_err());
        assert_eq!(monitor.config(), &before);
    }

    #[test]
    fn update_config_applies_new_durations() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        let events = monitor
            .update_config(FocusConfig {
                work_duration_minutes: 50,
                ..config()
            })
            .unwrap();
        assert!(matches!(events[..], [Event::ConfigUpdated { .. }]));
        assert_eq!(monitor.timer_state().remaining_ms, 50 * 60_000);
    }

    #[test]
    fn reset_keeps_presence_and_stats() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        monitor.ingest(present());
        monitor.ingest(present());
        monitor.start();
        monitor.tick(5_000);
        monitor.reset();
        assert_eq!(monitor.presence_state(), PresenceState::Present);
        assert_eq!(monitor.stats().focus_ms, 5_000);
        assert_eq!(monitor.timer_state().remaining_ms, 25 * 60_000);
    }

    #[test]
    fn auto_started_work_pauses_when_desk_is_empty() {
        let mut monitor = FocusMonitor::new(FocusConfig {
            work_duration_minutes: 1,
            short_break_duration_minutes: 1,
            auto_start_breaks: true,
            auto_start_work: true,
            ..config()
        })
        .unwrap();
        monitor.ingest(present());
        monitor.ingest(present());
        monitor.start();
        monitor.tick(60_000);
        assert_eq!(monitor.timer_state().phase, SessionPhase::ShortBreak);

        monitor.ingest(absent());
        monitor.ingest(absent());
        assert!(monitor.timer_state().running);

        let events = monitor.tick(60_000);
        assert!(matches!(
            events[..],
            [Event::PhaseCompleted { next: SessionPhase::Work, auto_started: true, .. }, Event::AutoPaused { .. }]
        ));
        assert!(monitor.timer_state().is_auto_paused());

        monitor.tick(30_000);
        for _ in 0..5 {
            monitor.ingest(absent());
        }
        assert_eq!(monitor.timer_state().remaining_ms, 60_000);
        assert_eq!(monitor.stats().focus_ms, 60_000);
        assert_eq!(monitor.stats().away_ms, 30_000);

        monitor.ingest(present());
        let events = monitor.ingest(present());
        assert!(events.iter().any(|e| matches!(e, Event::AutoResumed { .. })));
        assert!(monitor.timer_state().running);
    }

    #[test]
    fn enabling_auto_face_control_pauses_unattended_work() {
        let mut monitor = FocusMonitor::new(FocusConfig {
            auto_face_control: false,
            ..config()
        })
        .unwrap();
        monitor.ingest(absent());
        monitor.ingest(absent());
        assert!(!monitor.start().is_rejected());
        monitor.tick(1_000);

        let events = monitor.update_config(config()).unwrap();
        assert!(matches!(
            events[..],
            [Event::ConfigUpdated { .. }, Event::AutoPaused { .. }]
        ));
        assert!(monitor.timer_state().is_auto_paused());
    }

    #[test]
    fn attached_clock_charges_only_running_time() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        monitor.ingest(present());
        monitor.ingest(present());
        monitor.attach_clock();
        assert!(monitor.has_clock());

        monitor.start();
        std::thread::sleep(Duration::from_millis(100));
        monitor.pause();
        std::thread::sleep(Duration::from_millis(600));
        assert!(matches!(monitor.start().events[..], [Event::TimerResumed { .. }]));
        std::thread::sleep(Duration::from_millis(150));
        monitor.detach_clock();
        assert!(!monitor.has_clock());

        let state = monitor.timer_state();
        let consumed = state.total_ms - state.remaining_ms;
        assert!(consumed >= 250, "running time dropped: {consumed}ms");
        assert!(consumed < 600, "paused time charged: {consumed}ms");
        assert_eq!(monitor.stats().focus_ms, consumed);

        // Back to explicit ticks.
        std::thread::sleep(Duration::from_millis(50));
        let before = monitor.timer_state().remaining_ms;
        monitor.tick(1_000);
        assert_eq!(monitor.timer_state().remaining_ms, before - 1_000);
    }

    #[test]
    fn catch_up_without_clock_is_noop() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        monitor.ingest(present());
        monitor.ingest(present());
        monitor.start();
        std::thread::sleep(Duration::from_millis(20));
        assert!(monitor.catch_up().is_empty());
        assert_eq!(monitor.timer_state().remaining_ms, 25 * 60_000);
    }

    #[test]
    fn accepted_config_is_published() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        let mut rx = monitor.watch_config();
        assert!(!rx.has_changed().unwrap());

        monitor
            .update_config(FocusConfig {
                sampling_interval_ms: 500,
                ..config()
            })
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().sampling_interval_ms, 500);

        let bad = FocusConfig {
            countdown_interval_ms: 1,
            ..config()
        };
        assert!(monitor.update_config(bad).is_err());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn restart_session_starts_over() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        monitor.ingest(present());
        monitor.ingest(present());
        monitor.start();
        monitor.tick(5_000);
        monitor.ingest(timeout());

        let events = monitor.restart_session();
        assert!(matches!(
            events[..],
            [
                Event::TimerReset { phase: SessionPhase::Work, .. },
                Event::PresenceChanged { to: PresenceState::Uncertain, .. }
            ]
        ));
        let state = monitor.timer_state();
        assert!(!state.running);
        assert_eq!(state.remaining_ms, 25 * 60_000);
        assert_eq!(state.completed_work_sessions, 0);
        assert_eq!(monitor.presence_state(), PresenceState::Uncertain);
        assert_eq!(monitor.stats(), &SessionStats::default());
        assert!(monitor.alerts().is_empty());
    }

    #[test]
    fn subscribers_receive_returned_events() {
        let mut monitor = FocusMonitor::new(config()).unwrap();
        let mut rx = monitor.subscribe();
        monitor.ingest(present());
        let events = monitor.ingest(present());
        assert_eq!(rx.try_recv().unwrap(), events[0]);
    }
}
