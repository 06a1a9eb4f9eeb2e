//! Clock driver.
//!
//! One tokio task owns both clocks of the monitor:
//! - **Countdown**: the task attaches a monotonic clock to the
//!   [`FocusMonitor`] and settles it every `countdown_interval`. Commands
//!   issued through the shared monitor settle the same clock first, so they
//!   take effect at the moment they are issued rather than at the next tick
//! - **Sampling**: every `sampling_interval` a detector call is started in its
//!   own task; the finished sample comes back over a channel and is ingested
//!   on the loop task
//!
//! A slow camera never stalls the countdown. While a detector call is in
//! flight further sampling ticks are skipped and presence stays at its last
//! committed value. Accepted config changes reach the loop through
//! [`FocusMonitor::watch_config`]; the intervals and the detector timeout are
//! rebuilt from them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::monitor::FocusMonitor;
use crate::sensing::{SensorAdapter, SensorSample};
use crate::storage::FocusConfig;

/// Monitor handle shared between the clock driver and command callers.
pub type SharedMonitor = Arc<Mutex<FocusMonitor>>;

const SAMPLE_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub countdown_interval: Duration,
    pub sampling_interval: Duration,
}

impl ScheduleSettings {
    pub fn from_config(config: &FocusConfig) -> Self {
        Self {
            countdown_interval: Duration::from_millis(config.countdown_interval_ms),
            sampling_interval: Duration::from_millis(config.sampling_interval_ms),
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self::from_config(&FocusConfig::default())
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Start the clock driver on the current tokio runtime.
    pub fn spawn(
        monitor: SharedMonitor,
        adapter: SensorAdapter,
        settings: ScheduleSettings,
    ) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let exited_cleanly =
                supervise(drive(Arc::clone(&monitor), adapter, settings, loop_cancel)).await;
            if !exited_cleanly {
                // Hand time back to explicit ticks; nothing settles the clock anymore.
                monitor.lock().await.detach_clock();
            }
        });
        SchedulerHandle { cancel, task }
    }
}

pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit. A detector call still in
    /// flight is abandoned; its sample is dropped.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            error!("scheduler task ended abnormally: {err}");
        }
    }
}

/// Run the loop on its own task and report how it ended. A panic is logged
/// here instead of vanishing with the task.
async fn supervise<F>(task: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(()) => true,
        Err(err) if err.is_panic() => {
            error!("scheduler loop panicked: {err}");
            false
        }
        Err(err) => {
            error!("scheduler loop cancelled: {err}");
            false
        }
    }
}

fn ticker(period: Duration, behavior: MissedTickBehavior) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(behavior);
    interval
}

async fn drive(
    monitor: SharedMonitor,
    mut adapter: SensorAdapter,
    mut settings: ScheduleSettings,
    cancel: CancellationToken,
) {
    let mut config_rx = {
        let mut guard = monitor.lock().await;
        guard.attach_clock();
        guard.watch_config()
    };
    let mut countdown_ticker = ticker(settings.countdown_interval, MissedTickBehavior::Delay);
    let mut sampling_ticker = ticker(settings.sampling_interval, MissedTickBehavior::Skip);
    let (tx, mut rx) = mpsc::channel::<SensorSample>(SAMPLE_CHANNEL_CAPACITY);

    info!(
        countdown_ms = settings.countdown_interval.as_millis() as u64,
        sampling_ms = settings.sampling_interval.as_millis() as u64,
        sensor_timeout_ms = adapter.timeout().as_millis() as u64,
        "scheduler started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("scheduler shutting down");
                monitor.lock().await.detach_clock();
                break;
            }
            _ = countdown_ticker.tick() => {
                monitor.lock().await.catch_up();
            }
            _ = sampling_ticker.tick() => {
                if adapter.is_busy() {
                    debug!("detector still busy, sampling tick skipped");
                    continue;
                }
                let adapter = adapter.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(sample) = adapter.sample().await {
                        // Receiver gone means the loop is shutting down.
                        let _ = tx.send(sample).await;
                    }
                });
            }
            Some(sample) = rx.recv() => {
                monitor.lock().await.ingest(sample);
            }
            Ok(()) = config_rx.changed() => {
                let config = config_rx.borrow_and_update().clone();
                let next = ScheduleSettings::from_config(&config);
                if next.countdown_interval != settings.countdown_interval {
                    countdown_ticker = ticker(next.countdown_interval, MissedTickBehavior::Delay);
                }
                if next.sampling_interval != settings.sampling_interval {
                    sampling_ticker = ticker(next.sampling_interval, MissedTickBehavior::Skip);
                }
                settings = next;
                adapter.set_timeout(Duration::from_millis(config.sensor_timeout_ms));
                info!(
                    countdown_ms = settings.countdown_interval.as_millis() as u64,
                    sampling_ms = settings.sampling_interval.as_millis() as u64,
                    sensor_timeout_ms = config.sensor_timeout_ms,
                    "scheduler reconfigured"
                );
            }
        }
    }
}
