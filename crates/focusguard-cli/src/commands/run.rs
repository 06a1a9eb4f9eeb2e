use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use focusguard_core::simulation::play_live;
use focusguard_core::{
    Detector, Event, FocusMonitor, Scenario, ScheduleSettings, Scheduler, ScriptedDetector,
    SensorAdapter,
};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Args)]
pub struct RunArgs {
    /// Scenario TOML file
    scenario: PathBuf,
    /// Keep running this long, even after the script ends
    #[arg(long)]
    duration_secs: Option<u64>,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(&args.scenario)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_live(scenario, args.duration_secs))
}

fn print_event(event: &Event) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

async fn run_live(
    scenario: Scenario,
    duration_secs: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = scenario.config.clone();
    let monitor = Arc::new(Mutex::new(FocusMonitor::new(config.clone())?));
    let mut events = monitor.lock().await.subscribe();

    let detector = Arc::new(ScriptedDetector::new());
    let adapter = SensorAdapter::new(
        Arc::clone(&detector) as Arc<dyn Detector>,
        Duration::from_millis(config.sensor_timeout_ms),
    );
    let handle = Scheduler::spawn(
        Arc::clone(&monitor),
        adapter,
        ScheduleSettings::from_config(&config),
    );

    let cancel = CancellationToken::new();
    let script = async {
        play_live(&scenario, &monitor, &detector, &cancel).await;
        if duration_secs.is_some() {
            std::future::pending::<()>().await;
        }
    };
    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(script, deadline, ctrl_c);

    loop {
        tokio::select! {
            _ = &mut script => break,
            _ = &mut deadline => break,
            result = &mut ctrl_c => {
                if let Err(err) = result {
                    warn!("failed to listen for ctrl-c: {err}");
                }
                break;
            }
            received = events.recv() => match received {
                Ok(event) => print_event(&event)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    handle.shutdown().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event)?;
    }

    let monitor = monitor.lock().await;
    let summary = serde_json::json!({
        "type": "Summary",
        "final_state": monitor.timer_state(),
        "remaining": monitor.timer_state().formatted_remaining(),
        "presence": monitor.presence_state(),
        "alerts": monitor.alerts(),
        "stats": monitor.stats(),
        "focus_score": monitor.stats().focus_score(),
    });
    println!("{summary}");
    Ok(())
}
