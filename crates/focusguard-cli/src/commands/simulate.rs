use std::path::PathBuf;

use clap::Args;
use focusguard_core::{Replay, Scenario};

#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario TOML file
    scenario: PathBuf,
    /// Print only the event list
    #[arg(long)]
    events_only: bool,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(&args.scenario)?;
    let report = Replay::run(&scenario)?;
    let json = if args.events_only {
        serde_json::to_string_pretty(&report.events)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{json}");
    Ok(())
}
