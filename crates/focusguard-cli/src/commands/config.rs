use std::path::PathBuf;

use clap::Subcommand;
use focusguard_core::FocusConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "work_duration_minutes", "auto_face_control")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Check a config file without applying it
    Validate {
        /// File to check (defaults to the active config)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = FocusConfig::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = FocusConfig::load()?;
            config.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::List => {
            let config = FocusConfig::load()?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            let config = FocusConfig::default();
            config.save()?;
            println!("config reset to defaults");
        }
        ConfigAction::Validate { file } => {
            let config = match file {
                Some(path) => FocusConfig::load_from(&path)?,
                None => FocusConfig::load()?,
            };
            config.validate()?;
            println!("ok");
        }
    }
    Ok(())
}
