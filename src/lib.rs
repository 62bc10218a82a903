pub mod cli;
pub mod core;
pub mod providers;

use crate::core::RateService;
use crate::core::config::AppConfig;
use anyhow::Result;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Rates { json: bool },
    Compare {
        amount: f64,
        city: Option<String>,
        fiat: bool,
    },
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("ratefeed starting...");

    let config = load_config(config_path)?;
    let service = RateService::from_config(&config)?;

    match command {
        AppCommand::Rates { json } => cli::rates::run(&service, &config.rates, json).await,
        AppCommand::Compare { amount, city, fiat } => {
            cli::compare::run(&service, &config.cities, amount, city.as_deref(), fiat).await
        }
    }
}
