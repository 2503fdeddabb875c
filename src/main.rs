use std::{env, thread};
use std::time::Duration;
use log::{error, info};
use crate::config::Config;

mod calendar;
mod config;
mod controller;
mod errors;
mod heater;
mod initialization;
mod manager_nordpool;
mod manager_sensibo;
mod manager_smhi;
mod manager_temperature;
mod models;
mod prices;
mod scheduler;
mod temperature;
mod worker;

/// Seconds to back off before restarting a crashed control loop
const RESTART_BACKOFF_SECS: u64 = 300;

fn main() {
    let config_path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            println!("usage: heatplan <config.toml>");
            return;
        }
    };

    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("Error loading configuration: {}", e);
            return;
        }
    };

    if let Err(e) = initialization::setup_logger(&config) {
        println!("Error setting up logging: {}", e);
        return;
    }

    info!("heatplan version {}", env!("CARGO_PKG_VERSION"));

    // Supervisor: a failed cycle is logged and rebuilt from scratch after
    // a fixed backoff, partial day state is recomputed rather than resumed
    loop {
        if let Err(e) = run_control_loop(&config) {
            error!("control loop failed: {:#}", e);
        }

        info!("restarting in {} seconds", RESTART_BACKOFF_SECS);
        thread::sleep(Duration::from_secs(RESTART_BACKOFF_SECS));
    }
}

/// Builds a fresh set of clients and runs day cycles until an error
/// surfaces
fn run_control_loop(config: &Config) -> anyhow::Result<()> {
    let (nordpool, mut analyzer, mut scheduler) = initialization::init(config)?;

    worker::run(config, &nordpool, &mut analyzer, &mut scheduler)?;

    Ok(())
}
