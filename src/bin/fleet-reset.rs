use std::time::Duration;

use anyhow::Context;
use fleet_experiment::{logger::init_logger, prelude::*};

fn main() -> anyhow::Result<()> {
    let settings = Configuration::from_env();
    init_logger("reset", &settings)?;
    let config = FleetConfig::from_env().context("loading fleet configuration")?;

    let executor = SshExecutor::new(config.remote.clone())
        .with_timeout(Duration::from_secs(config.reset_timeout_secs));
    let (_, failed) = Dispatcher::new(&config, executor, settings).reset_fleet();
    if !failed.is_empty() {
        anyhow::bail!("could not reset {}", failed.join(", "));
    }
    Ok(())
}
