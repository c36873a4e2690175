use std::time::Duration;

use anyhow::Context;
use fleet_experiment::{logger::init_logger, prelude::*};

fn main() -> anyhow::Result<()> {
    let settings = Configuration::from_env();
    init_logger("dispatch", &settings)?;
    let config = FleetConfig::from_env().context("loading fleet configuration")?;

    let executor = SshExecutor::new(config.remote.clone())
        .with_timeout(Duration::from_secs(config.reset_timeout_secs));
    let summary = Dispatcher::new(&config, executor, settings).dispatch()?;

    println!(
        "{} of {} machines launched ({} could not be reset, {} old files removed)",
        summary.launched.len(),
        config.machines.len(),
        summary.reset_failed.len(),
        summary.removed
    );
    if !summary.launch_failed.is_empty() {
        anyhow::bail!("could not launch on {}", summary.launch_failed.join(", "));
    }
    Ok(())
}
