use anyhow::Context;
use fleet_experiment::{hostname, logger::init_logger, prelude::*};

fn main() -> anyhow::Result<()> {
    let settings = Configuration::from_env();
    init_logger("worker", &settings)?;
    let config = FleetConfig::from_env().context("loading fleet configuration")?;

    let machine = hostname()?;
    if !config.machines.contains(&machine) {
        tracing::warn!("'{machine}' is not listed in the fleet, its dump will not be collated");
    }
    let runner = MatchRunner::new(config.engine.clone(), &config.results_dir, settings);
    WorkerLoop::new(machine, &config, runner)?.run_to_results_dir(&config.results_dir)
}
