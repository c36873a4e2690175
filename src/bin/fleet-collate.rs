use anyhow::Context;
use fleet_experiment::{logger::init_logger, prelude::*};

fn main() -> anyhow::Result<()> {
    let settings = Configuration::from_env();
    init_logger("collate", &settings)?;
    let config = FleetConfig::from_env().context("loading fleet configuration")?;

    let excluded = std::env::args().skip(1).collect::<Vec<_>>();
    print!("{}", collate(&config, &excluded));
    Ok(())
}
