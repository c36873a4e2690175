#![allow(dead_code)]

use std::path::Path;

use fleet_experiment::prelude::*;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, Layer, Registry};

/// Route logs through the test harness so they only show for failing tests.
pub fn init_test_logger() {
    let layer = fmt::layer()
        .with_ansi(true)
        .with_target(false)
        .with_test_writer()
        .with_filter(LevelFilter::DEBUG);
    let _ = tracing::subscriber::set_global_default(Registry::default().with(layer));
}

/// Two machines, one condition, 5 games per color.
pub fn fleet_config(results_dir: &Path) -> FleetConfig {
    let text = format!(
        r#"
user = "drake"
results_dir = "{}"
machines = ["m1", "m2"]
games_per_condition = 20
worker_command = "/opt/fleet/fleet-worker"
conditions = ["c=0.5"]

[engine]
referee = "/opt/fleet/referee"
program = "/opt/orego/orego"
opponent = "/usr/games/gnugo --mode gtp"
"#,
        results_dir.display()
    );
    FleetConfig::parse(&text).unwrap()
}
