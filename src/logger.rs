use std::{fs::File, sync::Mutex};

use anyhow::Context;
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::FmtSubscriber;

use crate::configuration::Configuration;

/// Install the global tracing subscriber for one entry point.
///
/// With `config.log` the events go to a timestamped file prefixed with `component`, otherwise
/// to stderr when `config.verbose`. Nothing is installed when both are off.
pub fn init_logger(component: &str, config: &Configuration) -> anyhow::Result<()> {
    if config.log {
        init_file_logger(component)
    } else if config.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        set_global_default(subscriber).context("could not set global default tracing subscriber")
    } else {
        Ok(())
    }
}

fn init_file_logger(component: &str) -> anyhow::Result<()> {
    let file_name = get_log_file_name(component)?;
    let file = File::create(&file_name)
        .with_context(|| format!("could not create log file '{file_name}'"))?;
    // falls back to UTC when the local offset cannot be determined (multi-threaded process)
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid timer format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(Mutex::new(file))
        .finish();

    set_global_default(subscriber).context("could not set global default tracing subscriber")
}

fn get_log_file_name(component: &str) -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = now.format(&format).context("could not format timestamp")?;
    Ok(format!("{component}_{stamp}_log.txt"))
}
