//! # WLL Driver Entry Point
//!
//! Runnable shell around the library: initializes logging, loads the TOML
//! config, connects to the bridge, and prints every packet from the infinite
//! acquisition stream as one JSON line. A host collection engine embeds the
//! library directly and consumes [`Session::packets`] itself; this binary is
//! the standalone/diagnostic form of the same loop.

// Test modules
#[cfg(test)]
mod tests;

use anyhow::Context;
use log::info;

use wll_driver_lib::config::Config;
use wll_driver_lib::station::Session;

const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next().as_deref() {
        Some("--version") => {
            println!("wll-driver {DRIVER_VERSION}");
            return Ok(());
        }
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    info!("WLL driver version {DRIVER_VERSION}");
    info!("connecting to WeatherLink Live at {}", config.bridge.ip);

    // The one loud failure: without a first snapshot the rain accumulator
    // cannot be seeded, so there is nothing safe to run.
    let session = Session::connect(config)
        .context("unable to reach the WeatherLink Live bridge; check the configured IP")?;

    for packet in session.packets() {
        println!("{}", serde_json::to_string(&packet)?);
    }

    // The packet stream is infinite; reaching here means the iterator was
    // exhausted, which does not happen in practice.
    Ok(())
}
