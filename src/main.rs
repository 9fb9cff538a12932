mod app;
mod config;
mod field;
mod input;
mod loader;
mod logging;
mod network;
mod page;
mod render;
mod schedule;
mod sim;
mod sky;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let config = config::Config::resolve(config::Args::parse())?;
    let _log = config
        .log_file
        .as_deref()
        .map(logging::init)
        .transpose()?;
    app::run(config)
}
