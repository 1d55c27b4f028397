//! Simmer - a front-end dev server and bundling pipeline.

mod actor;
mod cli;
mod config;
mod core;
mod graph;
mod hot;
mod kitchen;
mod live;
mod logger;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::SimmerConfig;
use core::Shutdown;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    // Ctrl+C before any blocking operation
    let shutdown = Shutdown::new();
    shutdown.install_handler()?;

    let config = SimmerConfig::load(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Build => cli::build::build_site(&config, &runtime, false).map(|_| ()),
        Commands::Serve { .. } => cli::serve::serve(config, shutdown, &runtime),
    }
}
