mod catalog;
mod cli;
mod config;
mod error;
mod geo;
mod identity;
mod location;
mod model;
mod progress;
mod proximity;
mod service;
mod session;
mod storage;

use std::{io, process};

use clap::Parser;

use cli::Cli;
use config::Config;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(cli.log_level())
        .with_target(false)
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = cli::run(cli, &config).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
