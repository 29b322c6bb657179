mod api;
mod app;
mod application;
mod cli;
mod config;
mod domain;
mod host;
mod logging;
mod ui;
mod utils;

use crate::cli::CliCommand;

fn main() {
    if let Err(err) = CliCommand::run_from_args() {
        eprintln!("dupe-guard error: {:#}", err);
        std::process::exit(1);
    }
}
