//! Command line entry points.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{config, logging};
use commands::{run_get, run_popup, PopupArgs};

#[derive(Debug, Parser)]
#[command(name = "dupe-guard")]
#[command(about = "Asks before downloading a file you already have", long_about = None)]
pub struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download URLs, checking each against the duplicate-detection backend first.
    Get {
        /// HTTP/HTTPS URLs to download.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Directory to save into (overrides the config).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Show the duplicate confirmation window for one download.
    #[command(hide = true)]
    Popup(PopupArgs),
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        // Initialize logging as early as possible; stdout stays reserved for popups.
        let logged = config::data_dir()
            .map_err(anyhow::Error::from)
            .and_then(|dir| logging::init_logging(&dir).map_err(anyhow::Error::from));
        if let Err(e) = logged {
            logging::init_logging_stderr();
            tracing::warn!("file logging unavailable, using stderr: {:#}", e);
        }

        let config_path = match cli.config {
            Some(path) => path,
            None => config::config_path()?,
        };
        let cfg = config::load_or_init(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get { urls, dir } => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run_get(&cfg, &urls, dir))
            }
            CliCommand::Popup(args) => run_popup(args),
        }
    }
}
