use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doorlock_core::Config;

/// Configuration file read when `--config` is not given, if present.
pub const DEFAULT_CONFIG_PATH: &str = "doorlock.toml";

#[derive(Debug, Parser)]
#[command(name = "doorlock", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the controller until Ctrl-C
    Run {
        /// Use a simulated relay board and read UIDs from stdin
        #[arg(long)]
        simulate: bool,
    },

    /// Open the door once and exit
    OpenDoor,

    /// List the serial ports of this machine
    Ports,
}

impl Cli {
    /// Load the configuration.
    ///
    /// An explicit `--config` must exist. Without it, `doorlock.toml` in the
    /// working directory is used if present, defaults otherwise.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => read_config(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                read_config(Path::new(DEFAULT_CONFIG_PATH))
            }
            None => Ok(Config::default()),
        }
    }
}

fn read_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))
}
