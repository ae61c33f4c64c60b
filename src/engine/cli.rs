//! OTAFlow CLI Module
//! Command-line interface for device firmware updates

pub mod formatter;

use crate::engine::config::{Channel, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "otaflow")]
#[command(version)]
#[command(about = "Over-the-air firmware updates for LED controllers", long_about = None)]
pub struct Cli {
    /// Working directory holding otaflow.config.json (defaults to current directory)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Device base URL, overrides the config
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Build architecture, overrides the config
    #[arg(long, global = true)]
    pub arch: Option<String>,

    /// Firmware version currently on the device, overrides the config
    #[arg(long, global = true)]
    pub current_version: Option<String>,

    /// Update channel, overrides the config
    #[arg(long, global = true)]
    pub channel: Option<Channel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a config from --device, --arch and --current-version
    Init,

    /// Check for a firmware update
    Check,

    /// Check, confirm and flash the selected firmware
    Install {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List published releases
    Releases,

    /// Show device statistics
    Device,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Set a single value
    Set {
        /// Dotted key, e.g. device.url or update.channel
        key: String,

        value: String,
    },
}

impl Cli {
    pub fn get_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Apply the one-shot overrides given on the command line
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.device {
            config.device.url = url.trim_end_matches('/').to_string();
        }
        if let Some(arch) = &self.arch {
            config.device.architecture = Some(arch.clone());
        }
        if let Some(version) = &self.current_version {
            config.device.firmware_version = Some(version.clone());
        }
        if let Some(channel) = self.channel {
            config.update.channel = channel;
        }
    }
}
