//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "blecore")]
#[command(author, version, about = "Scan, connect to and watch BLE peripherals", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "BLECORE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device address (MAC address or UUID), or use BLECORE_DEVICE env var
    #[arg(short, long, env = "BLECORE_DEVICE")]
    pub device: Option<String>,

    /// Connection timeout in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby connectable devices
    Scan {
        /// Scan duration in seconds
        #[arg(short = 'T', long, default_value = "10")]
        timeout: u64,

        /// Only report devices advertising this service (repeatable)
        #[arg(short, long = "service")]
        services: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Connect to a device and watch its status, battery, RSSI and device info
    Connect {
        #[command(flatten)]
        device: DeviceArgs,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        duration: Option<u64>,

        /// RSSI poll interval in milliseconds (0 disables polling)
        #[arg(long)]
        rssi_interval: Option<i64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print raw notifications from a characteristic as hex
    Notify {
        #[command(flatten)]
        device: DeviceArgs,

        /// Service UUID (16-bit short form such as `180f`, or a full UUID)
        #[arg(long)]
        service: String,

        /// Characteristic UUID (16-bit short form or full UUID)
        #[arg(long)]
        characteristic: String,

        /// Stop after this many notifications
        #[arg(short = 'n', long)]
        count: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Default device address
    Device,
    /// Default output format
    Format,
    /// Connection timeout in seconds
    Timeout,
    /// RSSI poll interval in milliseconds
    RssiInterval,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
        /// Configuration value
        value: String,
    },

    /// Unset (remove) a configuration value
    Unset {
        /// Configuration key to remove
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_notify() {
        let cli = Cli::try_parse_from([
            "blecore",
            "notify",
            "--device",
            "AA:BB:CC:DD:EE:FF",
            "--service",
            "180f",
            "--characteristic",
            "2a19",
            "-n",
            "3",
        ])
        .unwrap();
        let Commands::Notify {
            device,
            service,
            count,
            ..
        } = cli.command
        else {
            panic!("expected notify");
        };
        assert_eq!(device.device.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(service, "180f");
        assert_eq!(count, Some(3));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["blecore", "-v", "-q", "config", "path"]).is_err());
    }

    #[test]
    fn test_format_flag() {
        let cli = Cli::try_parse_from(["blecore", "scan", "--format", "json"]).unwrap();
        let Commands::Scan { output, timeout, .. } = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(output.format, Some(OutputFormat::Json));
        assert_eq!(timeout, 10);
    }
}
