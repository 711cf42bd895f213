//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// imagewarm - image request deduplication and preheating
#[derive(Parser)]
#[command(
    name = "iw",
    about = "Preheat images in the background, deduplicating equivalent requests",
    version,
    after_help = "Logs are written to: ~/.local/share/imagewarm/logs/imagewarm.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Preheat the requests listed in a manifest file
    Preheat {
        /// YAML manifest: a list of requests
        manifest: PathBuf,

        /// How long to let loads run before reporting
        #[arg(short, long, default_value = "1000")]
        wait_ms: u64,

        /// Stop everything this long after starting, before the wait ends
        #[arg(short, long)]
        stop_after_ms: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Hammer the preheater with concurrent start/stop batches
    Stress {
        /// Worker threads issuing calls
        #[arg(short, long, default_value = "8")]
        threads: usize,

        /// Start/stop batches per thread
        #[arg(short, long, default_value = "500")]
        rounds: usize,

        /// Distinct request keys to draw from
        #[arg(short, long, default_value = "16")]
        keys: usize,
    },

    /// Print the effective configuration
    Config,

    /// Show logs
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

/// Output format for reports
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Path of the log file written by the binary
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imagewarm")
        .join("logs")
        .join("imagewarm.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["iw"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_preheat() {
        let cli = Cli::parse_from(["iw", "preheat", "images.yml"]);
        if let Some(Command::Preheat {
            manifest,
            wait_ms,
            stop_after_ms,
            format,
        }) = cli.command
        {
            assert_eq!(manifest, PathBuf::from("images.yml"));
            assert_eq!(wait_ms, 1000);
            assert!(stop_after_ms.is_none());
            assert_eq!(format, OutputFormat::Text);
        } else {
            panic!("Expected Preheat command");
        }
    }

    #[test]
    fn test_cli_parse_preheat_options() {
        let cli = Cli::parse_from([
            "iw",
            "preheat",
            "images.yml",
            "--wait-ms",
            "50",
            "--stop-after-ms",
            "10",
            "--format",
            "json",
        ]);
        assert!(matches!(
            cli.command,
            Some(Command::Preheat {
                wait_ms: 50,
                stop_after_ms: Some(10),
                format: OutputFormat::Json,
                ..
            })
        ));
    }

    #[test]
    fn test_cli_parse_stress() {
        let cli = Cli::parse_from(["iw", "stress", "--threads", "2"]);
        assert!(matches!(
            cli.command,
            Some(Command::Stress {
                threads: 2,
                rounds: 500,
                keys: 16
            })
        ));
    }

    #[test]
    fn test_cli_parse_logs() {
        let cli = Cli::parse_from(["iw", "logs", "-n", "10"]);
        assert!(matches!(cli.command, Some(Command::Logs { lines: 10 })));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["iw", "-c", "/path/to/config.yml", "config"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
        assert!(matches!(cli.command, Some(Command::Config)));
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("imagewarm/logs/imagewarm.log"));
    }
}
