//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Fingerprint;

/// configcheck - render and dry-run validate log shipper configurations.
#[derive(Parser, Debug)]
#[command(name = "configcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "CONFIGCHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the agent configuration files.
    Render {
        /// Also print the fingerprint.
        #[arg(short, long)]
        fingerprint: bool,
    },

    /// Print the fingerprint of the rendered configuration.
    Fingerprint,

    /// Validate the configuration file.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Run a validation pass against the cluster.
    Check {
        /// Repeat passes until a verdict is reached.
        #[arg(short, long)]
        wait: bool,

        /// Seconds between passes when waiting.
        #[arg(long, default_value = "5")]
        interval: u64,

        /// Seconds to wait for a verdict before giving up.
        #[arg(long, default_value = "300")]
        timeout: u64,

        /// Keep the artifacts of other fingerprints.
        #[arg(long)]
        no_cleanup: bool,
    },

    /// Remove validation artifacts.
    Cleanup {
        /// Fingerprints to keep (all others are removed).
        #[arg(short, long)]
        keep: Vec<Fingerprint>,
    },

    /// Show the recorded result and live validation pods.
    Status,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_flags() {
        let cli = Cli::try_parse_from([
            "configcheck",
            "--output",
            "json",
            "check",
            "--wait",
            "--interval",
            "2",
            "--no-cleanup",
        ])
        .unwrap();

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Check {
                wait,
                interval,
                timeout,
                no_cleanup,
            } => {
                assert!(wait);
                assert_eq!(interval, 2);
                assert_eq!(timeout, 300);
                assert!(no_cleanup);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cleanup_keep_must_be_fingerprints() {
        let cli = Cli::try_parse_from([
            "configcheck",
            "cleanup",
            "--keep",
            "0123456789abcdef",
            "--keep",
            "fedcba9876543210",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Cleanup { ref keep } if keep.len() == 2));

        assert!(Cli::try_parse_from(["configcheck", "cleanup", "--keep", "nope"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
