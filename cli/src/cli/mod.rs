use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pidwatt_protocol::Normalization;

use crate::config::{OutputFormat, RunOverrides};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a command and attribute measured energy to its process tree
    Run(RunArgs),

    /// Print energy counters, core count and config for troubleshooting
    Debug,

    /// Show or edit configuration
    Config {
        /// Print config file path
        #[arg(long)]
        path: bool,

        /// Reset config to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(short, long)]
        edit: bool,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Sampling interval in milliseconds
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Stop the command after this long (e.g. 30s, 5m)
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// CPU normalization (per-core, irix)
    #[arg(short, long, value_parser = parse_normalization)]
    pub normalization: Option<Normalization>,

    /// Number of energy domains to sum
    #[arg(short, long)]
    pub sockets: Option<usize>,

    /// Energy domain name prefix to select
    #[arg(long)]
    pub domain: Option<String>,

    /// Powercap directory to discover domains under
    #[arg(long)]
    pub powercap_root: Option<PathBuf>,

    /// Report format (summary, json, csv)
    #[arg(short, long, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Mirror logs to stderr as well as the log file
    #[arg(long)]
    pub log_stderr: bool,

    /// Command to monitor, after `--`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            interval_ms: self.interval,
            timeout: self.timeout,
            normalization: self.normalization,
            sockets: self.sockets,
            domain_class: self.domain.clone(),
            powercap_root: self.powercap_root.clone(),
            format: self.format,
        }
    }
}

fn parse_normalization(s: &str) -> Result<Normalization, String> {
    Normalization::from_str(s).ok_or_else(|| format!("unknown normalization '{s}'"))
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::from_str(s).ok_or_else(|| format!("unknown report format '{s}'"))
}

/// Attribute hardware-measured energy to a command's process tree
#[derive(Debug, Parser)]
#[command(name = "pidwatt", version, verbatim_doc_comment)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "pidwatt",
            "run",
            "--interval",
            "250",
            "--timeout",
            "1m 30s",
            "--normalization",
            "irix",
            "--format",
            "csv",
            "--",
            "make",
            "-j8",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.command, vec!["make", "-j8"]);

        let overrides = args.overrides();
        assert_eq!(overrides.interval_ms, Some(250));
        assert_eq!(overrides.timeout, Some(Duration::from_secs(90)));
        assert_eq!(overrides.normalization, Some(Normalization::Irix));
        assert_eq!(overrides.format, Some(OutputFormat::Csv));
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["pidwatt", "run"]).is_err());
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(Cli::try_parse_from(["pidwatt", "run", "-n", "sideways", "--", "true"]).is_err());
        assert!(Cli::try_parse_from(["pidwatt", "run", "-t", "soon", "--", "true"]).is_err());
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["pidwatt", "debug", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
