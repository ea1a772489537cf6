mod cli;
mod commands;
mod config;
mod logging;
mod report;
mod session;

use clap::Parser;
use color_eyre::eyre::Result;

use cli::{Cli, Commands};
use config::{ensure_dirs, LogLevel, UserConfig};
use logging::LogMode;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = ensure_dirs();

    let cli = Cli::parse();
    let config = UserConfig::load();
    let log_level_override = cli.log_level.as_deref().map(LogLevel::from_str);

    match cli.command {
        Commands::Run(args) => {
            // Stderr belongs to the monitored command unless asked otherwise.
            let mode = if args.log_stderr {
                LogMode::Both
            } else {
                LogMode::File
            };
            let guard = logging::init(config.log_level, mode, log_level_override);
            let status = commands::run::run(args, config)?;

            let code = status.exit_code();
            if code != 0 {
                drop(guard);
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Debug => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::debug::run()
        }
        Commands::Config { path, reset, edit } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::config::run(path, reset, edit)
        }
    }
}
