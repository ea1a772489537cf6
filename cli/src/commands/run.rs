use std::fs::File;
use std::io::{self, BufWriter, Write};

use color_eyre::eyre::{eyre, Result, WrapErr};
use pidwatt_protocol::SessionStatus;

use crate::cli::RunArgs;
use crate::config::{SessionConfig, UserConfig};
use crate::report;
use crate::session::{MonitoredProcess, SamplingOrchestrator, Target};

pub fn run(args: RunArgs, mut config: UserConfig) -> Result<SessionStatus> {
    config.merge_with_args(&args.overrides());
    let session_config = SessionConfig::from_user(&config);

    let (program, rest) = args
        .command
        .split_first()
        .ok_or_else(|| eyre!("no command given"))?;

    // Counters are opened first so a missing energy source fails before launch.
    let mut orchestrator = SamplingOrchestrator::open(session_config.clone())?;
    let mut process = MonitoredProcess::spawn(program, rest, session_config.kill_grace)?;

    let result = orchestrator.run(&mut process);

    // Reap the command. Anything but a natural exit may leave it running.
    let reaped = match &result {
        Ok(SessionStatus::Completed) => process.wait().map(|_| ()),
        _ => process.terminate(),
    };
    if let Err(e) = reaped {
        tracing::warn!(error = %e, pid = process.pid(), "failed to reap monitored command");
    }
    if let Some(exit) = process.exit_status() {
        tracing::info!(program = process.program(), %exit, "monitored command finished");
    }

    let status = result?;
    let outcome = orchestrator
        .outcome()
        .ok_or_else(|| eyre!("session produced no outcome"))?;
    debug_assert_eq!(outcome.status, Some(status));
    let report = report::build_report(outcome, status, &args.command, &session_config);

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            report::write_report(&mut out, &report, config.output_format)?;
            out.flush()?;
            eprintln!("Report written to {}", path.display());
        }
        None => {
            let mut out = io::stdout().lock();
            report::write_report(&mut out, &report, config.output_format)?;
            out.flush()?;
        }
    }

    Ok(status)
}
