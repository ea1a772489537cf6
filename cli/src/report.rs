use std::io::{self, Write};

use pidwatt_protocol::{SessionReport, SessionStatus, REPORT_FORMAT_VERSION};

use crate::config::{OutputFormat, SessionConfig};
use crate::session::SessionOutcome;

pub const CSV_HEADER: &str = "sequence,pid,tree_cpu,system_cpu,energy_uj";

/// Assemble the report for a session that ended with `status`.
pub fn build_report(
    outcome: SessionOutcome,
    status: SessionStatus,
    command: &[String],
    config: &SessionConfig,
) -> SessionReport {
    SessionReport {
        format_version: REPORT_FORMAT_VERSION,
        command: command.to_vec(),
        root_pid: outcome.root_pid,
        status,
        started_at: outcome.started_at,
        duration_ms: outcome.elapsed.as_millis() as u64,
        sampling_interval_ms: config.sampling_interval.as_millis() as u64,
        normalization: config.normalization,
        domains: outcome.domains,
        summary: outcome.summary,
        samples: outcome.samples,
    }
}

pub fn write_report<W: Write>(
    out: &mut W,
    report: &SessionReport,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Summary => write_summary(out, report),
        OutputFormat::Json => write_json(out, report),
        OutputFormat::Csv => write_csv(out, report),
    }
}

pub fn write_json<W: Write>(out: &mut W, report: &SessionReport) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)
}

/// One row per recorded tick, preceded by `#` comment lines describing the run.
pub fn write_csv<W: Write>(out: &mut W, report: &SessionReport) -> io::Result<()> {
    writeln!(out, "# command: {}", escape_csv(&report.command.join(" ")))?;
    writeln!(
        out,
        "# status: {}, normalization: {}, interval_ms: {}",
        report.status.label(),
        report.normalization.label(),
        report.sampling_interval_ms
    )?;
    writeln!(out, "{CSV_HEADER}")?;
    for sample in &report.samples {
        writeln!(
            out,
            "{},{},{:.6},{:.6},{:.3}",
            sample.sequence, sample.pid, sample.tree_cpu, sample.system_cpu, sample.energy_uj
        )?;
    }
    Ok(())
}

pub fn write_summary<W: Write>(out: &mut W, report: &SessionReport) -> io::Result<()> {
    let summary = &report.summary;

    writeln!(out, "pidwatt: {}", report.command.join(" "))?;
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out, "Status:          {}", report.status.label())?;
    writeln!(out, "Root pid:        {}", report.root_pid)?;
    writeln!(
        out,
        "Duration:        {:.2}s",
        report.duration_ms as f64 / 1000.0
    )?;
    writeln!(
        out,
        "Interval:        {}ms ({})",
        report.sampling_interval_ms,
        report.normalization.label()
    )?;
    if !report.domains.is_empty() {
        writeln!(out, "Domains:         {}", report.domains.join(", "))?;
    }
    writeln!(out, "Samples:         {}", summary.sample_count)?;
    if summary.dropped_ticks > 0 {
        writeln!(out, "Dropped ticks:   {}", summary.dropped_ticks)?;
    }
    writeln!(
        out,
        "Attributed:      {:.3} J",
        summary.total_attributed_energy_j
    )?;
    writeln!(out, "System:          {:.3} J", summary.total_system_energy_j)?;
    writeln!(
        out,
        "Share:           {:.1}%",
        summary.attributed_ratio() * 100.0
    )?;
    Ok(())
}

pub fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        let escaped = s.replace('"', "\"\"").replace('\n', " ");
        format!("\"{}\"", escaped)
    } else {
        s.to_string()
    }
}
