//! `powermetrics` output parsing for macOS.
//!
//! Apple silicon reports `CPU Power: 1234 mW`; Intel Macs report
//! `Intel energy model derived package power (CPUs+GT+SA): 12.34W`.
//! Intel machines are recognised by an `EFI version` line in the header
//! block that precedes the first blank line.

use std::process::Command;
use std::time::Duration;

use crate::stream::LineParser;

const APPLE_SILICON_INDICATOR: &str = "CPU Power:";
const INTEL_INDICATOR: &str = "Intel energy model derived package power (CPUs+GT+SA):";
const INTEL_HEADER_MARKER: &str = "EFI version";

/// Incremental parser for `powermetrics --samplers cpu_power` output.
#[derive(Debug, Default)]
pub struct PowermetricsParser {
    header_done: bool,
    intel: bool,
}

impl PowermetricsParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_intel(&self) -> bool {
        self.intel
    }
}

impl LineParser for PowermetricsParser {
    fn parse(&mut self, line: &str) -> Option<f64> {
        if !self.header_done {
            if line.starts_with(INTEL_HEADER_MARKER) {
                self.intel = true;
            }
            if line.trim().is_empty() {
                self.header_done = true;
            }
            return None;
        }

        let line = line.trim();
        if line.is_empty() || line.starts_with('*') {
            return None;
        }

        if self.intel {
            let rest = line.split_once(INTEL_INDICATOR)?.1;
            parse_quantity(rest, "W")
        } else {
            if line.starts_with("Combined") {
                return None;
            }
            let rest = line.split_once(APPLE_SILICON_INDICATOR)?.1;
            parse_quantity(rest, "mW").map(|mw| mw / 1000.0)
        }
    }
}

fn parse_quantity(text: &str, unit: &str) -> Option<f64> {
    text.trim()
        .strip_suffix(unit)?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// `sudo powermetrics` invocation emitting one CPU power sample per interval.
pub fn powermetrics_command(interval: Duration) -> Command {
    let interval_ms = interval.as_millis().max(1);
    let mut command = Command::new("sudo");
    command.args([
        "powermetrics",
        "--samplers",
        "cpu_power",
        "-i",
        &interval_ms.to_string(),
    ]);
    command
}
