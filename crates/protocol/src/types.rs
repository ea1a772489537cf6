use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::{MIN_SUPPORTED_VERSION, REPORT_FORMAT_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    PerCore,
    Irix,
}

impl Normalization {
    pub fn label(&self) -> &'static str {
        match self {
            Normalization::PerCore => "per-core",
            Normalization::Irix => "irix",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "per-core" | "percore" | "normalized" => Some(Normalization::PerCore),
            "irix" | "unnormalized" => Some(Normalization::Irix),
            _ => None,
        }
    }
}

/// How a sampling session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The monitored command exited on its own.
    Completed,
    /// The timeout elapsed and the command was terminated.
    TimedOut,
    /// The root process vanished while a tick was being sampled.
    ProcessNotFound,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Completed => "completed",
            SessionStatus::TimedOut => "timed out",
            SessionStatus::ProcessNotFound => "process not found",
        }
    }

    /// Process exit code for a CLI run ending in this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionStatus::Completed | SessionStatus::ProcessNotFound => 0,
            SessionStatus::TimedOut => 124,
        }
    }
}

/// One tick's measurement.
///
/// `tree_cpu` and `system_cpu` are fractions in the session's normalization
/// mode; `energy_uj` is the counter delta for the tick summed over domains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergySample {
    pub sequence: u64,
    pub pid: u32,
    pub tree_cpu: f64,
    pub system_cpu: f64,
    pub energy_uj: f64,
}

impl EnergySample {
    /// Share of this tick's energy attributed to the process tree, in µJ.
    pub fn attributed_uj(&self) -> f64 {
        if self.system_cpu <= 0.0 {
            return 0.0;
        }
        self.energy_uj * (self.tree_cpu / self.system_cpu)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionSummary {
    pub total_attributed_energy_j: f64,
    pub total_system_energy_j: f64,
    pub sample_count: usize,
    #[serde(default)]
    pub dropped_ticks: u64,
}

impl SessionSummary {
    /// Attributed share of the measured system energy, 0 when nothing was measured.
    pub fn attributed_ratio(&self) -> f64 {
        if self.total_system_energy_j > 0.0 {
            self.total_attributed_energy_j / self.total_system_energy_j
        } else {
            0.0
        }
    }
}

/// Everything a session produced, handed to report writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub format_version: u32,
    pub command: Vec<String>,
    pub root_pid: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sampling_interval_ms: u64,
    pub normalization: Normalization,
    #[serde(default)]
    pub domains: Vec<String>,
    pub summary: SessionSummary,
    pub samples: Vec<EnergySample>,
}

impl SessionReport {
    pub fn is_supported_version(&self) -> bool {
        (MIN_SUPPORTED_VERSION..=REPORT_FORMAT_VERSION).contains(&self.format_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributed_uj() {
        let sample = EnergySample {
            sequence: 0,
            pid: 1,
            tree_cpu: 0.25,
            system_cpu: 0.5,
            energy_uj: 2_000_000.0,
        };
        assert_eq!(sample.attributed_uj(), 1_000_000.0);

        let idle = EnergySample {
            system_cpu: 0.0,
            ..sample
        };
        assert_eq!(idle.attributed_uj(), 0.0);
    }

    #[test]
    fn test_status_exit_codes() {
        assert_eq!(SessionStatus::Completed.exit_code(), 0);
        assert_eq!(SessionStatus::ProcessNotFound.exit_code(), 0);
        assert_eq!(SessionStatus::TimedOut.exit_code(), 124);
    }

    #[test]
    fn test_normalization_parsing() {
        assert_eq!(Normalization::from_str("per-core"), Some(Normalization::PerCore));
        assert_eq!(Normalization::from_str("PER_CORE"), Some(Normalization::PerCore));
        assert_eq!(Normalization::from_str("irix"), Some(Normalization::Irix));
        assert_eq!(Normalization::from_str("bogus"), None);
    }

    #[test]
    fn test_summary_ratio() {
        let summary = SessionSummary {
            total_attributed_energy_j: 2.0,
            total_system_energy_j: 3.5,
            sample_count: 3,
            dropped_ticks: 0,
        };
        assert!((summary.attributed_ratio() - 2.0 / 3.5).abs() < 1e-12);
        assert_eq!(SessionSummary::default().attributed_ratio(), 0.0);
    }
}
