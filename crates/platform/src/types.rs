//! Shared types for CPU sampling.

use std::fmt;

/// How CPU utilisation is scaled.
///
/// Tree and system readings always come out in the same mode, so their
/// ratio is the same either way; only the absolute values differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuNormalization {
    /// Divided by the logical core count: a fully busy machine reads 1.0.
    #[default]
    PerCore,
    /// One fully busy core reads 1.0, so multi-threaded work can exceed 1.0.
    Irix,
}

impl CpuNormalization {
    /// Returns a human-readable label for the normalization mode.
    pub fn label(&self) -> &'static str {
        match self {
            CpuNormalization::PerCore => "Per-core",
            CpuNormalization::Irix => "Irix",
        }
    }

    /// Convert a per-process percentage (100 = one core) into a fraction.
    pub fn tree_fraction(&self, percent: f64, logical_cores: usize) -> f64 {
        match self {
            CpuNormalization::PerCore => percent / 100.0 / logical_cores.max(1) as f64,
            CpuNormalization::Irix => percent / 100.0,
        }
    }

    /// Convert a machine-wide percentage (100 = every core) into a fraction.
    pub fn system_fraction(&self, percent: f64, logical_cores: usize) -> f64 {
        match self {
            CpuNormalization::PerCore => percent / 100.0,
            CpuNormalization::Irix => percent / 100.0 * logical_cores.max(1) as f64,
        }
    }
}

impl fmt::Display for CpuNormalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
