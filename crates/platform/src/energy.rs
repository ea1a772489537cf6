//! Energy counter traits and types.
//!
//! Counters report energy in microjoules (µJ). Every reader hands out
//! *deltas*: the energy consumed since the previous call, never the raw
//! cumulative register value.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::CounterError;

pub const DEFAULT_POWERCAP_ROOT: &str = "/sys/class/powercap/intel-rapl";
pub const DEFAULT_DOMAIN_CLASS: &str = "package";

/// Trait for platform-specific energy counters.
///
/// Implementations are built once through [`crate::open_counter`] and then
/// polled once per tick by the sampling loop.
pub trait EnergyCounter: Send {
    /// Energy consumed since the previous call, summed across all domains.
    ///
    /// Mutates the per-domain baseline, so it must be called at most once per
    /// tick. Calling it twice back to back yields a near-zero second delta and
    /// the first tick's energy is lost to whoever made the extra call.
    fn read_delta(&mut self) -> Result<f64, CounterError>;

    /// Human-readable names of the domains this counter aggregates.
    fn domain_names(&self) -> Vec<String>;

    /// Release handles and stop any helper processes.
    ///
    /// Must be safe to call more than once.
    fn close(&mut self);
}

/// Settings needed to construct an energy counter.
#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Root of the powercap hierarchy (Linux).
    pub powercap_root: PathBuf,
    /// Domain class prefix to match, e.g. `package`.
    pub domain_class: String,
    /// Number of domains (one per socket) to aggregate.
    pub sockets: usize,
    /// Tick length; stream counters integrate average power over it.
    pub sampling_interval: Duration,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            powercap_root: PathBuf::from(DEFAULT_POWERCAP_ROOT),
            domain_class: DEFAULT_DOMAIN_CLASS.to_string(),
            sockets: 1,
            sampling_interval: Duration::from_millis(200),
        }
    }
}

/// One readable hardware energy counter.
///
/// `last_uj` always holds the most recent raw reading seen by this process.
#[derive(Debug, Clone)]
pub struct EnergyDomain {
    path: PathBuf,
    name: String,
    last_uj: u64,
    max_uj: u64,
}

impl EnergyDomain {
    pub fn new(path: PathBuf, name: String, last_uj: u64, max_uj: u64) -> Self {
        Self {
            path,
            name,
            last_uj,
            max_uj,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_uj(&self) -> u64 {
        self.last_uj
    }

    pub fn max_uj(&self) -> u64 {
        self.max_uj
    }

    /// Record a new raw reading and return the energy consumed since the last one.
    pub fn advance(&mut self, current_uj: u64) -> u64 {
        let delta = counter_delta(self.last_uj, current_uj, self.max_uj);
        if current_uj < self.last_uj {
            tracing::debug!(
                domain = %self.name,
                last_uj = self.last_uj,
                current_uj,
                max_uj = self.max_uj,
                "energy counter wrapped"
            );
        }
        self.last_uj = current_uj;
        delta
    }
}

/// Wraparound-safe difference between two raw counter readings.
///
/// A reading below the previous one means the register passed `max_uj` and
/// restarted from zero.
pub fn counter_delta(last_uj: u64, current_uj: u64, max_uj: u64) -> u64 {
    if current_uj < last_uj {
        max_uj.saturating_sub(last_uj) + current_uj
    } else {
        current_uj - last_uj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_delta_monotonic() {
        assert_eq!(counter_delta(1_000, 1_000, 10_000), 0);
        assert_eq!(counter_delta(1_000, 4_500, 10_000), 3_500);
    }

    #[test]
    fn test_counter_delta_wraparound() {
        assert_eq!(counter_delta(9_000_000, 500_000, 10_000_000), 1_500_000);
        assert_eq!(counter_delta(10_000_000, 0, 10_000_000), 0);
        assert_eq!(counter_delta(1, 0, 10_000_000), 9_999_999);
    }

    #[test]
    fn test_counter_delta_bogus_max_never_underflows() {
        assert_eq!(counter_delta(9_000, 100, 5_000), 100);
    }

    #[test]
    fn test_domain_advance_updates_baseline() {
        let mut domain = EnergyDomain::new(
            PathBuf::from("/sys/class/powercap/intel-rapl/intel-rapl:0"),
            "package-0".to_string(),
            9_000_000,
            10_000_000,
        );

        assert_eq!(domain.advance(500_000), 1_500_000);
        assert_eq!(domain.last_uj(), 500_000);
        assert_eq!(domain.advance(700_000), 200_000);
        assert_eq!(domain.last_uj(), 700_000);
    }
}
