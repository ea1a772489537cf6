use pidwatt_protocol::{EnergySample, SessionSummary};

const UJ_PER_J: f64 = 1_000_000.0;

/// Recorded samples in tick order.
#[derive(Debug, Clone, Default)]
pub struct AttributionSeries {
    samples: Vec<EnergySample>,
}

impl AttributionSeries {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, sample: EnergySample) {
        debug_assert!(self
            .samples
            .last()
            .map_or(true, |last| last.sequence <= sample.sequence));
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&EnergySample> {
        self.samples.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnergySample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[EnergySample] {
        &self.samples
    }
}

/// Turns per-tick CPU and energy readings into attributed samples.
///
/// Each tick's energy is split by the tree's share of system CPU over the
/// same interval. Idle power and non-CPU consumers are not modelled.
#[derive(Debug, Clone)]
pub struct AttributionEngine {
    pid: u32,
    series: AttributionSeries,
    next_sequence: u64,
    dropped_ticks: u64,
}

impl AttributionEngine {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            series: AttributionSeries::new(),
            next_sequence: 0,
            dropped_ticks: 0,
        }
    }

    /// Record one tick, or drop it when system CPU is zero or unavailable.
    pub fn accumulate(
        &mut self,
        tree_cpu: f64,
        system_cpu: Option<f64>,
        energy_uj: f64,
    ) -> Option<&EnergySample> {
        let system_cpu = match system_cpu {
            Some(value) if value > 0.0 && value.is_finite() => value,
            _ => {
                self.dropped_ticks += 1;
                return None;
            }
        };

        let sample = EnergySample {
            sequence: self.next_sequence,
            pid: self.pid,
            tree_cpu,
            system_cpu,
            energy_uj: energy_uj.max(0.0),
        };
        self.next_sequence += 1;
        self.series.push(sample);
        self.series.last()
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn series(&self) -> &AttributionSeries {
        &self.series
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }

    /// Sum over samples of `energy_uj * tree_cpu / system_cpu`, in joules.
    pub fn total_attributed_energy_j(&self) -> f64 {
        self.series
            .iter()
            .map(EnergySample::attributed_uj)
            .sum::<f64>()
            / UJ_PER_J
    }

    /// Sum of recorded energy deltas, in joules.
    pub fn total_system_energy_j(&self) -> f64 {
        self.series.iter().map(|s| s.energy_uj).sum::<f64>() / UJ_PER_J
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            total_attributed_energy_j: self.total_attributed_energy_j(),
            total_system_energy_j: self.total_system_energy_j(),
            sample_count: self.series.len(),
            dropped_ticks: self.dropped_ticks,
        }
    }
}
