//! Process-tree CPU sampling.
//!
//! CPU percentages are differential: each refresh measures usage since the
//! previous one. [`ProcessTreeSampler::warmup`] takes the first reading so the
//! first real sample covers one sampling interval rather than the whole
//! lifetime of the process.

use std::collections::{HashMap, HashSet, VecDeque};
use std::thread;
use std::time::Duration;

use sysinfo::{CpuRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use crate::error::ProcessError;
use crate::types::CpuNormalization;

/// Process introspection needed by the sampler.
///
/// Queries answer from the state captured by the latest [`refresh`](Self::refresh).
pub trait ProcessIntrospector {
    /// Capture a fresh view of the process table and CPU counters.
    fn refresh(&mut self);

    /// Whether `pid` is still in the process table. An exited child that has
    /// not been reaped yet counts, so its final interval is still measured.
    fn is_alive(&self, pid: u32) -> bool;

    /// Direct children of `pid`.
    fn children(&self, pid: u32) -> Vec<u32>;

    /// CPU usage of `pid` since the previous refresh, 100 = one full core.
    fn cpu_usage(&self, pid: u32) -> Option<f32>;

    /// Machine-wide CPU usage since the previous refresh, 100 = every core busy.
    fn system_cpu_usage(&self) -> f32;

    fn logical_cores(&self) -> usize;
}

/// [`ProcessIntrospector`] backed by `sysinfo`.
pub struct SysinfoIntrospector {
    system: System,
    children: HashMap<u32, Vec<u32>>,
    logical_cores: usize,
}

impl SysinfoIntrospector {
    pub fn new() -> Self {
        let system =
            System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()));
        let logical_cores = system.cpus().len().max(1);

        Self {
            system,
            children: HashMap::new(),
            logical_cores,
        }
    }
}

impl Default for SysinfoIntrospector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessIntrospector for SysinfoIntrospector {
    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu(),
        );
        self.system.refresh_cpu_usage();

        self.children.clear();
        for (pid, process) in self.system.processes() {
            // Threads show up as tasks on Linux; their time is already in the parent.
            if process.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = process.parent() {
                self.children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(pid.as_u32());
            }
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.system.process(sysinfo::Pid::from_u32(pid)).is_some()
    }

    fn children(&self, pid: u32) -> Vec<u32> {
        self.children.get(&pid).cloned().unwrap_or_default()
    }

    fn cpu_usage(&self, pid: u32) -> Option<f32> {
        self.system
            .process(sysinfo::Pid::from_u32(pid))
            .map(|p| p.cpu_usage())
    }

    fn system_cpu_usage(&self) -> f32 {
        self.system.global_cpu_usage()
    }

    fn logical_cores(&self) -> usize {
        self.logical_cores
    }
}

/// Root pid plus every live descendant at one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTreeSnapshot {
    root: u32,
    members: Vec<u32>,
}

impl ProcessTreeSnapshot {
    /// Walk the tree under `root`, failing if the root itself is gone.
    pub fn capture<I: ProcessIntrospector + ?Sized>(
        introspector: &I,
        root: u32,
    ) -> Result<Self, ProcessError> {
        if !introspector.is_alive(root) {
            return Err(ProcessError::NotFound { pid: root });
        }

        let mut members = vec![root];
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);

        while let Some(pid) = queue.pop_front() {
            for child in introspector.children(pid) {
                if seen.insert(child) {
                    members.push(child);
                    queue.push_back(child);
                }
            }
        }

        Ok(Self { root, members })
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn members(&self) -> &[u32] {
        &self.members
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.members.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Samples CPU utilisation of a process tree and of the whole machine.
pub struct ProcessTreeSampler<I: ProcessIntrospector = SysinfoIntrospector> {
    introspector: I,
    normalization: CpuNormalization,
    interval: Duration,
    root: Option<u32>,
    snapshot: Option<ProcessTreeSnapshot>,
}

impl ProcessTreeSampler<SysinfoIntrospector> {
    pub fn new(normalization: CpuNormalization, interval: Duration) -> Self {
        Self::with_introspector(SysinfoIntrospector::new(), normalization, interval)
    }
}

impl<I: ProcessIntrospector> ProcessTreeSampler<I> {
    pub fn with_introspector(
        introspector: I,
        normalization: CpuNormalization,
        interval: Duration,
    ) -> Self {
        Self {
            introspector,
            normalization,
            interval,
            root: None,
            snapshot: None,
        }
    }

    /// Bind to a new root, forgetting any previous tree.
    pub fn set_root(&mut self, pid: u32) {
        self.root = Some(pid);
        self.snapshot = None;
    }

    pub fn root(&self) -> Option<u32> {
        self.root
    }

    pub fn normalization(&self) -> CpuNormalization {
        self.normalization
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tree membership as of the latest sample.
    pub fn snapshot(&self) -> Option<&ProcessTreeSnapshot> {
        self.snapshot.as_ref()
    }

    /// Prime CPU baselines for the current tree and the system.
    pub fn warmup(&mut self) -> Result<(), ProcessError> {
        let root = self.root.ok_or(ProcessError::NoRoot)?;
        self.introspector.refresh();
        let snapshot = ProcessTreeSnapshot::capture(&self.introspector, root)?;
        tracing::debug!(root, members = snapshot.len(), "cpu baselines primed");
        self.snapshot = Some(snapshot);
        Ok(())
    }

    /// Block for one interval, then return the tree's CPU usage over it.
    ///
    /// Members that exit mid-enumeration contribute nothing. Also refreshes
    /// the system-wide reading returned by [`sample_system_cpu`](Self::sample_system_cpu).
    pub fn sample_tree_cpu(&mut self) -> Result<f64, ProcessError> {
        let root = self.root.ok_or(ProcessError::NoRoot)?;

        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        self.introspector.refresh();

        let snapshot = match ProcessTreeSnapshot::capture(&self.introspector, root) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.snapshot = None;
                return Err(e);
            }
        };

        let percent: f64 = snapshot
            .members()
            .iter()
            .filter_map(|pid| self.introspector.cpu_usage(*pid))
            .map(f64::from)
            .sum();
        self.snapshot = Some(snapshot);

        Ok(self
            .normalization
            .tree_fraction(percent, self.introspector.logical_cores()))
    }

    /// Machine-wide CPU usage over the same interval as the last tree sample.
    ///
    /// Exactly zero means the counters produced nothing usable and is
    /// reported as `None` rather than as an idle machine.
    pub fn sample_system_cpu(&self) -> Option<f64> {
        let percent = f64::from(self.introspector.system_cpu_usage());
        if percent <= 0.0 || !percent.is_finite() {
            return None;
        }
        Some(
            self.normalization
                .system_fraction(percent, self.introspector.logical_cores()),
        )
    }
}
