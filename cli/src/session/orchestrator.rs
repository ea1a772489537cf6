use std::io;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use pidwatt_platform::{
    open_counter, CounterError, EnergyCounter, ProcessError, ProcessIntrospector,
    ProcessTreeSampler, SysinfoIntrospector,
};
use pidwatt_protocol::{EnergySample, SessionStatus, SessionSummary};

use super::attribution::AttributionEngine;
use super::SessionError;
use crate::config::SessionConfig;

/// The monitored process as seen by the tick loop.
pub trait Target {
    fn pid(&self) -> u32;

    /// Non-blocking check whether the process has exited.
    fn has_exited(&mut self) -> io::Result<bool>;

    /// Stop the process; used when the session times out.
    fn terminate(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    TimedOut,
    ProcessNotFound,
    Closed,
}

impl From<SessionStatus> for SessionState {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Completed => SessionState::Completed,
            SessionStatus::TimedOut => SessionState::TimedOut,
            SessionStatus::ProcessNotFound => SessionState::ProcessNotFound,
        }
    }
}

/// What a finished (or aborted) session collected.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub status: Option<SessionStatus>,
    pub root_pid: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub domains: Vec<String>,
    pub summary: SessionSummary,
    pub samples: Vec<EnergySample>,
}

/// Closes the counter exactly once, on every exit path.
struct CounterGuard {
    counter: Box<dyn EnergyCounter>,
    closed: bool,
}

impl CounterGuard {
    fn read_delta(&mut self) -> Result<f64, CounterError> {
        self.counter.read_delta()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counter.close();
        }
    }
}

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drives the tick loop for one monitored process tree.
///
/// `Idle -> Running -> {Completed, TimedOut, ProcessNotFound} -> Closed`
pub struct SamplingOrchestrator<I: ProcessIntrospector = SysinfoIntrospector> {
    config: SessionConfig,
    sampler: ProcessTreeSampler<I>,
    counter: CounterGuard,
    domains: Vec<String>,
    engine: Option<AttributionEngine>,
    state: SessionState,
    status: Option<SessionStatus>,
    started: Option<(Instant, DateTime<Utc>)>,
    elapsed: Duration,
}

impl SamplingOrchestrator<SysinfoIntrospector> {
    /// Validate `config` and discover energy counters for this platform.
    pub fn open(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let counter = open_counter(&config.counter_config())?;
        let sampler =
            ProcessTreeSampler::new(config.cpu_normalization(), config.sampling_interval);
        Ok(Self::with_parts(config, sampler, counter))
    }
}

impl<I: ProcessIntrospector> SamplingOrchestrator<I> {
    pub fn with_parts(
        config: SessionConfig,
        sampler: ProcessTreeSampler<I>,
        counter: Box<dyn EnergyCounter>,
    ) -> Self {
        let domains = counter.domain_names();
        Self {
            config,
            sampler,
            counter: CounterGuard {
                counter,
                closed: false,
            },
            domains,
            engine: None,
            state: SessionState::Idle,
            status: None,
            started: None,
            elapsed: Duration::ZERO,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Terminal status, once the loop has ended.
    #[cfg(test)]
    pub fn status(&self) -> Option<SessionStatus> {
        self.status
    }

    /// Run a whole session against `target`, always releasing the counter.
    pub fn run<T: Target>(&mut self, target: &mut T) -> Result<SessionStatus, SessionError> {
        let result = self
            .start(target.pid())
            .and_then(|()| self.tick_loop(target));
        self.stop();
        result
    }

    /// Bind to `root_pid`, prime CPU baselines and re-seed the energy baseline.
    pub fn start(&mut self, root_pid: u32) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyStarted);
        }

        self.sampler.set_root(root_pid);
        self.engine = Some(AttributionEngine::new(root_pid));
        self.started = Some((Instant::now(), Utc::now()));
        self.state = SessionState::Running;

        tracing::info!(
            root_pid,
            interval_ms = self.config.sampling_interval.as_millis() as u64,
            timeout = ?self.config.timeout,
            normalization = self.config.normalization.label(),
            domains = ?self.domains,
            "starting sampling session"
        );

        if let Err(e) = self.sampler.warmup() {
            tracing::info!(error = %e, "root process gone before the first tick");
            self.finish(SessionStatus::ProcessNotFound);
            return Ok(());
        }

        // The first tick's energy must cover the same interval as its CPU reading.
        self.counter.read_delta()?;
        Ok(())
    }

    fn tick_loop<T: Target>(&mut self, target: &mut T) -> Result<SessionStatus, SessionError> {
        while self.state == SessionState::Running {
            if target.has_exited().map_err(SessionError::Target)? {
                self.finish(SessionStatus::Completed);
                break;
            }

            if let Some(timeout) = self.config.timeout {
                if self.started_instant().elapsed() >= timeout {
                    tracing::warn!(
                        timeout_secs = timeout.as_secs_f64(),
                        pid = target.pid(),
                        "timeout reached, terminating monitored process"
                    );
                    target.terminate().map_err(SessionError::Target)?;
                    self.finish(SessionStatus::TimedOut);
                    break;
                }
            }

            self.tick()?;
        }

        Ok(self.status.unwrap_or(SessionStatus::Completed))
    }

    fn tick(&mut self) -> Result<(), SessionError> {
        let tree_cpu = match self.sampler.sample_tree_cpu() {
            Ok(value) => value,
            Err(ProcessError::NotFound { pid }) => {
                tracing::info!(pid, "root process disappeared, ending session");
                self.finish(SessionStatus::ProcessNotFound);
                return Ok(());
            }
            Err(ProcessError::NoRoot) => {
                self.finish(SessionStatus::ProcessNotFound);
                return Ok(());
            }
        };
        let system_cpu = self.sampler.sample_system_cpu();
        let energy_uj = self.counter.read_delta()?;

        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        match engine.accumulate(tree_cpu, system_cpu, energy_uj) {
            Some(sample) => tracing::debug!(
                sequence = sample.sequence,
                tree_cpu,
                system_cpu = sample.system_cpu,
                energy_uj,
                pids = ?self.sampler.snapshot().map(|s| s.members()),
                "tick recorded"
            ),
            None => tracing::debug!(tree_cpu, energy_uj, "system cpu unavailable, tick dropped"),
        }
        Ok(())
    }

    fn started_instant(&self) -> Instant {
        self.started.map_or_else(Instant::now, |(instant, _)| instant)
    }

    fn finish(&mut self, status: SessionStatus) {
        self.elapsed = self.started_instant().elapsed();
        self.status = Some(status);
        self.state = status.into();
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        tracing::info!(
            status = status.label(),
            elapsed_ms = self.elapsed.as_millis() as u64,
            samples = engine.series().len(),
            dropped = engine.dropped_ticks(),
            "sampling session ended"
        );
        if engine.series().is_empty() {
            tracing::warn!("no samples recorded; the command may have exited within one interval");
        }
    }

    /// Release the energy counter; safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if self.status.is_none() {
            self.elapsed = self.started_instant().elapsed();
        }
        self.counter.close();
        self.state = SessionState::Closed;
    }

    /// Everything collected so far, including after a fatal error.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        let engine = self.engine.as_ref()?;
        let (_, started_at) = self.started?;

        Some(SessionOutcome {
            status: self.status,
            root_pid: engine.pid(),
            started_at,
            elapsed: self.elapsed,
            domains: self.domains.clone(),
            summary: engine.summary(),
            samples: engine.series().as_slice().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use pidwatt_platform::CpuNormalization;

    #[derive(Clone, Default)]
    struct Frame {
        cpu: HashMap<u32, f32>,
        parents: HashMap<u32, u32>,
        system: f32,
    }

    fn frame(procs: &[(u32, Option<u32>, f32)], system: f32) -> Frame {
        let mut f = Frame {
            system,
            ..Default::default()
        };
        for (pid, parent, cpu) in procs {
            f.cpu.insert(*pid, *cpu);
            if let Some(parent) = parent {
                f.parents.insert(*pid, *parent);
            }
        }
        f
    }

    struct ScriptedIntrospector {
        frames: VecDeque<Frame>,
        current: Frame,
        cores: usize,
    }

    impl ProcessIntrospector for ScriptedIntrospector {
        fn refresh(&mut self) {
            if let Some(next) = self.frames.pop_front() {
                self.current = next;
            }
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.current.cpu.contains_key(&pid)
        }

        fn children(&self, pid: u32) -> Vec<u32> {
            self.current
                .parents
                .iter()
                .filter(|(_, parent)| **parent == pid)
                .map(|(child, _)| *child)
                .collect()
        }

        fn cpu_usage(&self, pid: u32) -> Option<f32> {
            self.current.cpu.get(&pid).copied()
        }

        fn system_cpu_usage(&self) -> f32 {
            self.current.system
        }

        fn logical_cores(&self) -> usize {
            self.cores
        }
    }

    struct ScriptedCounter {
        deltas: VecDeque<Result<f64, ()>>,
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl EnergyCounter for ScriptedCounter {
        fn read_delta(&mut self) -> Result<f64, CounterError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.deltas.pop_front() {
                Some(Ok(delta)) => Ok(delta),
                Some(Err(())) => Err(CounterError::CounterRead {
                    domain: "package-0".to_string(),
                    source: io::Error::other("read failed"),
                }),
                None => Ok(0.0),
            }
        }

        fn domain_names(&self) -> Vec<String> {
            vec!["package-0".to_string()]
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeTarget {
        pid: u32,
        exit_after_checks: Option<usize>,
        checks: usize,
        terminated: bool,
    }

    impl FakeTarget {
        fn new(pid: u32, exit_after_checks: Option<usize>) -> Self {
            Self {
                pid,
                exit_after_checks,
                checks: 0,
                terminated: false,
            }
        }
    }

    impl Target for FakeTarget {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn has_exited(&mut self) -> io::Result<bool> {
            self.checks += 1;
            Ok(self.terminated || self.exit_after_checks.is_some_and(|n| self.checks > n))
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.terminated = true;
            Ok(())
        }
    }

    struct Harness {
        orchestrator: SamplingOrchestrator<ScriptedIntrospector>,
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    fn harness(
        frames: Vec<Frame>,
        deltas: Vec<Result<f64, ()>>,
        timeout: Option<Duration>,
    ) -> Harness {
        let reads = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = ScriptedCounter {
            deltas: deltas.into(),
            reads: Arc::clone(&reads),
            closes: Arc::clone(&closes),
        };
        let sampler = ProcessTreeSampler::with_introspector(
            ScriptedIntrospector {
                frames: frames.into(),
                current: Frame::default(),
                cores: 1,
            },
            CpuNormalization::PerCore,
            Duration::ZERO,
        );
        let config = SessionConfig {
            sampling_interval: Duration::from_millis(1),
            timeout,
            ..SessionConfig::default()
        };

        Harness {
            orchestrator: SamplingOrchestrator::with_parts(config, sampler, Box::new(counter)),
            reads,
            closes,
        }
    }

    #[test]
    fn test_completed_session_records_every_tick() {
        let frames = vec![
            frame(&[(10, None, 0.0)], 10.0),
            frame(&[(10, None, 50.0)], 50.0),
            frame(&[(10, None, 25.0), (11, Some(10), 25.0)], 100.0),
            frame(&[(10, None, 0.0)], 50.0),
        ];
        // First delta is the baseline re-seed after warmup and is discarded.
        let deltas = vec![Ok(999.0), Ok(1_000_000.0), Ok(2_000_000.0), Ok(500_000.0)];
        let mut h = harness(frames, deltas, None);
        let mut target = FakeTarget::new(10, Some(3));

        let status = h.orchestrator.run(&mut target).unwrap();

        assert_eq!(status, SessionStatus::Completed);
        assert_eq!(h.orchestrator.state(), SessionState::Closed);
        let outcome = h.orchestrator.outcome().unwrap();
        assert_eq!(outcome.samples.len(), 3);
        assert!((outcome.summary.total_attributed_energy_j - 2.0).abs() < 1e-9);
        assert!((outcome.summary.total_system_energy_j - 3.5).abs() < 1e-9);
        assert_eq!(outcome.domains, vec!["package-0"]);
        assert_eq!(h.reads.load(Ordering::SeqCst), 4);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_system_cpu_tick_is_dropped_but_energy_read() {
        let frames = vec![
            frame(&[(10, None, 0.0)], 10.0),
            frame(&[(10, None, 50.0)], 0.0),
            frame(&[(10, None, 50.0)], 50.0),
        ];
        let deltas = vec![Ok(0.0), Ok(700.0), Ok(1_000.0)];
        let mut h = harness(frames, deltas, None);
        let mut target = FakeTarget::new(10, Some(2));

        h.orchestrator.run(&mut target).unwrap();

        let outcome = h.orchestrator.outcome().unwrap();
        assert_eq!(outcome.samples.len(), 1);
        assert_eq!(outcome.samples[0].sequence, 0);
        assert_eq!(outcome.samples[0].energy_uj, 1_000.0);
        assert_eq!(outcome.summary.dropped_ticks, 1);
        assert_eq!(h.reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_root_exit_mid_loop_is_process_not_found() {
        let frames = vec![
            frame(&[(10, None, 0.0)], 10.0),
            frame(&[(10, None, 40.0)], 80.0),
            frame(&[(99, None, 40.0)], 80.0),
        ];
        let deltas = vec![Ok(0.0), Ok(1_000.0), Ok(5_000.0)];
        let mut h = harness(frames, deltas, None);
        let mut target = FakeTarget::new(10, None);

        let status = h.orchestrator.run(&mut target).unwrap();

        assert_eq!(status, SessionStatus::ProcessNotFound);
        let outcome = h.orchestrator.outcome().unwrap();
        assert_eq!(outcome.status, Some(SessionStatus::ProcessNotFound));
        assert_eq!(outcome.samples.len(), 1);
        assert_eq!(outcome.samples[0].energy_uj, 1_000.0);
        // The abandoned tick never reached the counter.
        assert_eq!(h.reads.load(Ordering::SeqCst), 2);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_root_missing_at_start() {
        let mut h = harness(vec![frame(&[], 10.0)], vec![], None);
        let mut target = FakeTarget::new(10, None);

        let status = h.orchestrator.run(&mut target).unwrap();

        assert_eq!(status, SessionStatus::ProcessNotFound);
        assert!(h.orchestrator.outcome().unwrap().samples.is_empty());
        assert_eq!(h.reads.load(Ordering::SeqCst), 0);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_terminates_target() {
        let frames = vec![frame(&[(10, None, 100.0)], 100.0)];
        let mut h = harness(frames, vec![], Some(Duration::from_millis(30)));
        let mut target = FakeTarget::new(10, None);

        let status = h.orchestrator.run(&mut target).unwrap();

        assert_eq!(status, SessionStatus::TimedOut);
        assert!(target.terminated);
        assert_eq!(h.orchestrator.status(), Some(SessionStatus::TimedOut));
        assert!(!h.orchestrator.outcome().unwrap().samples.is_empty());
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_counter_failure_is_fatal_but_cleans_up() {
        let frames = vec![
            frame(&[(10, None, 0.0)], 10.0),
            frame(&[(10, None, 50.0)], 50.0),
            frame(&[(10, None, 50.0)], 50.0),
        ];
        let deltas = vec![Ok(0.0), Ok(1_000.0), Err(())];
        let mut h = harness(frames, deltas, None);
        let mut target = FakeTarget::new(10, None);

        let err = h.orchestrator.run(&mut target).unwrap_err();

        assert!(matches!(
            err,
            SessionError::Counter(CounterError::CounterRead { .. })
        ));
        assert_eq!(h.orchestrator.state(), SessionState::Closed);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        let outcome = h.orchestrator.outcome().unwrap();
        assert_eq!(outcome.status, None);
        assert_eq!(outcome.samples.len(), 1);
    }

    #[test]
    fn test_stop_and_drop_close_exactly_once() {
        let h = harness(vec![], vec![], None);
        let closes = Arc::clone(&h.closes);
        let mut orchestrator = h.orchestrator;

        orchestrator.stop();
        orchestrator.stop();
        drop(orchestrator);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_cannot_start_twice() {
        let frames = vec![frame(&[(10, None, 0.0)], 10.0)];
        let mut h = harness(frames, vec![], None);

        h.orchestrator.start(10).unwrap();
        assert_eq!(h.orchestrator.state(), SessionState::Running);
        assert!(matches!(
            h.orchestrator.start(10),
            Err(SessionError::AlreadyStarted)
        ));
    }
}
