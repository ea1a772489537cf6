//! Stream-based energy counters.
//!
//! Some platforms only expose power through a long-lived helper process that
//! prints a reading every interval. A background thread parses its output
//! into a rolling window of `(Instant, watts)` readings; the tick loop
//! averages the window covering the last sampling interval and integrates it
//! into energy without ever blocking on the helper's I/O.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::child::terminate_gracefully;
use crate::energy::EnergyCounter;
use crate::error::CounterError;

const WINDOW_CAPACITY: usize = 1000;
const HELPER_GRACE: Duration = Duration::from_secs(2);
const READER_THREAD: &str = "energy-stream";

/// Turns one line of helper output into a power reading in watts.
pub trait LineParser: Send + 'static {
    fn parse(&mut self, line: &str) -> Option<f64>;
}

/// Bounded, time-ordered buffer of power readings.
#[derive(Debug)]
pub struct RollingWindow {
    readings: VecDeque<(Instant, f64)>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, at: Instant, watts: f64) {
        if self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back((at, watts));
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Mean power of readings taken at or after `cutoff`.
    pub fn average_since(&self, cutoff: Option<Instant>) -> Option<f64> {
        let (sum, count) = self
            .readings
            .iter()
            .filter(|(at, _)| cutoff.map_or(true, |c| *at >= c))
            .fold((0.0, 0usize), |(sum, count), (_, watts)| (sum + watts, count + 1));

        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }
}

/// Energy counter fed by a continuously running helper process.
pub struct StreamCounter {
    name: String,
    interval: Duration,
    window: Arc<Mutex<RollingWindow>>,
    running: Arc<AtomicBool>,
    helper: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl StreamCounter {
    /// Spawn `command` and start parsing its stdout in the background.
    pub fn spawn<P: LineParser>(
        name: &str,
        mut command: Command,
        parser: P,
        interval: Duration,
    ) -> Result<Self, CounterError> {
        let program = command.get_program().to_string_lossy().to_string();
        let mut helper = command
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CounterError::Spawn {
                program: program.clone(),
                source,
            })?;

        let Some(stdout) = helper.stdout.take() else {
            let _ = terminate_gracefully(&mut helper, HELPER_GRACE);
            return Err(CounterError::Spawn {
                program,
                source: std::io::Error::other("helper stdout not captured"),
            });
        };

        tracing::info!(program = %program, pid = helper.id(), "started energy helper");

        let mut counter = match Self::from_reader(name, stdout, parser, interval) {
            Ok(counter) => counter,
            Err(e) => {
                let _ = terminate_gracefully(&mut helper, HELPER_GRACE);
                return Err(e);
            }
        };
        counter.helper = Some(helper);
        Ok(counter)
    }

    /// Parse readings from any byte stream; no helper process is owned.
    pub fn from_reader<R, P>(
        name: &str,
        source: R,
        parser: P,
        interval: Duration,
    ) -> Result<Self, CounterError>
    where
        R: Read + Send + 'static,
        P: LineParser,
    {
        let window = Arc::new(Mutex::new(RollingWindow::new(WINDOW_CAPACITY)));
        let running = Arc::new(AtomicBool::new(true));

        let reader = {
            let window = Arc::clone(&window);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(READER_THREAD.to_string())
                .spawn(move || read_loop(source, parser, window, running))
                .map_err(|source| CounterError::Spawn {
                    program: READER_THREAD.to_string(),
                    source,
                })?
        };

        Ok(Self {
            name: name.to_string(),
            interval,
            window,
            running,
            helper: None,
            reader: Some(reader),
        })
    }

    /// Number of readings currently buffered.
    pub fn buffered(&self) -> usize {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn read_loop<R: Read, P: LineParser>(
    source: R,
    mut parser: P,
    window: Arc<Mutex<RollingWindow>>,
    running: Arc<AtomicBool>,
) {
    for line in BufReader::new(source).lines() {
        let Ok(line) = line else {
            break;
        };

        if let Some(watts) = parser.parse(&line) {
            window
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Instant::now(), watts);
        }

        if !running.load(Ordering::Relaxed) {
            break;
        }
    }
    tracing::debug!("energy stream reader finished");
}

impl EnergyCounter for StreamCounter {
    fn read_delta(&mut self) -> Result<f64, CounterError> {
        let cutoff = Instant::now().checked_sub(self.interval);
        let average = self
            .window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .average_since(cutoff);

        Ok(average.map_or(0.0, |watts| {
            watts * self.interval.as_secs_f64() * 1_000_000.0
        }))
    }

    fn domain_names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::Relaxed);

        if let Some(mut helper) = self.helper.take() {
            match terminate_gracefully(&mut helper, HELPER_GRACE) {
                Ok(status) => tracing::info!(%status, "energy helper stopped"),
                Err(e) => tracing::warn!(error = %e, "failed to stop energy helper"),
            }
        }

        if let Some(reader) = self.reader.take() {
            let deadline = Instant::now() + HELPER_GRACE;
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            // A grandchild may still hold the pipe open; leave the thread detached then.
            if !reader.is_finished() {
                tracing::warn!("energy stream reader still blocked, detaching");
            } else if reader.join().is_err() {
                tracing::warn!("energy stream reader panicked");
            }
        }
    }
}

impl Drop for StreamCounter {
    fn drop(&mut self) {
        self.close();
    }
}
