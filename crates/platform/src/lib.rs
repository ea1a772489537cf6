//! Energy counters and process-tree CPU sampling for pidwatt.
//!
//! This crate provides the measurement side of energy attribution: reading
//! hardware energy counters as wraparound-safe deltas, and sampling CPU
//! utilisation of a process tree alongside the whole machine.
//!
//! # Features
//!
//! - `linux` - Enable Linux support (powercap RAPL zones)
//! - `macos` - Enable macOS support (`powermetrics` stream)
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use pidwatt_platform::{open_counter, CounterConfig, CpuNormalization, ProcessTreeSampler};
//!
//! let mut counter = open_counter(&CounterConfig::default())?;
//! let mut sampler = ProcessTreeSampler::new(CpuNormalization::PerCore, Duration::from_millis(200));
//! sampler.set_root(pid);
//! sampler.warmup()?;
//! counter.read_delta()?;
//!
//! let tree = sampler.sample_tree_cpu()?;
//! let system = sampler.sample_system_cpu();
//! let energy_uj = counter.read_delta()?;
//! ```

mod child;
mod energy;
mod error;
mod factory;
pub mod powermetrics;
mod process;
pub mod stream;
mod types;

pub use child::terminate_gracefully;
pub use energy::{
    counter_delta, CounterConfig, EnergyCounter, EnergyDomain, DEFAULT_DOMAIN_CLASS,
    DEFAULT_POWERCAP_ROOT,
};
pub use error::{CounterError, ProcessError};
pub use factory::open_counter;
pub use process::{ProcessIntrospector, ProcessTreeSampler, ProcessTreeSnapshot, SysinfoIntrospector};
pub use types::CpuNormalization;

#[cfg(target_os = "linux")]
#[cfg(feature = "linux")]
pub mod linux;
