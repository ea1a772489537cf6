//! Error types for energy counters and process introspection.

use std::io;
use std::path::PathBuf;

/// Failures raised while discovering or reading energy counters.
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    /// The counter subsystem itself is missing (no powercap tree, unsupported OS).
    #[error("energy counter source unavailable: {}", path.display())]
    SourceUnavailable { path: PathBuf },

    /// Fewer readable domains of the requested class than asked for.
    #[error("requested {requested} energy domain(s) of class '{class}', found only {found}")]
    InsufficientDomains {
        requested: usize,
        found: usize,
        class: String,
    },

    /// A configured domain could not be read after discovery.
    #[error("failed to read energy counter '{domain}': {source}")]
    CounterRead {
        domain: String,
        #[source]
        source: io::Error,
    },

    /// A helper process feeding a stream counter could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Failures raised while sampling a process tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    #[error("process {pid} not found")]
    NotFound { pid: u32 },

    #[error("no root process bound to the sampler")]
    NoRoot,
}
