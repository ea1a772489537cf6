//! Energy attribution sessions.

pub mod attribution;
pub mod launcher;
pub mod orchestrator;

pub use launcher::MonitoredProcess;
pub use orchestrator::{SamplingOrchestrator, SessionOutcome, Target};

use pidwatt_platform::CounterError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to control monitored process: {0}")]
    Target(#[source] std::io::Error),

    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("session already started")]
    AlreadyStarted,
}
