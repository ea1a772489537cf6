mod types;
mod version;

pub use types::{EnergySample, Normalization, SessionReport, SessionStatus, SessionSummary};
pub use version::{MIN_SUPPORTED_VERSION, REPORT_FORMAT_VERSION};
