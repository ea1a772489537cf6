//! Versioning for the session report document.
//!
//! # Version History
//!
//! | Version | Changes |
//! |---------|---------|
//! | 1 | Initial report format |
//! | 2 | Added `dropped_ticks` to the summary, `domains` to the report |
//!
//! # Breaking Changes (require REPORT_FORMAT_VERSION bump)
//!
//! - Removing fields from `SessionReport`, `SessionSummary` or `EnergySample`
//! - Changing field types or units
//! - Renaming fields without `#[serde(alias)]`
//!
//! # Non-Breaking Changes (safe without version bump)
//!
//! - Adding new optional fields with `#[serde(default)]`
//! - Adding new enum variants

/// Current report format version. Bump when making breaking changes.
pub const REPORT_FORMAT_VERSION: u32 = 2;

/// Oldest report format readers of this build still accept.
pub const MIN_SUPPORTED_VERSION: u32 = 1;
