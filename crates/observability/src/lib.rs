//! Process-wide tracing setup shared by cmsgate binaries.

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(&tracing::LogSettings::default());
}

/// Subscriber configuration (filters, output format).
pub mod tracing;

pub use tracing::{LogFormat, LogSettings};
