//! Tracing/logging setup shared by every process embedding the ledger.

/// Tracing configuration (filters, output format).
pub mod logging;

pub use logging::LogFormat;

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    logging::init(LogFormat::from_env());
}
