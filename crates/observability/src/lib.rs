//! Process-wide tracing setup shared by the clinicflow binaries.

/// Initialize tracing with the format chosen by `CLINICFLOW_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Subscriber construction (filters, formats).
pub mod tracing;
