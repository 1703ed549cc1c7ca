use std::time::Duration;

use outpost_domain::OutpostError;
use tracing::{info, warn};

/// Log the outcome of a host-facing operation with structured fields.
///
/// `operation` is a stable identifier such as `"engine::enqueue"`; never pass
/// payload data through it.
#[inline]
pub fn log_operation(operation: &str, elapsed: Duration, success: bool) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    if success {
        info!(operation, duration_ms, "operation_success");
    } else {
        warn!(operation, duration_ms, "operation_failure");
    }
}

/// Convert an `OutpostError` into a stable label suitable for logging.
#[inline]
pub fn error_label(error: &OutpostError) -> &'static str {
    match error {
        OutpostError::Storage(_) => "storage",
        OutpostError::Serialization(_) => "serialization",
        OutpostError::Config(_) => "config",
        OutpostError::Network(_) => "network",
        OutpostError::InvalidInput(_) => "invalid_input",
        OutpostError::NotFound(_) => "not_found",
        OutpostError::Internal(_) => "internal",
    }
}
