//! Tracing subscriber setup.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Install the global fmt subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Safe to call more
/// than once; only the first call installs anything. Returns `false` if
/// another subscriber was already set by someone else.
pub fn init_tracing(format: LogFormat) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

        let result = match format {
            LogFormat::Pretty => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        result.is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        let first = init_tracing(LogFormat::Json);
        let second = init_tracing(LogFormat::Pretty);
        assert_eq!(first, second);
        tracing::info!(component = "logging", "subscriber ready");
    }
}
