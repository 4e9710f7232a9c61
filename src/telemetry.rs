//! Process-wide `tracing` setup.
//!
//! The filter comes from `SCT_LOG`, then `RUST_LOG`, then [`LogConfig::default_directive`].
//! Event echoes from the file logger use the `sct_events::events` target, so
//! `SCT_LOG=sct_events::events=off` silences them without hiding diagnostics.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Output format of the diagnostic log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Diagnostic log settings.
#[derive(Clone, Debug)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Used when neither `SCT_LOG` nor `RUST_LOG` is set.
    pub default_directive: String,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            default_directive: "info".to_string(),
            with_target: true,
        }
    }
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        std::env::var("SCT_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(&self.default_directive))
    }
}

/// Installs the global subscriber.
///
/// Returns `false` if one was already installed (e.g. by the harness or an
/// earlier call); the existing one is kept.
pub fn init_logging(cfg: &LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(cfg.filter());
    let installed = match cfg.format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(cfg.with_target))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(cfg.with_target))
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let cfg = LogConfig::default();
        let _ = init_logging(&cfg);
        assert!(!init_logging(&cfg));
    }
}
