//! Structured logging setup for provider processes

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber; `RUST_LOG` overrides `default_directive`
///
/// Logs go to stderr because the host reads the plugin's stdout.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging(default_directive: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Like [`init_logging`], but returns false instead of panicking when a
/// subscriber is already set
pub fn try_init_logging(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_twice() {
        let _ = try_init_logging("stratus_cloud=debug");
        assert!(!try_init_logging("info"));
    }
}
