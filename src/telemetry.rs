//! Tracing subscriber setup for the binaries.

use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

/// Installs an `EnvFilter` plus fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_directive`.
///
/// # Errors
///
/// Returns [`TryInitError`] when a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_subscriber_is_installed() {
        let _installed = init_tracing("warn");

        let second = init_tracing("debug");

        assert!(second.is_err());
    }
}
