//! Structured logging initialisation

use rtskit_core::{RtsError, RtsResult};
use tracing_subscriber::EnvFilter;

/// Default filter when neither an explicit filter nor `RUST_LOG` is given
pub const DEFAULT_FILTER: &str = "info";

/// Install a `fmt` subscriber filtered by `filter`, `RUST_LOG` or [`DEFAULT_FILTER`].
///
/// Returns `Ok(false)` if a global subscriber was already installed.
pub fn init_logging(filter: Option<&str>) -> RtsResult<bool> {
    let filter = build_filter(filter)?;
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("📝 Logging initialised");
    }
    Ok(installed)
}

fn build_filter(filter: Option<&str>) -> RtsResult<EnvFilter> {
    match filter {
        Some(directives) => EnvFilter::try_new(directives).map_err(|e| RtsError::Settings {
            reason: format!("invalid log filter {directives:?}: {e}"),
        }),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_not_an_error() {
        init_logging(Some("rtskit=debug")).unwrap();
        assert!(!init_logging(None).unwrap());
    }

    #[test]
    fn test_invalid_filter() {
        let error = build_filter(Some("rtskit=notalevel")).unwrap_err();
        assert_eq!(error.error_code(), "SETTINGS_ERROR");
    }
}
