//! Tracing subscriber setup shared by the CLI and embedding services.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AtlasError, Result};

/// Installs a global fmt subscriber filtered by `level`.
///
/// `level` accepts any `EnvFilter` directive (`info`, `atlas=debug,warn`).
/// Fails if the directive is malformed or a subscriber is already set.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| AtlasError::InvalidArgument(format!("Invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| AtlasError::InvalidArgument("Logging already initialized".into()))
}
