//! Tracing subscriber setup for processes hosting the engine.

use boarmarket_types::{MarketError, Result};
use tracing_subscriber::EnvFilter;

/// Output format of installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Install a global subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"` or `"boarmarket_engine=debug"`).
///
/// # Errors
/// `Configuration` if the directive does not parse or a global subscriber
/// is already installed.
pub fn init(format: LogFormat, default_directive: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| MarketError::Configuration(format!("bad log directive: {e}")))?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| MarketError::Configuration(format!("cannot install subscriber: {e}")))
}
