//! Tracing subscriber setup.

use fairbatch_types::constants::{ENGINE_NAME, VERSION};
use fairbatch_types::{FairbatchError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. `json` switches
/// to one JSON object per event.
///
/// # Errors
/// `Configuration` if a global subscriber is already installed.
pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| FairbatchError::Configuration(format!("tracing subscriber: {e}")))?;
    tracing::info!(engine = ENGINE_NAME, version = VERSION, json, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        init(false).unwrap();
        assert!(matches!(init(true), Err(FairbatchError::Configuration(_))));
    }
}
