//!
//! Process Runtime State
//!
//! The configuration every primitive consults lives here, with an explicit
//! init-once lifecycle:
//!
//! - `init(config)` installs it, at most once, before first use.
//! - `config()` returns the installed config. If nothing was installed, the
//!   first call loads one from the `TANDEM_*` environment and that value is
//!   fixed for the rest of the process.
//!

use tandem_core::{Config, SyncError, SyncResult};
use tracing::{debug, warn};

use crate::once::OnceValue;

static CONFIG: OnceValue<Config> = OnceValue::new();

/// Install the process configuration.
///
/// Fails with `InvalidArgument` if a configuration is already in place,
/// whether installed explicitly or loaded lazily by an earlier `config()`.
pub fn init(config: Config) -> SyncResult<()> {
    config.validate()?;
    CONFIG.set(config).map_err(|_| {
        SyncError::InvalidArgument("runtime configuration is already installed".to_string())
    })?;
    debug!("runtime configuration installed");
    Ok(())
}

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            warn!(%err, "ignoring invalid TANDEM_* environment, using defaults");
            Config::default()
        }
    })
}

pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}
