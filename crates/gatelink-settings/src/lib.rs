//! # gatelink-settings
//!
//! Configuration for the gatelink gateway client, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`GatelinkSettings::default()`]
//! 2. **User file**: `~/.gatelink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `GATELINK_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use gatelink_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("gateway: {}:{}", settings.gateway.host, settings.gateway.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<GatelinkSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.gatelink/settings.json` with env
/// var overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static GatelinkSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: GatelinkSettings) -> std::result::Result<(), GatelinkSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = GatelinkSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = GatelinkSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.gateway.port, 18789);
        assert_eq!(settings.requests.timeout_ms, 30_000);
        assert_eq!(settings.reconnect.initial_delay_ms, 1000);
        assert_eq!(settings.reconnect.max_delay_ms, 30_000);
        assert_eq!(settings.client.role, "operator");
    }
}
