//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]`. Sections marked with
//! `#[serde(default)]` allow partial JSON: missing fields get their default.

use std::time::Duration;

use gatelink_core::backoff::ReconnectPolicy;
use gatelink_core::constants;
use gatelink_core::profile::ConnectionProfile;
use gatelink_core::protocol::ClientInfo;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the gateway client.
///
/// ```json
/// {
///   "gateway": { "host": "10.0.0.5", "port": 18789, "token": "..." },
///   "requests": { "timeoutMs": 60000 },
///   "reconnect": { "maxDelayMs": 10000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatelinkSettings {
    /// Settings schema version.
    pub version: String,
    /// Gateway endpoint and credentials.
    pub gateway: ConnectionProfile,
    /// Identity presented in the `connect` request.
    pub client: ClientSettings,
    /// Request and handshake deadlines.
    pub requests: RequestSettings,
    /// Transport limits.
    pub transport: TransportSettings,
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
    /// Logging output.
    pub logging: LoggingSettings,
}

impl Default for GatelinkSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            gateway: ConnectionProfile::default(),
            client: ClientSettings::default(),
            requests: RequestSettings::default(),
            transport: TransportSettings::default(),
            reconnect: ReconnectPolicy::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl GatelinkSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.requests.timeout_ms == 0 {
            return Err(SettingsError::invalid("requests.timeoutMs", "must be > 0"));
        }
        if self.requests.handshake_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "requests.handshakeTimeoutMs",
                "must be > 0",
            ));
        }
        if self.transport.max_message_bytes == 0 {
            return Err(SettingsError::invalid("transport.maxMessageBytes", "must be > 0"));
        }
        let multiplier = self.reconnect.multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(SettingsError::invalid(
                "reconnect.multiplier",
                format!("must be >= 1, got {multiplier}"),
            ));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(SettingsError::invalid(
                "reconnect.initialDelayMs",
                "must not exceed reconnect.maxDelayMs",
            ));
        }
        Ok(())
    }

    /// Default per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.requests.timeout_ms)
    }

    /// Deadline for the whole handshake.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.requests.handshake_timeout_ms)
    }

    /// Client identity block for `connect`.
    pub fn client_info(&self) -> ClientInfo {
        self.client.to_client_info()
    }
}

/// Identity presented to the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Client id.
    pub id: String,
    /// Version string; empty means this crate's version.
    pub version: String,
    /// Platform; empty means the compile-time OS.
    pub platform: String,
    /// Client mode.
    pub mode: String,
    /// Optional human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Requested role.
    pub role: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            id: constants::NAME.to_string(),
            version: String::new(),
            platform: String::new(),
            mode: "ui".to_string(),
            display_name: None,
            role: "operator".to_string(),
            scopes: vec!["operator.admin".to_string()],
        }
    }
}

impl ClientSettings {
    /// Build the wire identity, filling empty fields from the build.
    pub fn to_client_info(&self) -> ClientInfo {
        let version = if self.version.is_empty() {
            constants::VERSION.to_string()
        } else {
            self.version.clone()
        };
        let platform = if self.platform.is_empty() {
            std::env::consts::OS.to_string()
        } else {
            self.platform.clone()
        };
        ClientInfo {
            id: self.id.clone(),
            version,
            platform,
            mode: self.mode.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Request and handshake deadlines.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestSettings {
    /// Default request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Handshake timeout in milliseconds.
    pub handshake_timeout_ms: u64,
}

impl Default for RequestSettings {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            timeout_ms: constants::DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            handshake_timeout_ms: constants::DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Transport limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Largest accepted message and frame, in bytes.
    pub max_message_bytes: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_message_bytes: constants::DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Logging output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_serialize_camel_case() {
        let json = serde_json::to_value(GatelinkSettings::default()).unwrap();
        assert_eq!(json["requests"]["timeoutMs"], 30_000);
        assert_eq!(json["requests"]["handshakeTimeoutMs"], 10_000);
        assert_eq!(json["transport"]["maxMessageBytes"], 128 * 1024 * 1024);
        assert_eq!(json["reconnect"]["initialDelayMs"], 1000);
        assert_eq!(json["client"]["scopes"][0], "operator.admin");
    }

    #[test]
    fn partial_section_fills_defaults() {
        let settings: GatelinkSettings =
            serde_json::from_str(r#"{"requests": {"timeoutMs": 5000}}"#).unwrap();
        assert_eq!(settings.requests.timeout_ms, 5000);
        assert_eq!(settings.requests.handshake_timeout_ms, 10_000);
        assert_eq!(settings.gateway.port, 18789);
    }

    #[test]
    fn durations() {
        let settings = GatelinkSettings::default();
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.handshake_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn client_info_fills_build_values() {
        let info = GatelinkSettings::default().client_info();
        assert_eq!(info.id, "gatelink");
        assert_eq!(info.version, constants::VERSION);
        assert_eq!(info.platform, std::env::consts::OS);
        assert_eq!(info.mode, "ui");
    }

    #[test]
    fn client_info_keeps_explicit_values() {
        let client = ClientSettings {
            version: "9.9.9".into(),
            platform: "ios".into(),
            display_name: Some("Desk".into()),
            ..ClientSettings::default()
        };
        let info = client.to_client_info();
        assert_eq!(info.version, "9.9.9");
        assert_eq!(info.platform, "ios");
        assert_eq!(info.display_name.as_deref(), Some("Desk"));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut settings = GatelinkSettings::default();
        settings.requests.timeout_ms = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Validation { field: "requests.timeoutMs", .. })
        );
    }

    #[test]
    fn validate_rejects_shrinking_multiplier() {
        let mut settings = GatelinkSettings::default();
        settings.reconnect.multiplier = 0.5;
        let err = settings.validate().unwrap_err();
        assert_eq!(err.field(), Some("reconnect.multiplier"));
        assert!(err.to_string().contains("got 0.5"));
    }

    #[test]
    fn validate_rejects_initial_above_max() {
        let mut settings = GatelinkSettings::default();
        settings.reconnect.initial_delay_ms = 60_000;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Validation { field: "reconnect.initialDelayMs", .. })
        );
    }
}
