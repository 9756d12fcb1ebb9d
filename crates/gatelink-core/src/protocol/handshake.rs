//! Handshake payloads.
//!
//! The gateway opens with a `connect.challenge` event, the client answers
//! with a `connect` request carrying [`ConnectParams`], and the gateway
//! replies with a [`HelloOk`] payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::PROTOCOL_VERSION;

/// Payload of the `connect.challenge` event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// Server nonce.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Server timestamp (ms since epoch).
    #[serde(default)]
    pub ts: Option<u64>,
}

/// Identity the client presents in `connect`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client id (e.g. `gatelink`).
    pub id: String,
    /// Client version.
    pub version: String,
    /// Platform (`linux`, `macos`, …).
    pub platform: String,
    /// Client mode (`ui`, `cli`, …).
    pub mode: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Credentials for `connect`. Exactly one kind is ever sent.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectAuth {
    /// Bearer token.
    Token {
        /// The token.
        token: String,
    },
    /// Shared password.
    Password {
        /// The password.
        password: String,
    },
}

impl ConnectAuth {
    /// Pick credentials, preferring a token over a password.
    ///
    /// Empty strings count as absent.
    pub fn from_credentials(token: Option<&str>, password: Option<&str>) -> Option<Self> {
        let token = token.filter(|t| !t.trim().is_empty());
        let password = password.filter(|p| !p.is_empty());
        match (token, password) {
            (Some(token), _) => Some(Self::Token {
                token: token.to_owned(),
            }),
            (None, Some(password)) => Some(Self::Password {
                password: password.to_owned(),
            }),
            (None, None) => None,
        }
    }
}

impl std::fmt::Debug for ConnectAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { .. } => f.write_str("ConnectAuth::Token(<redacted>)"),
            Self::Password { .. } => f.write_str("ConnectAuth::Password(<redacted>)"),
        }
    }
}

/// Params of the `connect` request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest protocol version accepted.
    pub min_protocol: u32,
    /// Highest protocol version accepted.
    pub max_protocol: u32,
    /// Client identity.
    pub client: ClientInfo,
    /// Requested role (e.g. `operator`).
    pub role: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Credentials, `null` when none are configured.
    pub auth: Option<ConnectAuth>,
}

impl ConnectParams {
    /// Params pinned to the single supported protocol version.
    pub fn new(
        client: ClientInfo,
        role: impl Into<String>,
        scopes: Vec<String>,
        auth: Option<ConnectAuth>,
    ) -> Self {
        Self {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client,
            role: role.into(),
            scopes,
            auth,
        }
    }
}

/// Server identity from `hello-ok`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Connection id assigned by the gateway.
    pub conn_id: String,
    /// Gateway version.
    #[serde(default)]
    pub version: Option<String>,
    /// Gateway host name.
    #[serde(default)]
    pub host: Option<String>,
    /// Anything else the gateway reports.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Limits the gateway advertises in `hello-ok`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPolicy {
    /// Largest frame the gateway accepts.
    #[serde(default)]
    pub max_payload: Option<u64>,
    /// Interval of `tick` keepalive events.
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
}

/// Successful handshake result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    /// Negotiated protocol version.
    #[serde(alias = "protocol")]
    pub protocol_version: u32,
    /// Server identity.
    pub server: ServerInfo,
    /// Feature flags (methods/events the gateway supports).
    #[serde(default)]
    pub features: Option<Value>,
    /// Initial state snapshot (presence, health, …).
    #[serde(default)]
    pub snapshot: Option<Value>,
    /// Advertised limits.
    #[serde(default)]
    pub policy: Option<HelloPolicy>,
}

impl HelloOk {
    /// Gateway connection id.
    pub fn conn_id(&self) -> &str {
        &self.server.conn_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ClientInfo {
        ClientInfo {
            id: "gatelink".into(),
            version: "0.1.0".into(),
            platform: "linux".into(),
            mode: "ui".into(),
            display_name: None,
        }
    }

    #[test]
    fn connect_params_pin_protocol() {
        let params = ConnectParams::new(client(), "operator", vec!["operator.admin".into()], None);
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["minProtocol"], PROTOCOL_VERSION);
        assert_eq!(value["maxProtocol"], PROTOCOL_VERSION);
        assert_eq!(value["role"], "operator");
        assert_eq!(value["client"]["platform"], "linux");
        assert!(value["auth"].is_null());
    }

    #[test]
    fn token_preferred_over_password() {
        let auth = ConnectAuth::from_credentials(Some("tok"), Some("pw")).unwrap();
        assert_eq!(serde_json::to_value(&auth).unwrap(), json!({"token": "tok"}));
    }

    #[test]
    fn password_when_no_token() {
        let auth = ConnectAuth::from_credentials(None, Some("pw")).unwrap();
        assert_eq!(serde_json::to_value(&auth).unwrap(), json!({"password": "pw"}));
    }

    #[test]
    fn blank_credentials_are_absent() {
        assert!(ConnectAuth::from_credentials(Some("  "), Some("")).is_none());
        assert!(ConnectAuth::from_credentials(None, None).is_none());
    }

    #[test]
    fn auth_debug_is_redacted() {
        let auth = ConnectAuth::from_credentials(Some("secret-token"), None).unwrap();
        assert!(!format!("{auth:?}").contains("secret-token"));
    }

    #[test]
    fn hello_accepts_protocol_alias_and_extra_server_fields() {
        let hello: HelloOk = serde_json::from_value(json!({
            "type": "hello-ok",
            "protocol": 3,
            "server": {"connId": "c-1", "version": "2026.1", "pid": 42},
            "features": {"methods": ["chat.send"]},
            "policy": {"maxPayload": 1048576, "tickIntervalMs": 15000}
        }))
        .unwrap();
        assert_eq!(hello.protocol_version, 3);
        assert_eq!(hello.conn_id(), "c-1");
        assert_eq!(hello.server.extra["pid"], 42);
        assert_eq!(hello.policy.unwrap().tick_interval_ms, Some(15_000));
        assert!(hello.snapshot.is_none());
    }

    #[test]
    fn hello_requires_server() {
        let result = serde_json::from_value::<HelloOk>(json!({"protocolVersion": 3}));
        assert!(result.is_err());
    }

    #[test]
    fn challenge_tolerates_missing_fields() {
        let challenge: ChallengePayload = serde_json::from_value(json!({})).unwrap();
        assert!(challenge.nonce.is_none());
    }
}
