//! Gateway endpoint profile.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::ClientError;
use crate::protocol::handshake::ConnectAuth;

/// Default gateway port.
pub const DEFAULT_GATEWAY_PORT: u16 = 18789;

/// Where and how to reach a gateway. Immutable for one connection attempt.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// URL path (with or without a leading `/`, may be empty).
    #[serde(default)]
    pub path: String,
    /// Use `wss://`.
    #[serde(default)]
    pub tls: bool,
    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,
    /// Shared password, used only when no token is set.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_GATEWAY_PORT,
            path: String::new(),
            tls: false,
            token: None,
            password: None,
        }
    }
}

impl ConnectionProfile {
    /// Profile for a plain `ws://host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Resolve to `ws://host:port/path` or `wss://host:port/path`.
    pub fn url(&self) -> Result<Url, ClientError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ClientError::InvalidEndpoint("host is empty".into()));
        }
        if host.contains(['/', '?', '#', '@']) || host.chars().any(char::is_whitespace) {
            return Err(ClientError::InvalidEndpoint(format!(
                "host '{host}' is not a bare host name"
            )));
        }
        if self.port == 0 {
            return Err(ClientError::InvalidEndpoint("port must be non-zero".into()));
        }

        let scheme = if self.tls { "wss" } else { "ws" };
        // Bare IPv6 literals need brackets inside a URL authority.
        let authority_host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_owned()
        };
        let path = normalize_path(&self.path);

        let raw = format!("{scheme}://{authority_host}:{}{path}", self.port);
        Url::parse(&raw).map_err(|e| ClientError::InvalidEndpoint(format!("{raw}: {e}")))
    }

    /// Credentials to present in `connect`.
    pub fn auth(&self) -> Option<ConnectAuth> {
        ConnectAuth::from_credentials(self.token.as_deref(), self.password.as_deref())
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        String::new()
    } else if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("tls", &self.tls)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
