//! Package-level constants.

use std::time::Duration;

/// Current version of the client (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "gatelink";

/// The single gateway protocol version this client speaks.
pub const PROTOCOL_VERSION: u32 = 3;

/// Event the gateway sends first on every new socket.
pub const CHALLENGE_EVENT: &str = "connect.challenge";

/// Method used to complete the handshake.
pub const CONNECT_METHOD: &str = "connect";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on the whole challenge/connect/hello exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default max inbound message size. Chat history payloads routinely exceed
/// the 1 MB limits of stock transports.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 128 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn name_is_lowercase() {
        assert_eq!(NAME, NAME.to_lowercase());
    }

    #[test]
    fn max_message_size_above_one_megabyte() {
        assert!(DEFAULT_MAX_MESSAGE_BYTES > 1024 * 1024);
    }

    #[test]
    fn handshake_bounded_by_request_timeout() {
        assert!(DEFAULT_HANDSHAKE_TIMEOUT <= DEFAULT_REQUEST_TIMEOUT);
    }
}
