//! # gatelink-client
//!
//! Client for a gateway that speaks JSON frames over WebSocket.
//!
//! - [`GatewayClient`]: cloneable handle; connect, send requests, read events
//! - [`handshake`]: `connect.challenge` → `connect` → `hello-ok`
//! - [`state`]: `disconnected` / `connecting` / `connected` / `reconnecting`
//! - [`events::EventStream`]: ordered stream of gateway events
//! - [`transport`]: WebSocket and in-process transports behind one trait
//! - [`api`]: typed wrappers for common gateway methods
//!
//! All connection state lives on a single driver task; handles talk to it
//! over a channel. Requests resolve exactly once: with their response, a
//! timeout, a cancellation, or [`ClientError::Cancelled`] when the link
//! drops. Links lost after a completed handshake are re-established with
//! exponential backoff until [`GatewayClient::disconnect`] is called.
//!
//! ```no_run
//! # async fn demo() -> gatelink_core::Result<()> {
//! use gatelink_client::GatewayClient;
//! use gatelink_settings::get_settings;
//!
//! let client = GatewayClient::new(get_settings());
//! let hello = client.connect().await?;
//! println!("connected as {}", hello.conn_id());
//! let health = client.health().await?;
//! println!("{health}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod api;
pub mod client;
mod correlator;
mod driver;
pub mod events;
pub mod handshake;
pub mod state;
mod supervisor;
pub mod transport;

pub use client::GatewayClient;
pub use events::EventStream;
pub use gatelink_core::errors::{ClientError, Result};
pub use state::{ConnectionState, StateChange, StateObserver};
pub use tokio_util::sync::CancellationToken;
pub use transport::{Connector, MemoryConnector, TransportOptions, WsConnector, memory_gateway};
