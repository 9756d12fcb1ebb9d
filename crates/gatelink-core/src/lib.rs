//! # gatelink-core
//!
//! Foundation types for the gatelink gateway client.
//!
//! This crate provides the vocabulary the client and CLI crates share:
//!
//! - **Wire frames**: [`protocol::Frame`] with request, response, and event variants
//! - **Codec**: [`protocol::codec`] encodes requests and classifies inbound messages
//! - **Handshake payloads**: `connect` params and the `hello-ok` result
//! - **Branded IDs**: [`ids::RequestId`] newtype for correlation ids
//! - **Errors**: [`errors::ClientError`] via `thiserror`
//! - **Backoff**: [`backoff::ReconnectPolicy`] and the mutable [`backoff::Backoff`] delay
//! - **Endpoints**: [`profile::ConnectionProfile`] resolved to a `ws://` / `wss://` URL
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod backoff;
pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod profile;
pub mod protocol;

pub use errors::{ClientError, Result};
