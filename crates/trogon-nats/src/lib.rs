//! # trogon-nats
//!
//! Shared NATS infrastructure for TrogonStack applications.
//!
//! This crate provides:
//! - Per-operation NATS client traits for testability (zero-cost via monomorphization)
//! - Connection management with automatic reconnection and optional TLS trust roots
//! - Request helpers with a caller-chosen timeout
//! - OpenTelemetry trace context propagation
//! - A scriptable mock client for testing (with `test-support` feature)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use trogon_nats::{NatsConfig, connect};
//! use trogon_std::env::SystemEnv;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = NatsConfig::from_env(&SystemEnv);
//!     let client = connect(&config, Duration::from_secs(10))
//!         .await
//!         .expect("Failed to connect");
//! }
//! ```
//!
//! ## Zero-Cost Abstraction
//!
//! ```rust,no_run
//! use trogon_nats::{RequestClient, SubscribeClient};
//!
//! // Depend only on the operations you need
//! pub struct MyService<N: RequestClient + SubscribeClient> {
//!     nats: N,
//! }
//! ```

pub mod auth;
pub mod client;
pub mod connect;
pub mod messaging;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use auth::{NatsAuth, NatsConfig};
pub use client::{RequestClient, SubscribeClient};
pub use connect::{ConnectError, connect};
pub use messaging::{NatsError, headers_with_trace_context, inject_trace_context, request_with_timeout};

#[cfg(any(test, feature = "test-support"))]
pub use mocks::{MockError, MockNatsClient, RecordedRequest};
