//! Store transport boundary.
//!
//! One trait per store operation so callers depend only on what they use.
//! [`crate::nats::NatsStore`] is the production implementation;
//! [`crate::mocks::MockStore`] backs the tests.

use crate::token::Token;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::future::Future;

/// Raw observe frames in arrival order. Ends when the subscription does.
pub type RawFeed = BoxStream<'static, Bytes>;

/// Encoding the store should apply to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Binary,
    Json,
    Text,
}

impl ContentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "BINARY",
            Self::Json => "JSON",
            Self::Text => "TEXT",
        }
    }
}

impl std::fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The store refused the presented token (status 401 or 403).
    Unauthorized { status: u16, message: String },
    /// The store answered with any other non-success status.
    Status { status: u16, message: String },
    /// No reply within the configured request timeout.
    Timeout { path: String },
    /// The request could not be delivered or the reply never came back.
    Request(String),
    /// A reply arrived but did not follow the store protocol.
    Protocol(String),
    /// Opening the observe delivery subscription failed.
    Subscribe(String),
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized { status, message } => {
                write!(f, "store rejected credential ({status}): {message}")
            }
            Self::Status { status, message } => write!(f, "store error ({status}): {message}"),
            Self::Timeout { path } => write!(f, "request for '{path}' timed out"),
            Self::Request(msg) => write!(f, "request failed: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Subscribe(msg) => write!(f, "subscribe failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub trait ReadStore: Send + Sync + Clone + 'static {
    fn get(
        &self,
        token: &Token,
        path: &str,
        format: ContentFormat,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

pub trait WriteStore: Send + Sync + Clone + 'static {
    fn post(
        &self,
        token: &Token,
        path: &str,
        payload: Bytes,
        format: ContentFormat,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

pub trait ObserveStore: Send + Sync + Clone + 'static {
    fn observe(
        &self,
        token: &Token,
        path: &str,
        format: ContentFormat,
    ) -> impl Future<Output = Result<RawFeed, TransportError>> + Send;
}

/// Unauthenticated readiness probe against the store's `/status` path.
pub trait ProbeStore: Send + Sync + Clone + 'static {
    fn status(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
