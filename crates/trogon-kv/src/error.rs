//! Error taxonomy for key-value operations.

use crate::hrefs::HrefError;
use crate::route::RouteKey;
use crate::transport::TransportError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KvError>;

/// Coarse classification of every public error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The arbiter refused or could not be reached.
    Authorization,
    /// The store rejected a cached token; the entry was dropped.
    StaleCredential,
    Transport,
    Decode,
    InvalidInput,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("arbiter refused token ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("arbiter request failed: {0}")]
    Request(String),

    #[error("invalid arbiter client configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("key list is not a JSON array of strings: {0}")]
    KeyList(String),

    #[error("malformed update frame: {0}")]
    Frame(String),
}

/// Failure of one authorized store request.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("authorization for {route} failed: {source}")]
    Authorization {
        route: RouteKey,
        #[source]
        source: AuthError,
    },

    #[error("token for {route} was rejected: {source}")]
    StaleCredential {
        route: RouteKey,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ExecuteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::StaleCredential { .. } => ErrorKind::StaleCredential,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("error writing data: {0}")]
    Write(#[source] ExecuteError),

    #[error("error reading data: {0}")]
    Read(#[source] ExecuteError),

    #[error("error listing keys: {0}")]
    ListKeys(#[source] ExecuteError),

    #[error("error observing: {0}")]
    Observe(#[source] ExecuteError),

    #[error("error registering datasource: {0}")]
    Register(#[source] ExecuteError),

    #[error("error decoding data: {0}")]
    Decode(#[from] DecodeError),

    #[error("missing required metadata: {0}")]
    InvalidMetadata(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store not ready after {attempts} attempts: {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

/// Failure while building a connected client.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("arbiter client: {0}")]
    Arbiter(#[from] AuthError),

    #[error(transparent)]
    Nats(#[from] trogon_nats::ConnectError),

    #[error("store endpoint: {0}")]
    Endpoint(#[from] HrefError),
}

impl KvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Write(e)
            | Self::Read(e)
            | Self::ListKeys(e)
            | Self::Observe(e)
            | Self::Register(e) => e.kind(),
            Self::Decode(_) => ErrorKind::Decode,
            Self::InvalidMetadata(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::StoreUnavailable { .. } => ErrorKind::Transport,
        }
    }
}
