//! # trogon-kv
//!
//! Client for a binary key-value store that sits behind an authorization
//! arbiter and is reached over NATS.
//!
//! - Every read, write and listing is authorized with a token scoped to the
//!   exact resource path and method. Tokens are cached per route and dropped
//!   as soon as the store rejects one.
//! - Observations run a relay task that turns the store's raw update frames
//!   into [`UpdateEvent`]s on a backpressured channel.
//!
//! ## Example
//!
//! ```rust,no_run
//! use trogon_kv::{KeyValueClient, StoreConfig};
//! use trogon_std::{SystemEnv, SystemFs};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig::from_env(&SystemEnv, &SystemFs)?;
//!     let kv = KeyValueClient::connect(&config).await?;
//!
//!     kv.write("sensor-1", "temp", "21.5").await?;
//!     let mut updates = kv.observe_key("sensor-1", "temp").await?;
//!     while let Some(event) = updates.next().await {
//!         println!("{:?}", event?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod arbiter;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod hrefs;
pub mod kv;
pub mod nats;
pub mod observe;
pub mod route;
pub mod token;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use arbiter::{ArbiterClient, TokenIssuer};
pub use cache::TokenCache;
pub use catalog::DataSourceMetadata;
pub use config::{ConfigError, StoreConfig};
pub use error::{AuthError, DecodeError, ErrorKind, ExecuteError, KvError, SetupError};
pub use executor::{Executor, RetryPolicy, StoreRequest};
pub use kv::KeyValueClient;
pub use nats::NatsStore;
pub use observe::{Subscription, UpdateEvent};
pub use route::{Method, RouteKey};
pub use token::Token;
pub use transport::{ContentFormat, TransportError};
