//! Environment variable access.
//!
//! ```
//! use trogon_std::env::{ReadEnv, SystemEnv};
//!
//! fn store_endpoint<E: ReadEnv>(env: &E) -> String {
//!     env.var("KV_STORE_ENDPOINT")
//!         .unwrap_or_else(|_| "nats://localhost:4222".to_string())
//! }
//!
//! let endpoint = store_endpoint(&SystemEnv);
//! ```

mod in_memory;
mod system;

use std::env::VarError;

#[cfg(any(test, feature = "test-support"))]
pub use in_memory::InMemoryEnv;
pub use system::SystemEnv;

/// Does **not** require `Send + Sync`; add the bounds at the call site when
/// the reader crosses task boundaries.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, VarError>;

    /// Like [`ReadEnv::var`], but treats a blank value as unset.
    fn non_empty_var(&self, key: &str) -> Option<String> {
        self.var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}
