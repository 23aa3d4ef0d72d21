//! Zero-cost abstractions over `std` for TrogonStack projects.
//!
//! | Concern | Trait | Production | Test |
//! |---------|-------|------------|------|
//! | Env vars | [`ReadEnv`] | [`SystemEnv`] | [`InMemoryEnv`]* |
//! | Filesystem | [`ReadFile`] | [`SystemFs`] | [`MemFs`]* |
//!
//! *Available with `#[cfg(test)]` or the `"test-support"` feature.
//!
//! Production types are zero-sized. The in-memory doubles are backed by a
//! `Mutex`, so they are `Send + Sync` and can be moved into multi-threaded
//! `#[tokio::test]` bodies.

pub mod env;
pub mod fs;

pub use env::{ReadEnv, SystemEnv};
pub use fs::{ReadFile, SystemFs};

#[cfg(any(test, feature = "test-support"))]
pub use env::InMemoryEnv;
#[cfg(any(test, feature = "test-support"))]
pub use fs::MemFs;
