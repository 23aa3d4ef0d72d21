//! Read-only filesystem access.
//!
//! ```
//! use trogon_std::fs::{ReadFile, SystemFs};
//! use std::path::Path;
//!
//! fn load_secret<F: ReadFile>(fs: &F, path: &Path) -> Option<Vec<u8>> {
//!     fs.read(path).ok()
//! }
//!
//! let secret = load_secret(&SystemFs, Path::new("/run/secrets/ARBITER_TOKEN"));
//! ```

mod mem;
mod system;

use std::io;
use std::path::Path;

#[cfg(any(test, feature = "test-support"))]
pub use mem::MemFs;
pub use system::SystemFs;

pub trait ReadFile {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
