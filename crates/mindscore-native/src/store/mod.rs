//! Model storage
//!
//! - [`checksum`]: checksummed artifact files
//! - [`cache`]: in-memory cache of loaded models
//! - [`registry`]: which artifact is the latest for an identity
//! - [`error`]: storage errors

pub mod cache;
pub mod checksum;
pub mod error;
pub mod registry;

pub use cache::{CacheEntry, ModelCache};
pub use checksum::{checksum_bytes, checksum_file, ChecksumSystem};
pub use error::{StoreError, StoreResult};
pub use registry::{MemoryModelRegistry, ModelRegistry, RegisteredModel, SqliteModelRegistry};
