//! Utilities for testing against an in-memory cloud
//!
//! The fake honors the same external contracts as the production clients
//! (not-found and already-exists shapes, `MISSING` describe failures, tag
//! visibility) so the coordination layer can be exercised without a cloud
//! account. Everything is per-instance; nothing here is process-wide.

mod fake;
pub mod generators;
mod helpers;

pub use fake::{FakeCloud, MemoryDefinitionCache, MemorySecretCache};
