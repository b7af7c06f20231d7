//! Versioned Stores
//!
//! The key/value maps of each snapshot version, loaded through a [`Loader`]
//! on first use and kept in a bounded LRU cache.
//!
//! ```text
//! get(v7, "A/B", k)
//!   └─→ store(v7)  ── cached? ── yes ─→ KeyValueStore
//!                      └── no ─→ per-version lock ─→ Loader::load(v7)
//!   └─→ A[k] = m ─→ B[m] = value
//! ```

pub mod cache;
pub mod kv;
pub mod path;

pub use cache::{Loader, StoreCacheStats, VersionedStoreCache};
pub use kv::KeyValueStore;
pub use path::MapPath;
