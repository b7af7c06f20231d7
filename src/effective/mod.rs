//! Effective Versions
//!
//! Each source publishes snapshots over time. A lookup at instant `t` uses
//! the snapshot with the greatest effective time not after `t`:
//!
//! ```text
//! effective:   t1 ──────── t2 ──────── t3 ────────▶
//! resolve(t):  none │  v1   │    v2     │    v3
//! ```

pub mod cache;
pub mod version;

pub use cache::EffectiveVersionCache;
pub use version::{EffectiveVersion, SourceIdentity, VersionEnumerator, VersionId};
