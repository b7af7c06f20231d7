// RefData - Rust Implementation
// Time-versioned reference data lookups for streaming enrichment

#![warn(rust_2018_idioms)]

pub mod bytebuffer;
pub mod config;
pub mod effective;
pub mod lookup;
pub mod store;
pub mod timecodec;

// Re-exports for convenience
pub use bytebuffer::{ByteBuffer, ByteBufferPool, PooledBuffer, PooledBufferPair, Termination};
pub use config::RefDataConfig;
pub use effective::{EffectiveVersion, EffectiveVersionCache, SourceIdentity, VersionEnumerator, VersionId};
pub use lookup::{LookupTrace, RefDataLookup};
pub use store::{KeyValueStore, Loader, MapPath, VersionedStoreCache};
pub use timecodec::{TimeCodec, TimeResolution};

/// RefData error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Usage error: {0}")]
        Usage(String),

        #[error("Out of range: {0}")]
        OutOfRange(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Loader error: {0}")]
        Loader(String),

        #[error("Version enumeration error: {0}")]
        VersionEnumeration(String),

        #[error("Timed out: {0}")]
        Timeout(String),

        #[error("Terminated: {0}")]
        Terminated(String),

        #[error("Internal error: {0}")]
        Internal(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
