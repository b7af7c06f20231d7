//! Byte Buffer Pool
//!
//! Scratch memory for building binary keys and values on the lookup hot path,
//! reused instead of allocated per call.
//!
//! # Architecture
//!
//! ```text
//! ByteBufferPool
//!   ├─→ Tier(1B)      → Free: [seq 3, seq 7]      max 50
//!   ├─→ Tier(10B)     → Free: [seq 1, seq 4]      max 50
//!   ├─→ Tier(100B)    → Free: []                  max 10
//!   └─→ Tier(1000B)   → (count 0, never pooled)
//!
//! acquire(50)  → Tier(100B) → oldest free buffer, else new, else next tier up,
//!                             else grow past the limit / block
//! release(buf) → zero → back of the tier's free list (or dropped if full)
//! ```
//!
//! A [`PooledBuffer`] owns its buffer exclusively until it is released or
//! dropped.

pub mod buffer;
pub mod pool;
pub mod pooled;
pub mod termination;
pub mod tier;

pub use buffer::ByteBuffer;
pub use pool::{ByteBufferPool, PoolStats, TierStats};
pub use pooled::{PooledBuffer, PooledBufferPair};
pub use termination::Termination;
pub use tier::{PoolSlot, Tier};
