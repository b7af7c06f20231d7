//! Capacity tier management for the byte buffer pool

use super::buffer::ByteBuffer;
use std::collections::VecDeque;

/// If no count is configured for a tier below the smallest configured tier
pub const DEFAULT_MAX_BUFFERS_PER_TIER: u32 = 50;

/// A buffer sitting idle in a tier, stamped with its insertion sequence
#[derive(Debug)]
pub struct PoolSlot {
    pub sequence: u64,
    pub buffer: ByteBuffer,
}

/// The buffers of one capacity held by the pool.
///
/// Idle buffers are kept in insertion order and handed out oldest first so
/// every buffer in the tier gets reused rather than the same one thrashing.
#[derive(Debug)]
pub struct Tier {
    /// Capacity of every buffer in this tier (bytes)
    pub capacity: usize,
    /// Index of this tier, i.e. log10 of the capacity
    pub index: usize,
    /// Most buffers this tier will keep track of
    pub max_count: u32,
    /// Created-count at which a warning is logged
    pub warning_threshold: Option<u32>,
    free: VecDeque<PoolSlot>,
    /// Buffers created under pool control, idle or on loan
    created: u32,
}

impl Tier {
    pub fn new(index: usize, capacity: usize, max_count: u32, warning_percentage: u32) -> Self {
        let warning_threshold = if max_count > 1 {
            Some(((max_count as f64) * (warning_percentage as f64 / 100.0)).ceil() as u32)
        } else {
            None
        };
        Self {
            capacity,
            index,
            max_count,
            warning_threshold,
            free: VecDeque::new(),
            created: 0,
        }
    }

    /// Tiers configured with a zero count never hold buffers
    pub fn is_pooled(&self) -> bool {
        self.max_count > 0
    }

    /// Take the oldest idle buffer
    pub fn take(&mut self) -> Option<PoolSlot> {
        self.free.pop_front()
    }

    /// Reserve room for a new pooled buffer if the tier is below its limit.
    ///
    /// Returns the new created-count on success.
    pub fn reserve_new(&mut self) -> Option<u32> {
        if self.created < self.max_count {
            self.created += 1;
            Some(self.created)
        } else {
            None
        }
    }

    /// Return a buffer to the tier. Hands the buffer back if the tier is full.
    pub fn put(&mut self, slot: PoolSlot) -> Result<(), PoolSlot> {
        if self.free.len() >= self.max_count as usize {
            return Err(slot);
        }
        // Buffers created past the limit are adopted while there is room
        if self.created < self.free.len() as u32 + 1 {
            self.created = self.free.len() as u32 + 1;
        }
        self.free.push_back(slot);
        Ok(())
    }

    /// Drop every idle buffer, returning how many were dropped
    pub fn drain(&mut self) -> usize {
        let drained = self.free.len();
        self.free.clear();
        self.created = self.created.saturating_sub(drained as u32);
        drained
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn created(&self) -> u32 {
        self.created
    }

    /// Sequence of the oldest idle buffer
    pub fn oldest_sequence(&self) -> Option<u64> {
        self.free.front().map(|slot| slot.sequence)
    }
}

/// Tier index for a requested capacity, i.e. ceil(log10(capacity))
pub fn tier_index(min_capacity: usize) -> usize {
    if min_capacity <= 1 {
        return 0;
    }
    let mut index = 0;
    let mut capacity = 1usize;
    while capacity < min_capacity {
        capacity = capacity.saturating_mul(10);
        index += 1;
    }
    index
}

/// Capacity of the tier at `index`
pub fn tier_capacity(index: usize) -> usize {
    10usize.pow(index as u32)
}
