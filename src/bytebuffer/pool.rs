//! Bounded, self-populating pool of direct byte buffers

use super::buffer::ByteBuffer;
use super::pooled::{PooledBuffer, PooledBufferPair};
use super::termination::Termination;
use super::tier::{tier_capacity, tier_index, PoolSlot, Tier, DEFAULT_MAX_BUFFERS_PER_TIER};
use crate::config::ByteBufferPoolConfig;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Pool of direct buffers in power-of-ten capacities.
///
/// A request for `min_capacity` bytes is served from the tier whose capacity
/// is the next power of ten at or above it, e.g. a request for 50 bytes gets a
/// 100 byte buffer. Requests larger than the largest tier, or for a tier
/// configured with a zero count, get an un-pooled buffer of exactly the
/// requested size that is dropped on release.
///
/// Each tier has its own lock so threads only contend with others wanting the
/// same capacity. Released buffers are zeroed (unless disabled) before they go
/// back on their tier's free list.
#[derive(Clone)]
pub struct ByteBufferPool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    tiers: Vec<TierCell>,
    configured_counts: BTreeMap<u32, u32>,
    sequence: AtomicU64,
    block_on_exhausted: bool,
    poll_interval: Duration,
    block_timeout: Duration,
    zero_on_release: bool,
    warning_percentage: u32,
}

struct TierCell {
    state: Mutex<Tier>,
    released: Condvar,
    pooled: bool,
}

impl ByteBufferPool {
    /// Create a pool from its configuration
    pub fn new(config: ByteBufferPoolConfig) -> Result<Self> {
        config.validate()?;
        let configured_counts = config.tier_counts()?;

        let tier_count = configured_counts
            .keys()
            .next_back()
            .map(|max_capacity| tier_index(*max_capacity as usize) + 1)
            .unwrap_or(0);

        let mut tiers = Vec::with_capacity(tier_count);
        let mut derived = Vec::with_capacity(tier_count);
        for index in 0..tier_count {
            let capacity = tier_capacity(index);
            // Gaps inherit the nearest lower configured count
            let max_count = configured_counts
                .range(..=capacity as u32)
                .next_back()
                .map(|(_, count)| *count)
                .unwrap_or(DEFAULT_MAX_BUFFERS_PER_TIER);

            derived.push(format!("{}={}", capacity, max_count));
            let tier = Tier::new(index, capacity, max_count, config.warning_threshold_percentage);
            tiers.push(TierCell {
                pooled: tier.is_pooled(),
                state: Mutex::new(tier),
                released: Condvar::new(),
            });
        }

        info!(
            configured = ?configured_counts,
            derived = %derived.join(","),
            block_on_exhausted = config.block_on_exhausted_pool,
            "Initialising byte buffer pool"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                tiers,
                configured_counts,
                sequence: AtomicU64::new(0),
                block_on_exhausted: config.block_on_exhausted_pool,
                poll_interval: config.block_poll_interval(),
                block_timeout: config.block_timeout(),
                zero_on_release: config.zero_on_release,
                warning_percentage: config.warning_threshold_percentage,
            }),
        })
    }

    /// Pool with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(ByteBufferPoolConfig::default())
    }

    /// Borrow a buffer with at least `min_capacity` bytes
    pub fn acquire(&self, min_capacity: usize) -> Result<PooledBuffer> {
        self.acquire_with(min_capacity, &Termination::new())
    }

    /// Borrow a buffer, giving up if `termination` fires while waiting on an
    /// exhausted pool
    pub fn acquire_with(
        &self,
        min_capacity: usize,
        termination: &Termination,
    ) -> Result<PooledBuffer> {
        let buffer = self.inner.take_buffer(min_capacity, termination)?;
        Ok(PooledBuffer::new(buffer, Arc::clone(&self.inner)))
    }

    /// Borrow a key buffer and a value buffer together
    pub fn acquire_pair(
        &self,
        min_key_capacity: usize,
        min_value_capacity: usize,
    ) -> Result<PooledBufferPair> {
        let key = self.acquire(min_key_capacity)?;
        let value = self.acquire(min_value_capacity)?;
        Ok(PooledBufferPair::new(key, value))
    }

    /// Borrow one buffer per requested size
    pub fn acquire_many(&self, min_capacities: &[usize]) -> Result<Vec<PooledBuffer>> {
        min_capacities
            .iter()
            .map(|min_capacity| self.acquire(*min_capacity))
            .collect()
    }

    /// Return a buffer that was taken out of its handle.
    ///
    /// Only direct buffers may be returned; anything else is a caller bug.
    pub fn release(&self, buffer: ByteBuffer) -> Result<()> {
        self.inner.release(buffer)
    }

    /// Run `work` with a borrowed buffer, returning it afterwards whatever the outcome
    pub fn with_buffer<T, F>(&self, min_capacity: usize, work: F) -> Result<T>
    where
        F: FnOnce(&mut ByteBuffer) -> Result<T>,
    {
        let mut pooled = self.acquire(min_capacity)?;
        let result = work(pooled.buffer_mut()?);
        pooled.release()?;
        result
    }

    /// Run `work` with a borrowed key buffer and value buffer
    pub fn with_buffer_pair<T, F>(
        &self,
        min_key_capacity: usize,
        min_value_capacity: usize,
        work: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut ByteBuffer, &mut ByteBuffer) -> Result<T>,
    {
        let mut pair = self.acquire_pair(min_key_capacity, min_value_capacity)?;
        let result = {
            let (key, value) = pair.buffers_mut()?;
            work(key, value)
        };
        pair.release()?;
        result
    }

    /// Number of idle buffers across all tiers
    pub fn current_pool_size(&self) -> usize {
        self.inner
            .tiers
            .iter()
            .map(|cell| cell.state.lock().available())
            .sum()
    }

    /// Idle buffers in the tier serving `min_capacity`
    pub fn available_count(&self, min_capacity: usize) -> usize {
        self.inner
            .tier_for(min_capacity)
            .map(|cell| cell.state.lock().available())
            .unwrap_or(0)
    }

    /// Buffers known to the tier serving `min_capacity`, idle or on loan
    pub fn pooled_count(&self, min_capacity: usize) -> u32 {
        self.inner
            .tier_for(min_capacity)
            .map(|cell| cell.state.lock().created())
            .unwrap_or(0)
    }

    /// Drop every idle buffer. Buffers on loan are unaffected.
    pub fn clear(&self) {
        let mut cleared = Vec::new();
        for cell in &self.inner.tiers {
            let mut tier = cell.state.lock();
            let drained = tier.drain();
            cleared.push(format!("{}:{}", tier.capacity, drained));
        }
        info!(
            "Cleared the following buffers from the pool (buffer size:number cleared) - {}",
            cleared.join(", ")
        );
    }

    /// Read-only snapshot of the pool for health reporting
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            tiers: Vec::with_capacity(self.inner.tiers.len()),
            total_available: 0,
            total_bytes: 0,
            warning_threshold_percentage: self.inner.warning_percentage,
            block_on_exhausted: self.inner.block_on_exhausted,
        };

        for cell in &self.inner.tiers {
            let tier = cell.state.lock();
            let available = tier.available();
            let created = tier.created();
            let total_bytes = created as u64 * tier.capacity as u64;
            stats.tiers.push(TierStats {
                capacity: tier.capacity,
                configured_max: tier.max_count,
                explicitly_configured: self
                    .inner
                    .configured_counts
                    .contains_key(&(tier.capacity as u32)),
                available,
                created,
                on_loan: (created as usize).saturating_sub(available),
                oldest_sequence: tier.oldest_sequence(),
                total_bytes,
            });
            stats.total_available += available;
            stats.total_bytes += total_bytes;
        }

        stats
    }
}

impl std::fmt::Debug for ByteBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBufferPool")
            .field("tiers", &self.inner.tiers.len())
            .field("block_on_exhausted", &self.inner.block_on_exhausted)
            .finish()
    }
}

impl PoolInner {
    fn tier_for(&self, min_capacity: usize) -> Option<&TierCell> {
        self.tiers.get(tier_index(min_capacity))
    }

    fn take_buffer(&self, min_capacity: usize, termination: &Termination) -> Result<ByteBuffer> {
        let index = tier_index(min_capacity);
        let cell = match self.tiers.get(index) {
            Some(cell) if cell.pooled => cell,
            _ => return Ok(Self::unpooled(min_capacity)),
        };

        if let Some(buffer) = self.take_or_create(cell)? {
            return Ok(buffer);
        }

        // Nothing at that size so try one size up. Going further risks a huge
        // buffer serving a tiny request.
        if let Some(next) = self.tiers.get(index + 1).filter(|next| next.pooled) {
            let mut tier = next.state.lock();
            if let Some(slot) = tier.take() {
                debug!(
                    requested = min_capacity,
                    capacity = tier.capacity,
                    "Serving request from the next tier up"
                );
                return Ok(slot.buffer);
            }
        }

        if self.block_on_exhausted {
            self.wait_for_buffer(cell, termination)
        } else {
            let capacity = tier_capacity(index);
            debug!(capacity, "Creating new buffer beyond the pool limit");
            Ok(ByteBuffer::allocate_direct(capacity))
        }
    }

    /// Idle buffer from the tier, or a freshly created one if the tier is
    /// below its limit. `Ok(None)` when the tier is exhausted.
    fn take_or_create(&self, cell: &TierCell) -> Result<Option<ByteBuffer>> {
        let mut tier = cell.state.lock();
        if let Some(slot) = tier.take() {
            trace!(
                capacity = tier.capacity,
                sequence = slot.sequence,
                available = tier.available(),
                "Got buffer from the pool"
            );
            return Ok(Some(slot.buffer));
        }
        match tier.reserve_new() {
            Some(created) => {
                let capacity = tier.capacity;
                let max_count = tier.max_count;
                let warning_threshold = tier.warning_threshold;
                drop(tier);

                if Some(created) == warning_threshold {
                    warn!(
                        "Hit {}% ({}) of the limit of {} for pooled buffers of size {}.",
                        self.warning_percentage, created, max_count, capacity
                    );
                } else if created == max_count {
                    warn!(
                        "Hit limit of {} for pooled buffers of size {}. Further requests will \
                         create buffers that are dropped rather than returned to the pool.",
                        created, capacity
                    );
                }
                debug!(capacity, created, "Creating new pooled buffer");
                Ok(Some(ByteBuffer::allocate_direct(capacity)))
            }
            None => Ok(None),
        }
    }

    fn unpooled(min_capacity: usize) -> ByteBuffer {
        debug!(capacity = min_capacity, "Using un-pooled buffer");
        ByteBuffer::allocate_direct(min_capacity)
    }

    fn wait_for_buffer(&self, cell: &TierCell, termination: &Termination) -> Result<ByteBuffer> {
        let deadline = Instant::now() + self.block_timeout;
        let mut tier = cell.state.lock();
        debug!(capacity = tier.capacity, "Pool exhausted, waiting for a buffer");

        loop {
            if termination.is_terminated() {
                return Err(Error::Terminated(format!(
                    "Task terminated while waiting for a buffer of capacity {}",
                    tier.capacity
                )));
            }
            if let Some(slot) = tier.take() {
                return Ok(slot.buffer);
            }
            if tier.reserve_new().is_some() {
                return Ok(ByteBuffer::allocate_direct(tier.capacity));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout(format!(
                    "No buffer of capacity {} became available within {:?}",
                    tier.capacity, self.block_timeout
                )));
            }
            let wait = self.poll_interval.min(deadline - now);
            cell.released.wait_for(&mut tier, wait);
        }
    }

    pub(crate) fn release(&self, mut buffer: ByteBuffer) -> Result<()> {
        if !buffer.is_direct() {
            return Err(Error::Usage(format!(
                "Only direct buffers can be released to the pool, got {:?}",
                buffer
            )));
        }

        let capacity = buffer.capacity();
        let index = tier_index(capacity);
        let cell = match self.tiers.get(index) {
            Some(cell) if cell.pooled && tier_capacity(index) == capacity => cell,
            _ => {
                trace!(capacity, "Dropping un-pooled buffer");
                return Ok(());
            }
        };

        // Zero outside the lock; the buffer only becomes visible once pushed
        if self.zero_on_release {
            buffer.zero();
        } else {
            buffer.clear();
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut tier = cell.state.lock();
        match tier.put(PoolSlot { sequence, buffer }) {
            Ok(()) => {
                drop(tier);
                cell.released.notify_one();
            }
            Err(_excess) => {
                debug!(
                    capacity,
                    available = tier.available(),
                    limit = tier.max_count,
                    "Unable to return buffer to the pool so will drop it"
                );
            }
        }
        Ok(())
    }
}

/// Snapshot of the pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub tiers: Vec<TierStats>,
    pub total_available: usize,
    pub total_bytes: u64,
    pub warning_threshold_percentage: u32,
    pub block_on_exhausted: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierStats {
    pub capacity: usize,
    pub configured_max: u32,
    pub explicitly_configured: bool,
    pub available: usize,
    pub created: u32,
    pub on_loan: usize,
    /// Release sequence of the buffer that will be handed out next
    pub oldest_sequence: Option<u64>,
    pub total_bytes: u64,
}
