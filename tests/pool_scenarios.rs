//! End-to-end buffer pool scenarios

use bytes::BufMut;
use refdata::bytebuffer::{ByteBufferPool, Termination};
use refdata::config::ByteBufferPoolConfig;
use refdata::error::{Error, Result};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_ceiling_match_then_single_idle_buffer() -> Result<()> {
    let pool = ByteBufferPool::new(ByteBufferPoolConfig::with_counts([(1, 20), (100, 10)]))?;

    let mut buffer = pool.acquire(50)?;
    assert_eq!(buffer.capacity()?, 100);
    buffer.release()?;

    assert_eq!(pool.current_pool_size(), 1);
    Ok(())
}

#[test]
fn test_grow_beyond_limit_retains_only_configured_count() -> Result<()> {
    let pool = ByteBufferPool::new(ByteBufferPoolConfig::with_counts([(10, 3)]))?;

    let borrowed = (0..8)
        .map(|_| pool.acquire(10))
        .collect::<Result<Vec<_>>>()?;
    assert!(borrowed.iter().all(|b| b.capacity().ok() == Some(10)));

    drop(borrowed);
    assert_eq!(pool.available_count(10), 3);
    assert_eq!(pool.current_pool_size(), 3);
    Ok(())
}

#[test]
fn test_released_buffer_is_zeroed() -> Result<()> {
    let pool = ByteBufferPool::new(ByteBufferPoolConfig::with_counts([(100, 1)]))?;

    let mut first = pool.acquire(100)?;
    first.buffer_mut()?.put_slice(b"secret account number");
    first.release()?;

    let second = pool.acquire(100)?;
    let buffer = second.buffer()?;
    assert_eq!(buffer.position(), 0);
    assert_eq!(buffer.limit(), 100);
    assert!(buffer.as_slice().iter().all(|b| *b == 0));
    Ok(())
}

#[test]
fn test_unpooled_tier_never_reuses() -> Result<()> {
    let pool = ByteBufferPool::new(ByteBufferPoolConfig::with_counts([(10, 5), (100, 0)]))?;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let mut buffer = pool.acquire(100)?;
        seen.push(buffer.buffer()?.id());
        buffer.release()?;
        assert_eq!(pool.available_count(100), 0);
    }
    seen.dedup();
    assert_eq!(seen.len(), 3);
    assert_eq!(pool.current_pool_size(), 0);

    // A pooled tier hands the same allocation back
    let mut small = pool.acquire(10)?;
    let small_id = small.buffer()?.id();
    small.release()?;
    assert_eq!(pool.acquire(10)?.buffer()?.id(), small_id);
    Ok(())
}

#[test]
fn test_blocking_pool_waits_for_release() -> Result<()> {
    let mut config = ByteBufferPoolConfig::with_counts([(10, 1)]).block_on_exhausted(true);
    config.block_poll_interval_ms = 10;
    config.block_timeout_ms = 5_000;
    let pool = ByteBufferPool::new(config)?;

    let held = pool.acquire(10)?;
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        drop(held);
    });

    let buffer = pool.acquire(10)?;
    assert_eq!(buffer.capacity()?, 10);
    releaser.join().unwrap();
    Ok(())
}

#[test]
fn test_blocking_pool_times_out() -> Result<()> {
    let mut config = ByteBufferPoolConfig::with_counts([(10, 1)]).block_on_exhausted(true);
    config.block_poll_interval_ms = 5;
    config.block_timeout_ms = 50;
    let pool = ByteBufferPool::new(config)?;

    let _held = pool.acquire(10)?;
    assert!(matches!(pool.acquire(10), Err(Error::Timeout(_))));
    Ok(())
}

#[test]
fn test_blocking_pool_honours_termination() -> Result<()> {
    let mut config = ByteBufferPoolConfig::with_counts([(10, 1)]).block_on_exhausted(true);
    config.block_poll_interval_ms = 5;
    config.block_timeout_ms = 60_000;
    let pool = Arc::new(ByteBufferPool::new(config)?);

    let _held = pool.acquire(10)?;
    let termination = Termination::new();
    let waiter = {
        let pool = Arc::clone(&pool);
        let termination = termination.clone();
        thread::spawn(move || pool.acquire_with(10, &termination).map(|_| ()))
    };

    thread::sleep(Duration::from_millis(30));
    termination.terminate();
    assert!(matches!(waiter.join().unwrap(), Err(Error::Terminated(_))));
    Ok(())
}

#[test]
fn test_capacity_never_below_request() -> Result<()> {
    let pool = ByteBufferPool::with_defaults()?;
    for min_capacity in [1, 2, 9, 10, 11, 99, 101, 999, 1_001, 9_999, 10_000, 10_001, 250_000] {
        let buffer = pool.acquire(min_capacity)?;
        assert!(buffer.capacity()? >= min_capacity, "{}", min_capacity);
    }
    Ok(())
}
