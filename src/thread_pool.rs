//! Thread pool configuration for parallel permutation runs.
//!
//! By default work runs on a shared pool sized to the number of logical CPUs.
//! An explicit thread count builds a dedicated pool for that run; results do
//! not depend on which pool (or how many threads) executed them.

#[cfg(feature = "parallel")]
use rayon::ThreadPool;

#[cfg(feature = "parallel")]
use std::sync::OnceLock;

use crate::error::{Error, Result};

#[cfg(feature = "parallel")]
static THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// Stack size per worker thread.
#[cfg(feature = "parallel")]
const STACK_SIZE: usize = 8 * 1024 * 1024;

/// Get or initialize the shared thread pool.
#[cfg(feature = "parallel")]
pub fn get_thread_pool() -> Result<&'static ThreadPool> {
    if let Some(pool) = THREAD_POOL.get() {
        return Ok(pool);
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .stack_size(STACK_SIZE)
        .build()
        .map_err(|e| Error::InvalidConfig(format!("failed to build thread pool: {}", e)))?;
    Ok(THREAD_POOL.get_or_init(|| pool))
}

/// Execute `op` on the shared pool, or on a dedicated pool of `threads` workers.
#[cfg(feature = "parallel")]
pub fn install<OP, R>(threads: Option<usize>, op: OP) -> Result<R>
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match threads {
        Some(count) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(count)
                .stack_size(STACK_SIZE)
                .build()
                .map_err(|e| Error::InvalidConfig(format!("failed to build {}-thread pool: {}", count, e)))?;
            Ok(pool.install(op))
        }
        None => Ok(get_thread_pool()?.install(op)),
    }
}

#[cfg(not(feature = "parallel"))]
pub fn install<OP, R>(threads: Option<usize>, op: OP) -> Result<R>
where
    OP: FnOnce() -> R,
{
    // No parallel feature - just execute directly
    if threads == Some(0) {
        return Err(Error::InvalidConfig("thread count must be positive".to_string()));
    }
    Ok(op())
}
