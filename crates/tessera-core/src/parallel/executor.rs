use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::POOL_OVERCOMMIT;
use crate::error::{Result, TesseraError};

/// Requested worker-pool size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PoolSize {
    /// Explicit thread count.
    Threads(usize),
    /// Fraction of the available hardware concurrency.
    Fraction(f64),
}

impl Default for PoolSize {
    fn default() -> Self {
        Self::Fraction(1.0)
    }
}

impl std::fmt::Display for PoolSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threads(n) => write!(f, "{n} threads"),
            Self::Fraction(x) => write!(f, "{:.0}% of CPUs", x * 100.0),
        }
    }
}

impl PoolSize {
    /// Concrete thread count, clamped to `[1, cpus + 2]`.
    pub fn resolve(&self) -> usize {
        match *self {
            Self::Threads(n) => sensible_threads(n),
            Self::Fraction(x) => {
                let n = (available_cpus() as f64 * x.clamp(0.0, 1.0)).floor() as usize;
                sensible_threads(n)
            }
        }
    }
}

pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Clamp a requested thread count to `[1, cpus + 2]`.
pub fn sensible_threads(n: usize) -> usize {
    n.clamp(1, available_cpus() + POOL_OVERCOMMIT)
}

/// Hands out worker pools keyed by their resolved size.
///
/// One provider lives for the duration of an alignment run and is passed to
/// whatever needs pooled workers. Pools are built lazily and reused; dropping
/// the provider (or calling [`shutdown`](Self::shutdown)) releases them once
/// their queued work completes.
#[derive(Default)]
pub struct ExecutorProvider {
    pools: Mutex<HashMap<usize, Arc<ThreadPool>>>,
}

impl ExecutorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self, size: PoolSize) -> Result<Arc<ThreadPool>> {
        let threads = size.resolve();
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| TesseraError::Pipeline("executor registry poisoned".to_string()))?;
        if let Some(pool) = pools.get(&threads) {
            return Ok(Arc::clone(pool));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("tessera-{threads}-{i}"))
            .build()
            .map_err(|e| TesseraError::Pipeline(format!("cannot build worker pool: {e}")))?;
        debug!(threads, "created worker pool");
        let pool = Arc::new(pool);
        pools.insert(threads, Arc::clone(&pool));
        Ok(pool)
    }

    /// Forget every pool. Pools still referenced elsewhere stay alive until
    /// those references drop.
    pub fn shutdown(&self) {
        if let Ok(mut pools) = self.pools.lock() {
            let n = pools.len();
            pools.clear();
            debug!(pools = n, "executor provider shut down");
        }
    }

    pub fn num_pools(&self) -> usize {
        self.pools.lock().map(|p| p.len()).unwrap_or(0)
    }
}
