//! Execution slots for bounding concurrent toolchain processes.
//!
//! Untrusted traffic must not be able to fork an unbounded number of
//! compilers and interpreters. Every pipeline run holds one
//! [`ExecutionPermit`] for its whole duration; requests beyond the ceiling
//! queue for a free slot up to `queue_timeout`.

use crate::error::SandboxError;
use crate::result::Outcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

// ============================================================================
// Statistics
// ============================================================================

/// Execution counters for observability.
///
/// All counters are atomic and can be read without locking.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    success: AtomicU64,
    compile_failed: AtomicU64,
    runtime_failed: AtomicU64,
    timed_out: AtomicU64,
    internal_error: AtomicU64,
    in_flight: AtomicU64,
}

impl ExecutionStats {
    fn counter(&self, outcome: Outcome) -> &AtomicU64 {
        match outcome {
            Outcome::Success => &self.success,
            Outcome::CompileFailed => &self.compile_failed,
            Outcome::RuntimeFailed => &self.runtime_failed,
            Outcome::TimedOut => &self.timed_out,
            Outcome::InternalError => &self.internal_error,
        }
    }

    /// Count one finished execution.
    pub fn record(&self, outcome: Outcome) {
        self.counter(outcome).fetch_add(1, Ordering::Relaxed);
    }

    /// Number of executions that finished with `outcome`.
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.counter(outcome).load(Ordering::Relaxed)
    }

    /// Total finished executions.
    pub fn total(&self) -> u64 {
        Outcome::ALL.iter().map(|o| self.count(*o)).sum()
    }

    /// Executions currently holding a slot.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total(),
            in_flight: self.in_flight(),
            success: self.count(Outcome::Success),
            compile_failed: self.count(Outcome::CompileFailed),
            runtime_failed: self.count(Outcome::RuntimeFailed),
            timed_out: self.count(Outcome::TimedOut),
            internal_error: self.count(Outcome::InternalError),
        }
    }
}

/// Serializable copy of [`ExecutionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub in_flight: u64,
    pub success: u64,
    pub compile_failed: u64,
    pub runtime_failed: u64,
    pub timed_out: u64,
    pub internal_error: u64,
}

// ============================================================================
// Pool
// ============================================================================

/// Fixed number of execution slots shared by all requests.
#[derive(Debug)]
pub struct ExecutionPool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    queue_timeout: Duration,
    stats: Arc<ExecutionStats>,
}

/// One held execution slot. Released on drop.
#[derive(Debug)]
pub struct ExecutionPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<ExecutionStats>,
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ExecutionPool {
    /// Create a pool with `max_concurrent` slots.
    pub fn new(max_concurrent: usize, queue_timeout: Duration) -> Self {
        tracing::info!(max_concurrent, "Creating execution pool");
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            queue_timeout,
            stats: Arc::new(ExecutionStats::default()),
        }
    }

    /// Wait for a free slot, up to the queue timeout.
    pub async fn acquire(&self) -> Result<ExecutionPermit, SandboxError> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let permit = match tokio::time::timeout(self.queue_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(SandboxError::Task("execution pool closed".into()));
            }
            Err(_) => {
                tracing::warn!(
                    max_concurrent = self.max_concurrent,
                    waited_ms = self.queue_timeout.as_millis() as u64,
                    "No execution slot available"
                );
                return Err(SandboxError::CapacityExhausted(self.queue_timeout));
            }
        };
        self.stats.in_flight.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(available = self.available(), "Execution slot acquired");
        Ok(ExecutionPermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured ceiling.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Execution counters.
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default() {
        let stats = ExecutionStats::default();
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.in_flight(), 0);
    }

    #[test]
    fn test_stats_record() {
        let stats = ExecutionStats::default();
        stats.record(Outcome::Success);
        stats.record(Outcome::Success);
        stats.record(Outcome::TimedOut);
        assert_eq!(stats.count(Outcome::Success), 2);
        assert_eq!(stats.count(Outcome::TimedOut), 1);
        assert_eq!(stats.total(), 3);

        let snap = stats.snapshot();
        assert_eq!(snap.success, 2);
        assert_eq!(snap.timed_out, 1);
        assert_eq!(snap.total, 3);
    }

    #[tokio::test]
    async fn test_permit_tracks_in_flight() {
        let pool = ExecutionPool::new(2, Duration::from_secs(1));
        let a = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().in_flight(), 1);
        assert_eq!(pool.available(), 1);
        drop(a);
        assert_eq!(pool.stats().in_flight(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_full() {
        let pool = ExecutionPool::new(1, Duration::from_millis(50));
        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, SandboxError::CapacityExhausted(_)));
    }

    #[tokio::test]
    async fn test_waiter_gets_slot_when_released() {
        let pool = Arc::new(ExecutionPool::new(1, Duration::from_secs(5)));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
    }
}
