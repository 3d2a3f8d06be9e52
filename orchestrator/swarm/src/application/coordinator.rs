// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Pool Coordinator
//!
//! One idle queue per [`Capability`] plus a global fair semaphore capping the
//! number of concurrently solving workers. The pool map lock is held only to
//! pop or push a worker; task execution always runs outside it.

use crate::application::TaskHandler;
use crate::domain::{Capability, Disposition, PoolConfig, PoolStats, Worker};
use crate::error::SwarmError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicU64,
    reused: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
    destroyed: AtomicU64,
    capacity_rejections: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Tracks one solving worker for the lifetime of a dispatch, including
/// dispatches whose future is dropped mid-flight.
struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        metrics::gauge!("augur_active_workers").set(now as f64);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("augur_active_workers").set(now as f64);
    }
}

/// Counts a checked-out worker as destroyed unless it goes back to its pool,
/// whether the dispatch errors out or its future is dropped mid-flight.
struct Checkout<'a> {
    destroyed: &'a AtomicU64,
    returned: bool,
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if !self.returned {
            bump(self.destroyed);
        }
    }
}

pub struct WorkerPoolCoordinator<T, O> {
    handler: Arc<dyn TaskHandler<T, O>>,
    config: PoolConfig,
    pools: Mutex<HashMap<Capability, VecDeque<Worker>>>,
    permits: Semaphore,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    counters: Counters,
}

impl<T, O> WorkerPoolCoordinator<T, O>
where
    T: Send + Sync,
    O: Send,
{
    pub fn new(handler: Arc<dyn TaskHandler<T, O>>, config: PoolConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent_workers);
        Self {
            handler,
            config,
            pools: Mutex::new(HashMap::new()),
            permits,
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Fill every capability's pool up to `pool_size_per_capability`.
    pub fn prewarm(&self) {
        let mut pools = self.pools.lock();
        for capability in Capability::ALL {
            let pool = pools.entry(capability).or_default();
            while pool.len() < self.config.pool_size_per_capability {
                match self.spawn(capability) {
                    Ok(worker) => pool.push_back(worker),
                    Err(e) => {
                        warn!(capability = %capability, error = %e, "Failed to prewarm worker");
                        break;
                    }
                }
            }
        }
        debug!(
            per_capability = self.config.pool_size_per_capability,
            "Worker pools prewarmed"
        );
    }

    /// Run `task` on a worker of `capability`.
    ///
    /// Waits for a global concurrency permit until `deadline`, then solves under
    /// `min(deadline, now + worker_deadline)`. Completed workers are reset and
    /// returned to their pool while it has room; failed and expired workers are
    /// destroyed, as is the worker of a dispatch whose future is dropped.
    pub async fn dispatch(
        &self,
        capability: Capability,
        task: &T,
        deadline: Instant,
    ) -> Result<O, SwarmError> {
        let _permit = match timeout_at(deadline, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            _ => {
                bump(&self.counters.capacity_rejections);
                metrics::counter!("augur_capacity_exceeded_total", "capability" => capability.as_str())
                    .increment(1);
                debug!(capability = %capability, "No worker permit before deadline");
                return Err(SwarmError::CapacityExceeded {
                    capability,
                    max_concurrent: self.config.max_concurrent_workers,
                });
            }
        };
        let _active = ActiveGuard::enter(&self.active, &self.peak_active);

        let mut worker = self.checkout(capability)?;
        let mut checkout = Checkout {
            destroyed: &self.counters.destroyed,
            returned: false,
        };
        worker.begin_solving()?;

        let started = Instant::now();
        let solve_deadline = deadline.min(started + self.config.worker_deadline);
        let result = timeout_at(solve_deadline, self.handler.run(capability, task)).await;

        match result {
            Ok(Ok(output)) => {
                worker.complete()?;
                bump(&self.counters.completed);
                if worker.dissolve()? == Disposition::ReturnToPool {
                    checkout.returned = true;
                    self.checkin(worker);
                }
                Ok(output)
            }
            Ok(Err(e)) => {
                worker.fail()?;
                worker.dissolve()?;
                bump(&self.counters.failed);
                metrics::counter!("augur_workers_failed_total", "capability" => capability.as_str())
                    .increment(1);
                warn!(capability = %capability, worker_id = %worker.id, error = %e, "Worker failed");
                Err(SwarmError::WorkerFailed {
                    capability,
                    reason: format!("{e:#}"),
                })
            }
            Err(_) => {
                worker.expire()?;
                worker.dissolve()?;
                bump(&self.counters.expired);
                metrics::counter!("augur_workers_expired_total", "capability" => capability.as_str())
                    .increment(1);
                let elapsed_ms = started.elapsed().as_millis() as u64;
                debug!(capability = %capability, worker_id = %worker.id, elapsed_ms, "Worker expired");
                Err(SwarmError::WorkerExpired {
                    capability,
                    elapsed_ms,
                })
            }
        }
    }

    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak_active_workers(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self
            .pools
            .lock()
            .iter()
            .map(|(capability, pool)| (*capability, pool.len()))
            .collect();
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PoolStats {
            active: self.active_workers(),
            peak_active: self.peak_active_workers(),
            spawned: load(&self.counters.spawned),
            reused: load(&self.counters.reused),
            completed: load(&self.counters.completed),
            failed: load(&self.counters.failed),
            expired: load(&self.counters.expired),
            destroyed: load(&self.counters.destroyed),
            capacity_rejections: load(&self.counters.capacity_rejections),
            idle,
        }
    }

    fn spawn(&self, capability: Capability) -> Result<Worker, SwarmError> {
        let deadline_ms = self.config.worker_deadline.as_millis() as u64;
        let mut worker = Worker::new(capability, deadline_ms);
        worker.activate()?;
        bump(&self.counters.spawned);
        Ok(worker)
    }

    fn checkout(&self, capability: Capability) -> Result<Worker, SwarmError> {
        let pooled = self
            .pools
            .lock()
            .get_mut(&capability)
            .and_then(VecDeque::pop_front);
        match pooled {
            Some(worker) => {
                bump(&self.counters.reused);
                Ok(worker)
            }
            None => self.spawn(capability),
        }
    }

    fn checkin(&self, mut worker: Worker) {
        if let Err(e) = worker.reset() {
            warn!(worker_id = %worker.id, error = %e, "Discarding worker that could not be reset");
            bump(&self.counters.destroyed);
            return;
        }
        let mut pools = self.pools.lock();
        let pool = pools.entry(worker.capability).or_default();
        if pool.len() < self.config.pool_size_per_capability {
            pool.push_back(worker);
        } else {
            bump(&self.counters.destroyed);
        }
    }
}
