// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Randomized concurrent dispatch against the worker pool coordinator.

use async_trait::async_trait;
use augur_swarm::{Capability, PoolConfig, SwarmError, TaskHandler, WorkerPoolCoordinator};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Records how many tasks are executing at once, independently of the pool.
#[derive(Default)]
struct InFlightProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct Job {
    sleep_ms: u64,
    fail: bool,
}

/// Decrements on drop so cancelled (expired) tasks are accounted for.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskHandler<Job, ()> for InFlightProbe {
    async fn run(&self, _capability: Capability, job: &Job) -> anyhow::Result<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.current);
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(job.sleep_ms)).await;
        if job.fail {
            anyhow::bail!("probe failure");
        }
        Ok(())
    }
}

fn run_burst(max_concurrent: usize, pool_size: usize, jobs: Vec<(usize, u64, bool)>) -> (usize, usize, usize) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let probe = Arc::new(InFlightProbe::default());
        let pool = Arc::new(WorkerPoolCoordinator::new(
            probe.clone() as Arc<dyn TaskHandler<Job, ()>>,
            PoolConfig {
                pool_size_per_capability: pool_size,
                max_concurrent_workers: max_concurrent,
                worker_deadline: Duration::from_millis(25),
            },
        ));

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(cap, sleep_ms, fail)| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let capability = Capability::ALL[cap % Capability::ALL.len()];
                    let job = Job { sleep_ms, fail };
                    let deadline = Instant::now() + Duration::from_millis(200);
                    pool.dispatch(capability, &job, deadline).await
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            match result.unwrap() {
                Ok(())
                | Err(SwarmError::WorkerExpired { .. })
                | Err(SwarmError::WorkerFailed { .. })
                | Err(SwarmError::CapacityExceeded { .. }) => {}
                Err(other) => panic!("unexpected dispatch error: {other}"),
            }
        }

        let max_idle = pool.stats().idle.values().copied().max().unwrap_or(0);
        (
            probe.peak.load(Ordering::SeqCst),
            pool.peak_active_workers(),
            max_idle,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_active_workers_never_exceed_cap(
        max_concurrent in 1usize..6,
        pool_size in 0usize..4,
        jobs in prop::collection::vec((0usize..9, 0u64..40, any::<bool>()), 1..40),
    ) {
        let (probe_peak, pool_peak, max_idle) = run_burst(max_concurrent, pool_size, jobs);
        prop_assert!(probe_peak <= max_concurrent, "handler saw {} concurrent tasks", probe_peak);
        prop_assert!(pool_peak <= max_concurrent, "pool reported peak {}", pool_peak);
        prop_assert!(max_idle <= pool_size);
    }
}

#[test]
fn fifty_concurrent_dispatches_respect_cap_of_ten() {
    let jobs = (0..50).map(|i| (i % 4, 5, false)).collect();
    let (probe_peak, pool_peak, _) = run_burst(10, 3, jobs);
    assert!(probe_peak <= 10);
    assert!(pool_peak <= 10);
}
