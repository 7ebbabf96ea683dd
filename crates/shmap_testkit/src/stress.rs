//! Stress tests for shmap.
//!
//! These helpers hammer a map from several threads and report what happened.

use shmap_core::{LongValue, MachineState, SharedMap, StateMachineData, StateMachineProcessor};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations performed by each thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct keys.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            key_count: 64,
        }
    }
}

/// Every thread increments every counter `operations / key_count` times
/// through `add_and_get`.
///
/// Returns the result and the sum of all counters, which must equal
/// `threads * (operations / key_count) * key_count`.
pub fn stress_concurrent_increments(
    map: &SharedMap<u32, LongValue>,
    config: &StressConfig,
) -> (StressTestResult, i64) {
    let rounds = config.operations / config.key_count.max(1);
    let start = Instant::now();

    let (successful, failed) = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|_| {
                scope.spawn(move || {
                    let mut ok = 0usize;
                    let mut failed = 0usize;
                    for _ in 0..rounds {
                        for key in 0..config.key_count as u32 {
                            let counter = map
                                .acquire_record::<u32, LongValue>(&key)
                                .and_then(|counter| counter.add_and_get(1));
                            match counter {
                                Ok(_) => ok += 1,
                                Err(_) => failed += 1,
                            }
                        }
                    }
                    (ok, failed)
                })
            })
            .collect();
        handles.into_iter().fold((0, 0), |(ok, failed), h| {
            let (o, f) = h.join().expect("stress thread panicked");
            (ok + o, failed + f)
        })
    });

    let total = (0..config.key_count as u32)
        .filter_map(|key| map.get_record::<u32, LongValue>(&key).ok().flatten())
        .map(|counter| counter.get().unwrap_or_default())
        .sum();

    (
        StressTestResult::new(successful, failed, start.elapsed()),
        total,
    )
}

/// Each thread puts, reads back and removes keys from its own disjoint range.
pub fn stress_concurrent_puts(
    map: &SharedMap<u64, Vec<u8>>,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();

    let (successful, failed) = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                scope.spawn(move || {
                    let mut ok = 0usize;
                    let mut failed = 0usize;
                    let base = (t * config.key_count) as u64;
                    for i in 0..config.operations {
                        let key = base + (i % config.key_count) as u64;
                        let value = key.to_le_bytes().to_vec();
                        let round_trip = map
                            .put(&key, &value)
                            .and_then(|_| map.get(&key))
                            .map(|read| read.as_ref() == Some(&value));
                        match round_trip {
                            Ok(true) => ok += 1,
                            _ => failed += 1,
                        }
                        if i % 3 == 2 && map.remove(&key).is_err() {
                            failed += 1;
                        }
                    }
                    (ok, failed)
                })
            })
            .collect();
        handles.into_iter().fold((0, 0), |(ok, failed), h| {
            let (o, f) = h.join().expect("stress thread panicked");
            (ok + o, failed + f)
        })
    });

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs a ring of processors, one thread per edge, over a single record.
///
/// The ring is `State0 -> State1 -> ... -> State(n-1) -> State0` for
/// `states` between 2 and 4. Returns the total number of transitions.
pub fn stress_state_machine_ring(
    map: &SharedMap<String, StateMachineData>,
    key: &str,
    states: usize,
    iterations: usize,
) -> StressTestResult {
    const RING: [MachineState; 4] = [
        MachineState::State0,
        MachineState::State1,
        MachineState::State2,
        MachineState::State3,
    ];
    let states = states.clamp(2, RING.len());
    let data = map
        .acquire_record::<str, StateMachineData>(key)
        .expect("Failed to acquire state machine record");
    data.set_state(RING[0]).expect("Failed to reset state");

    let start = Instant::now();
    let (successful, failed) = thread::scope(|scope| {
        let handles: Vec<_> = (0..states)
            .map(|i| {
                let processor = StateMachineProcessor::new(
                    data.clone(),
                    iterations,
                    RING[i],
                    RING[(i + 1) % states],
                );
                scope.spawn(move || processor.run())
            })
            .collect();
        handles
            .into_iter()
            .fold((0, 0), |(ok, failed), h| match h.join() {
                Ok(Ok(steps)) => (ok + steps, failed),
                _ => (ok, failed + 1),
            })
    });

    StressTestResult::new(successful, failed, start.elapsed())
}
