use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace};

use crate::config::RunConfig;
use crate::error::HarnessError;
use crate::gate::StartGate;
use crate::hint::HintStrategy;
use crate::resource::{self, Ledger};
use crate::stats::{Report, Tally};
use crate::worker::Worker;

/// Runs `config.iterations` timed rounds of `config.concurrency` workers
/// mapping `path`, one round after another.
///
/// The file is opened and wrapped in a mapping object once up front, so a
/// missing or unmappable file fails here before any thread exists.
pub fn run(config: &RunConfig, path: &Path) -> Result<Report, HarnessError> {
    let ledger = Ledger::new();
    let probe = resource::open_mapping(path, &ledger)?;
    debug!(
        "{} is {} bytes, mapping up to {}",
        path.display(),
        probe.size(),
        probe.effective_len(config.region_size_cap)
    );
    drop(probe);

    info!(
        "{} iterations of {} workers, strategy {}",
        config.iterations,
        config.concurrency,
        config.strategy.label()
    );

    let tally = Tally::default();
    let mut samples = Vec::with_capacity(config.iterations);
    let mut leaked = 0;
    for iteration in 0..config.iterations {
        let elapsed = run_iteration(config, path, &ledger, &tally, iteration)?;
        debug!("iteration {}: {:?}", iteration, elapsed);
        samples.push(elapsed);

        let live = ledger.live();
        if live > leaked {
            error!(
                "iteration {}: {} mapping objects and {} views still alive",
                iteration,
                ledger.live_mappings(),
                ledger.live_views()
            );
            leaked = live;
        }
        trace!("iteration {}: recorded", iteration);
    }

    Ok(Report {
        strategy: config.strategy,
        samples,
        tally: tally.snapshot(),
        leaked,
    })
}

fn run_iteration(
    config: &RunConfig,
    path: &Path,
    ledger: &Arc<Ledger>,
    tally: &Tally,
    iteration: usize,
) -> Result<Duration, HarnessError> {
    let gate = StartGate::new();

    thread::scope(|s| {
        let mut handles = Vec::with_capacity(config.concurrency);
        for id in 0..config.concurrency {
            let worker = Worker::new(id, config.log_collisions, tally);
            let gate = &gate;
            let spawned = thread::Builder::new()
                .name(format!("mapper-{}", id))
                .spawn_scoped(s, move || {
                    gate.wait();
                    worker.run(path, config, ledger);
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    gate.open();
                    join_all(handles, tally);
                    return Err(HarnessError::Spawn { index: id, source });
                }
            }
        }
        trace!("iteration {}: workers spawned", iteration);

        gate.await_arrivals(handles.len());
        let started = Instant::now();
        gate.open();
        trace!("iteration {}: gate opened", iteration);

        join_all(handles, tally);
        let elapsed = started.elapsed();
        trace!("iteration {}: all joined", iteration);
        Ok(elapsed)
    })
}

fn join_all(handles: Vec<ScopedJoinHandle<'_, ()>>, tally: &Tally) {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("mapper").to_owned();
        if handle.join().is_err() {
            tally.worker_error();
            error!("[{}] worker panicked", name);
        }
    }
}

/// Both strategies measured under the same configuration.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub os_choice: Report,
    pub top_down: Report,
}

impl Comparison {
    /// Extra time top-down hinting costs over letting the kernel choose, in
    /// percent.
    pub fn overhead(&self) -> f64 {
        self.top_down.overhead_over(&self.os_choice)
    }
}

pub fn compare(config: &RunConfig, path: &Path) -> Result<Comparison, HarnessError> {
    let os_choice = run(&config.with_strategy(HintStrategy::OsChoice), path)?;
    let top_down = run(&config.with_strategy(HintStrategy::TopDown), path)?;
    Ok(Comparison { os_choice, top_down })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::error::MapError;

    fn temp_file(len: usize) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&vec![0x5au8; len]).unwrap();
        f.flush().unwrap();
        f
    }

    fn small_config(concurrency: usize, iterations: usize, strategy: HintStrategy) -> RunConfig {
        RunConfig {
            log_collisions: false,
            concurrency,
            retries: 10,
            iterations,
            region_size_cap: 1024 * 1024,
            strategy,
        }
    }

    #[test]
    fn single_worker_without_contention() {
        let f = temp_file(64 * 1024);
        let report = run(&small_config(1, 3, HintStrategy::OsChoice), f.path()).unwrap();

        assert_eq!(report.iterations(), 3);
        assert_eq!(report.tally.attempts, 3);
        assert_eq!(report.tally.mapped, 3);
        assert_eq!(report.tally.worker_errors, 0);
        assert_eq!(report.leaked, 0);
    }

    #[test]
    fn concurrent_top_down_run_accounts_for_every_worker() {
        let f = temp_file(256 * 1024);
        let report = run(&small_config(8, 2, HintStrategy::TopDown), f.path()).unwrap();

        assert_eq!(report.tally.mapped + report.tally.exhausted, 16);
        assert_eq!(report.tally.consistency_faults, 0);
        assert_eq!(report.tally.worker_errors, 0);
        assert!(report.tally.attempts >= 16);
        assert!(report.tally.attempts <= 16 * 10);
        assert_eq!(report.leaked, 0);
    }

    #[test]
    fn missing_file_aborts_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&small_config(4, 1, HintStrategy::TopDown), &dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, HarnessError::Setup(MapError::Open { .. })));
    }

    #[test]
    fn directory_aborts_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            retries: 3,
            ..small_config(2, 1, HintStrategy::TopDown)
        };
        let err = run(&config, dir.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Setup(MapError::Open { .. })));
    }

    #[test]
    fn empty_file_aborts_before_spawning() {
        let f = temp_file(0);
        let err = run(&small_config(4, 1, HintStrategy::OsChoice), f.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Setup(MapError::MappingCreate { .. })));
    }

    #[test]
    fn compare_runs_both_strategies() {
        let f = temp_file(128 * 1024);
        let cmp = compare(&small_config(4, 2, HintStrategy::TopDown), f.path()).unwrap();

        assert_eq!(cmp.os_choice.strategy, HintStrategy::OsChoice);
        assert_eq!(cmp.top_down.strategy, HintStrategy::TopDown);
        assert_eq!(cmp.os_choice.iterations(), 2);
        assert_eq!(cmp.top_down.iterations(), 2);
        assert!(cmp.top_down.tally.collisions >= cmp.os_choice.tally.collisions);
        assert!(cmp.overhead().is_finite());
    }
}
