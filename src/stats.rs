use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::hint::HintStrategy;

/// Outcome counters shared by every worker of a run.
#[derive(Debug, Default)]
pub struct Tally {
    attempts: AtomicU64,
    collisions: AtomicU64,
    mapped: AtomicU64,
    exhausted: AtomicU64,
    consistency_faults: AtomicU64,
    worker_errors: AtomicU64,
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl Tally {
    bump! {
        attempt => attempts,
        collision => collisions,
        mapped => mapped,
        exhausted => exhausted,
        consistency_fault => consistency_faults,
        worker_error => worker_errors,
    }

    pub fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            mapped: self.mapped.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            consistency_faults: self.consistency_faults.load(Ordering::Relaxed),
            worker_errors: self.worker_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TallySnapshot {
    pub attempts: u64,
    pub collisions: u64,
    pub mapped: u64,
    pub exhausted: u64,
    pub consistency_faults: u64,
    pub worker_errors: u64,
}

/// Result of a complete benchmark run.
#[derive(Debug, Clone)]
pub struct Report {
    pub strategy: HintStrategy,
    pub samples: Vec<Duration>,
    pub tally: TallySnapshot,
    pub leaked: usize,
}

impl Report {
    pub fn iterations(&self) -> usize {
        self.samples.len()
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: u128 = self.samples.iter().map(Duration::as_nanos).sum();
        let mean = total / self.samples.len() as u128;
        Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX))
    }

    /// Mean iteration time in clock ticks (nanoseconds).
    pub fn average_ticks(&self) -> u128 {
        self.average().as_nanos()
    }

    /// Failed attempts per attempt made.
    pub fn collision_rate(&self) -> f64 {
        ratio(self.tally.collisions, self.tally.attempts)
    }

    /// Workers left without a view per worker that finished mapping.
    pub fn failure_rate(&self) -> f64 {
        ratio(self.tally.exhausted, self.tally.exhausted + self.tally.mapped)
    }

    /// How much slower this run was than `baseline`, in percent.
    pub fn overhead_over(&self, baseline: &Report) -> f64 {
        let base = baseline.average_ticks() as f64;
        if base == 0.0 {
            return 0.0;
        }
        (self.average_ticks() as f64 - base) / base * 100.0
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-----------")?;
        writeln!(f, "strategy:   {}", self.strategy.label())?;
        writeln!(f, "iterations: {}", self.iterations())?;
        writeln!(
            f,
            "attempts:   {} ({} collisions, {:.2}%)",
            self.tally.attempts,
            self.tally.collisions,
            self.collision_rate() * 100.0
        )?;
        writeln!(
            f,
            "views:      {} mapped, {} failed ({:.2}%)",
            self.tally.mapped,
            self.tally.exhausted,
            self.failure_rate() * 100.0
        )?;
        if self.tally.consistency_faults + self.tally.worker_errors > 0 {
            writeln!(
                f,
                "faults:     {} consistency, {} worker errors",
                self.tally.consistency_faults, self.tally.worker_errors
            )?;
        }
        if self.leaked > 0 {
            writeln!(f, "leaked:     {}", self.leaked)?;
        }
        write!(f, "{} ticks", self.average_ticks())
    }
}
