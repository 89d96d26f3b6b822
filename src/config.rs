use clap::Parser;

use crate::error::ConfigError;
use crate::hint::HintStrategy;

pub const DEFAULT_REGION_SIZE_CAP: usize = 22 * 1024 * 1024;

/// Parameters of one benchmark run. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub log_collisions: bool,
    pub concurrency: usize,
    pub retries: u32,
    pub iterations: usize,
    pub region_size_cap: usize,
    pub strategy: HintStrategy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            log_collisions: false,
            concurrency: 50,
            retries: 10,
            iterations: 1000,
            region_size_cap: DEFAULT_REGION_SIZE_CAP,
            strategy: HintStrategy::TopDown,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Zero("concurrency"));
        }
        if self.retries == 0 {
            return Err(ConfigError::Zero("retries"));
        }
        if self.iterations == 0 {
            return Err(ConfigError::Zero("iterations"));
        }
        if self.region_size_cap == 0 {
            return Err(ConfigError::Zero("region size"));
        }
        Ok(())
    }

    pub fn with_strategy(&self, strategy: HintStrategy) -> Self {
        Self { strategy, ..self.clone() }
    }
}

/// Measure how long concurrent threads take to map read-only views of one file.
#[derive(Parser, Debug)]
#[command(name = "topmap", version)]
pub struct Cli {
    /// File to map (defaults to this executable)
    #[arg(long, value_name = "PATH")]
    pub file: Option<std::path::PathBuf>,

    /// Worker threads per iteration
    #[arg(long, default_value_t = 50)]
    pub concurrency: usize,

    /// Mapping attempts per worker before giving up
    #[arg(long, default_value_t = 10)]
    pub retries: u32,

    /// Timed iterations to average over
    #[arg(long, default_value_t = 1000)]
    pub iterations: usize,

    /// Upper bound on the view length in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_REGION_SIZE_CAP)]
    pub region_size: usize,

    /// Address selection for each view
    #[arg(long, value_enum, default_value_t = HintStrategy::TopDown)]
    pub strategy: HintStrategy,

    /// Print a line for every failed mapping attempt
    #[arg(long)]
    pub log_collisions: bool,

    /// Run both strategies and print the relative overhead
    #[arg(long)]
    pub compare: bool,
}

impl Cli {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            log_collisions: self.log_collisions,
            concurrency: self.concurrency,
            retries: self.retries,
            iterations: self.iterations,
            region_size_cap: self.region_size,
            strategy: self.strategy,
        }
    }
}
