use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing or validating a file view.
///
/// A failed mapping attempt is not an error here: the retry loop consumes it
/// and exhaustion is reported as `Ok(None)`.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("can't open file {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't receive size of {}", path.display())]
    SizeQuery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't create file mapping for {}", path.display())]
    MappingCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The view landed somewhere other than the address it was asked for.
    #[error("view mapped at {actual:#x}, requested {requested:#x}")]
    Consistency { requested: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("setup failed before any worker started")]
    Setup(#[from] MapError),

    #[error("can't spawn mapping worker {index}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
