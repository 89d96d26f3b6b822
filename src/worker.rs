use std::io;
use std::path::Path;
use std::sync::Arc;

use log::{error, trace, warn};

use crate::config::RunConfig;
use crate::error::MapError;
use crate::hint::AddressHint;
use crate::resource::{self, Ledger, MappingObject};
use crate::stats::Tally;
use crate::view::View;

/// Something views can be mapped from.
pub trait ViewSource {
    fn map_view(&self, hint: Option<usize>, len: usize) -> io::Result<View>;
}

impl ViewSource for MappingObject {
    fn map_view(&self, hint: Option<usize>, len: usize) -> io::Result<View> {
        MappingObject::map_view(self, hint, len)
    }
}

/// One benchmark thread's identity and the counters it reports into.
#[derive(Debug, Clone, Copy)]
pub struct Worker<'a> {
    pub id: usize,
    pub log_collisions: bool,
    pub tally: &'a Tally,
}

impl<'a> Worker<'a> {
    pub fn new(id: usize, log_collisions: bool, tally: &'a Tally) -> Self {
        Self { id, log_collisions, tally }
    }

    /// Tries up to `retries` times to map `len` bytes of `source`, asking
    /// `hints` for a fresh address before each attempt.
    ///
    /// `Ok(None)` means every attempt collided. A view that ignores its hint
    /// is released and reported as [`MapError::Consistency`].
    pub fn map_with_retry<S, H>(
        &self,
        source: &S,
        hints: &H,
        len: usize,
        retries: u32,
    ) -> Result<Option<View>, MapError>
    where
        S: ViewSource + ?Sized,
        H: AddressHint + ?Sized,
    {
        for attempt in 0..retries {
            let hint = hints.suggest(len);
            self.tally.attempt();

            let view = match source.map_view(hint, len) {
                Ok(view) => view,
                Err(err) => {
                    self.tally.collision();
                    self.collided(&err, hint, attempt);
                    continue;
                }
            };

            if let Some(requested) = hint {
                if view.addr() != requested {
                    self.tally.consistency_fault();
                    return Err(MapError::Consistency {
                        requested,
                        actual: view.addr(),
                    });
                }
            }

            trace!("[{}] mapped {:?} on attempt {}", self.id, view, attempt);
            self.tally.mapped();
            return Ok(Some(view));
        }

        warn!("[{}] FAILED to map after {} attempts", self.id, retries);
        self.tally.exhausted();
        Ok(None)
    }

    fn collided(&self, err: &io::Error, hint: Option<usize>, attempt: u32) {
        let code = err.raw_os_error().unwrap_or_default();
        let addr = hint.unwrap_or_default();
        if self.log_collisions {
            warn!(
                "[{}] errno={} | addr = {:#x} | retry count = {}",
                self.id, code, addr, attempt
            );
        } else {
            trace!("[{}] attempt {} at {:#x} failed: {}", self.id, attempt, addr, err);
        }
    }

    /// Worker body for one iteration: open the file, map a view, release
    /// both. Errors stop here and are only logged.
    pub fn run(&self, path: &Path, config: &RunConfig, ledger: &Arc<Ledger>) {
        let outcome = resource::open_mapping(path, ledger).and_then(|mapping| {
            let len = mapping.effective_len(config.region_size_cap);
            self.map_and_release(mapping, &config.strategy, len, config.retries)
        });
        self.settle(outcome);
    }

    /// Maps one view from `source`, then drops the view and the source on
    /// every exit path.
    fn map_and_release<S, H>(&self, source: S, hints: &H, len: usize, retries: u32) -> Result<(), MapError>
    where
        S: ViewSource,
        H: AddressHint + ?Sized,
    {
        let view = self.map_with_retry(&source, hints, len, retries)?;
        drop(view);
        drop(source);
        Ok(())
    }

    fn settle(&self, outcome: Result<(), MapError>) {
        if let Err(err) = outcome {
            if !matches!(err, MapError::Consistency { .. }) {
                self.tally.worker_error();
            }
            error!("[{}] Exception occurred: {:#}", self.id, anyhow::Error::from(err));
        }
    }
}
