use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::trace;

use crate::error::MapError;
use crate::view::View;

/// Counts mapping objects and views that are currently alive.
///
/// Every [`MappingObject`] and [`View`] created against a ledger holds a
/// [`Lease`] on it, so a non-zero count after all workers are joined means
/// something escaped its owner.
#[derive(Debug, Default)]
pub struct Ledger {
    mappings: AtomicUsize,
    views: AtomicUsize,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live_mappings(&self) -> usize {
        self.mappings.load(Ordering::Acquire)
    }

    pub fn live_views(&self) -> usize {
        self.views.load(Ordering::Acquire)
    }

    pub fn live(&self) -> usize {
        self.live_mappings() + self.live_views()
    }
}

#[derive(Debug, Clone, Copy)]
enum LeaseKind {
    Mapping,
    View,
}

/// One unit of a [`Ledger`], given back on drop.
#[derive(Debug)]
pub(crate) struct Lease {
    ledger: Arc<Ledger>,
    kind: LeaseKind,
}

impl Lease {
    fn take(ledger: &Arc<Ledger>, kind: LeaseKind) -> Self {
        ledger.counter(kind).fetch_add(1, Ordering::AcqRel);
        Self { ledger: Arc::clone(ledger), kind }
    }

    pub(crate) fn view(ledger: &Arc<Ledger>) -> Self {
        Self::take(ledger, LeaseKind::View)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.ledger.counter(self.kind).fetch_sub(1, Ordering::AcqRel);
    }
}

impl Ledger {
    fn counter(&self, kind: LeaseKind) -> &AtomicUsize {
        match kind {
            LeaseKind::Mapping => &self.mappings,
            LeaseKind::View => &self.views,
        }
    }
}

/// Read-only description of a whole file that views are mapped from.
///
/// Holds its own descriptor, so the handle it was created from can be closed
/// right away.
#[derive(Debug)]
pub struct MappingObject {
    file: File,
    size: u64,
    lease: Lease,
}

impl MappingObject {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.lease.ledger
    }

    /// Length of a view capped at `cap` that stays inside the file.
    pub fn effective_len(&self, cap: usize) -> usize {
        usize::try_from(self.size).map_or(cap, |size| size.min(cap))
    }

    /// Maps the first `len` bytes of the file, at `hint` if one is given.
    pub fn map_view(&self, hint: Option<usize>, len: usize) -> io::Result<View> {
        if len == 0 || len as u64 > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("view of {} bytes does not fit a {} byte file", len, self.size),
            ));
        }
        match hint {
            None => View::anywhere(&self.file, len, self.ledger()),
            Some(addr) => View::at(&self.file, addr, len, self.ledger()),
        }
    }
}

/// Opens the regular file at `path` for reading and reports its exact size.
pub fn open(path: &Path) -> Result<(File, u64), MapError> {
    let file = File::open(path).map_err(|source| MapError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let metadata = file.metadata().map_err(|source| MapError::SizeQuery {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(MapError::Open {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }
    let size = metadata.len();
    trace!("opened {} ({} bytes)", path.display(), size);
    Ok((file, size))
}

/// Turns an opened file into a mapping object of `size` bytes. The file
/// handle is consumed and closed.
pub fn create_mapping(
    path: &Path,
    file: File,
    size: u64,
    ledger: &Arc<Ledger>,
) -> Result<MappingObject, MapError> {
    let mapping_err = |source| MapError::MappingCreate {
        path: path.to_path_buf(),
        source,
    };
    if size == 0 {
        return Err(mapping_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot map an empty file",
        )));
    }

    let dup = file.try_clone().map_err(mapping_err)?;
    drop(file);

    Ok(MappingObject {
        file: dup,
        size,
        lease: Lease::take(ledger, LeaseKind::Mapping),
    })
}

pub fn open_mapping(path: &Path, ledger: &Arc<Ledger>) -> Result<MappingObject, MapError> {
    let (file, size) = open(path)?;
    create_mapping(path, file, size, ledger)
}
