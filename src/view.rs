use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::ptr::NonNull;
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};

use crate::resource::{Lease, Ledger};

// Without NOREPLACE the kernel treats the address as a loose hint and may put
// the view elsewhere, which the worker reports as a consistency fault.
#[cfg(any(target_os = "linux", target_os = "android"))]
const HINTED_FLAGS: libc::c_int = libc::MAP_SHARED | libc::MAP_FIXED_NOREPLACE;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const HINTED_FLAGS: libc::c_int = libc::MAP_SHARED;

enum Backing {
    Anywhere(Mmap),
    Hinted { base: NonNull<libc::c_void>, len: usize },
}

/// A read-only window onto the start of a file.
///
/// The region is unmapped when the view is dropped, which is the only way to
/// release it.
pub struct View {
    backing: Backing,
    _lease: Lease,
}

impl View {
    pub(crate) fn anywhere(file: &File, len: usize, ledger: &Arc<Ledger>) -> io::Result<Self> {
        let map = unsafe { MmapOptions::new().len(len).map(file)? };
        Ok(Self {
            backing: Backing::Anywhere(map),
            _lease: Lease::view(ledger),
        })
    }

    pub(crate) fn at(file: &File, addr: usize, len: usize, ledger: &Arc<Ledger>) -> io::Result<Self> {
        let base = unsafe {
            libc::mmap(
                addr as *mut libc::c_void,
                len,
                libc::PROT_READ,
                HINTED_FLAGS,
                file.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(base).ok_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable))?;
        Ok(Self {
            backing: Backing::Hinted { base, len },
            _lease: Lease::view(ledger),
        })
    }

    pub fn addr(&self) -> usize {
        match &self.backing {
            Backing::Anywhere(map) => map.as_ptr() as usize,
            Backing::Hinted { base, .. } => base.as_ptr() as usize,
        }
    }

    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Anywhere(map) => map.len(),
            Backing::Hinted { len, .. } => *len,
        }
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Anywhere(map) => &map[..],
            Backing::Hinted { base, len } => unsafe {
                std::slice::from_raw_parts(base.as_ptr() as *const u8, *len)
            },
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        // Mmap unmaps itself.
        if let Backing::Hinted { base, len } = self.backing {
            unsafe { libc::munmap(base.as_ptr(), len) };
        }
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::hint::{AddressHint, HintStrategy};
    use crate::resource::open_mapping;

    fn temp_file(data: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(data).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn view_reads_file_contents() {
        let data: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        let f = temp_file(&data);
        let mapping = open_mapping(f.path(), &Ledger::new()).unwrap();

        let view = mapping.map_view(None, 4096).unwrap();
        assert_eq!(view.len(), 4096);
        assert_eq!(view.as_slice(), &data[..4096]);
    }

    #[test]
    fn hinted_view_lands_on_hint_or_fails() {
        let data = vec![0xabu8; 64 * 1024];
        let f = temp_file(&data);
        let mapping = open_mapping(f.path(), &Ledger::new()).unwrap();

        for _ in 0..10 {
            let hint = HintStrategy::TopDown.suggest(data.len()).unwrap();
            // Another test thread may grab the range first; that is a plain failure.
            if let Ok(view) = mapping.map_view(Some(hint), data.len()) {
                assert_eq!(view.addr(), hint);
                assert_eq!(view.as_slice(), &data[..]);
                return;
            }
        }
        panic!("no hinted view succeeded in 10 attempts");
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn occupied_hint_is_a_collision() {
        let f = temp_file(&[1u8; 4096]);
        let mapping = open_mapping(f.path(), &Ledger::new()).unwrap();

        let taken = mapping.map_view(None, 4096).unwrap();
        let err = mapping.map_view(Some(taken.addr()), 4096).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EEXIST));
        assert_eq!(mapping.ledger().live_views(), 1);
    }

    #[test]
    fn drop_releases_lease() {
        let f = temp_file(&[1u8; 4096]);
        let ledger = Ledger::new();
        let mapping = open_mapping(f.path(), &ledger).unwrap();
        {
            let _a = mapping.map_view(None, 4096).unwrap();
            let _b = mapping.map_view(None, 1024).unwrap();
            assert_eq!(ledger.live_views(), 2);
        }
        assert_eq!(ledger.live_views(), 0);
    }
}
