use std::ptr;

use clap::ValueEnum;
use log::trace;

/// Source of candidate base addresses for a view.
pub trait AddressHint {
    /// Returns an address that is probably free for `size` bytes, or `None`
    /// to let the kernel choose.
    fn suggest(&self, size: usize) -> Option<usize>;
}

/// How a worker picks the address for its view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HintStrategy {
    /// No hint, the kernel places the view wherever it likes.
    OsChoice,
    /// Probe the highest free range and ask for the view exactly there.
    TopDown,
}

impl HintStrategy {
    pub fn label(self) -> &'static str {
        match self {
            HintStrategy::OsChoice => "os-choice",
            HintStrategy::TopDown => "top-down",
        }
    }
}

impl AddressHint for HintStrategy {
    fn suggest(&self, size: usize) -> Option<usize> {
        match self {
            HintStrategy::OsChoice => None,
            HintStrategy::TopDown => top_free_address(size),
        }
    }
}

/// Reserves `size` bytes of inaccessible address space, releases it again and
/// hands back where it was.
///
/// The kernel hands out anonymous mappings top-down from the mmap base, so the
/// reservation lands in the highest free gap. Nothing stops another thread
/// from taking that gap before the caller maps into it.
fn top_free_address(size: usize) -> Option<usize> {
    if size == 0 {
        return None;
    }

    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    let base = unsafe { libc::mmap(ptr::null_mut(), size, libc::PROT_NONE, flags, -1, 0) };
    if base == libc::MAP_FAILED {
        trace!("top-down probe of {} bytes failed", size);
        return None;
    }

    unsafe { libc::munmap(base, size) };
    Some(base as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    #[test]
    fn os_choice_never_suggests() {
        assert_eq!(HintStrategy::OsChoice.suggest(4096), None);
        assert_eq!(HintStrategy::OsChoice.suggest(1 << 30), None);
    }

    #[test]
    fn top_down_returns_page_aligned_address() {
        let addr = HintStrategy::TopDown.suggest(1 << 20).expect("probe failed");
        assert_ne!(addr, 0);
        assert_eq!(addr % page_size(), 0);
    }

    #[test]
    fn zero_size_yields_none() {
        assert_eq!(HintStrategy::TopDown.suggest(0), None);
    }
}
