//! Entry store
//!
//! Every level owns a flat array of entries. An entry starts out as a bare
//! state word; its page buffer only exists once a read has been issued for
//! it. State changes go through compare-and-swap so that exactly one request
//! claims an unallocated entry, even when several threads share a tree.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::{BhtError, Result};
use crate::geometry::PAGE_SIZE;

/// Lifecycle of an entry
///
/// ```text
///   Unallocated ──► Pending ──► Ready ──► Verified
///                      │          │          │
///                      ▼          ▼          │
///                   IoError    Mismatch ◄────┘
/// ```
///
/// `IoError` and `Mismatch` are terminal.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    Unallocated = 0,
    Pending = 1,
    Ready = 2,
    Verified = 3,
    IoError = 4,
    Mismatch = 5,
}

impl EntryState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => EntryState::Unallocated,
            1 => EntryState::Pending,
            2 => EntryState::Ready,
            3 => EntryState::Verified,
            4 => EntryState::IoError,
            _ => EntryState::Mismatch,
        }
    }

    /// Terminal failure states
    #[inline]
    pub fn is_error(self) -> bool {
        matches!(self, EntryState::IoError | EntryState::Mismatch)
    }

    /// `Ready` or better: the page contents are available
    #[inline]
    pub fn is_loaded(self) -> bool {
        matches!(self, EntryState::Ready | EntryState::Verified)
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryState::Unallocated => "unallocated",
            EntryState::Pending => "pending",
            EntryState::Ready => "ready",
            EntryState::Verified => "verified",
            EntryState::IoError => "io-error",
            EntryState::Mismatch => "mismatch",
        };
        f.write_str(name)
    }
}

/// One page of `fan_out` sibling digests
#[derive(Default)]
pub(crate) struct Entry {
    state: AtomicU8,
    page: OnceLock<PageBuf>,
}

impl Entry {
    #[inline]
    pub(crate) fn state(&self) -> EntryState {
        EntryState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; on failure returns the state actually found
    #[inline]
    pub(crate) fn transition(
        &self,
        from: EntryState,
        to: EntryState,
    ) -> std::result::Result<(), EntryState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(EntryState::from_raw)
    }

    /// Unconditional store, only valid while the caller has exclusive access
    #[inline]
    pub(crate) fn set_state(&self, state: EntryState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move a loaded entry to `Mismatch`; failure states are left as found
    pub(crate) fn poison(&self) {
        for from in [EntryState::Ready, EntryState::Verified] {
            if self.transition(from, EntryState::Mismatch).is_ok() {
                return;
            }
        }
    }

    /// Page contents; present from the moment the read completes
    #[inline]
    pub(crate) fn page(&self) -> Option<&[u8]> {
        self.page.get().map(|p| &p[..])
    }

    /// Hand the buffer back after its read finished. Only the first call has
    /// any effect.
    pub(crate) fn install_page(&self, page: PageBuf) {
        let _ = self.page.set(page);
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("state", &self.state())
            .field("allocated", &self.page.get().is_some())
            .finish()
    }
}

#[repr(C, align(4096))]
struct Page([u8; PAGE_SIZE]);

const _: () = assert!(std::mem::align_of::<Page>() == PAGE_SIZE);

/// A `PAGE_SIZE` buffer aligned to `PAGE_SIZE`, suitable for direct I/O
pub struct PageBuf(Box<[Page; 1]>);

impl Deref for PageBuf {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.0[0].0
    }
}

impl DerefMut for PageBuf {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0[0].0
    }
}

impl fmt::Debug for PageBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuf").field("len", &self.len()).finish()
    }
}

/// Allocate a zeroed, page-aligned buffer, reporting allocation failure
/// instead of aborting
pub(crate) fn alloc_page() -> Result<PageBuf> {
    let mut pages: Vec<Page> = Vec::new();
    pages.try_reserve_exact(1).map_err(|_| BhtError::NoMem)?;
    pages.push(Page([0u8; PAGE_SIZE]));
    let pages: Box<[Page; 1]> = pages
        .into_boxed_slice()
        .try_into()
        .map_err(|_| BhtError::NoMem)?;
    Ok(PageBuf(pages))
}

/// The entries of one level
///
/// Shared (`Arc`) so that an in-flight read request can find its entry again
/// without borrowing the tree.
#[derive(Debug, Clone)]
pub(crate) struct Level {
    entries: Arc<[Entry]>,
}

impl Level {
    pub(crate) fn new(entry_count: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(entry_count)
            .map_err(|_| BhtError::NoMem)?;
        entries.resize_with(entry_count, Entry::default);
        Ok(Self {
            entries: entries.into(),
        })
    }

    #[inline]
    pub(crate) fn entry(&self, index: u64) -> &Entry {
        &self.entries[index as usize]
    }

    #[inline]
    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub(crate) fn handle(&self, level: usize, index: u64) -> EntryHandle {
        EntryHandle {
            entries: Arc::clone(&self.entries),
            level,
            index,
        }
    }
}

/// Opaque token identifying the entry a read was issued for
#[derive(Clone)]
pub struct EntryHandle {
    entries: Arc<[Entry]>,
    level: usize,
    index: u64,
}

impl EntryHandle {
    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[inline]
    pub(crate) fn entry(&self) -> &Entry {
        &self.entries[self.index as usize]
    }
}

impl fmt::Debug for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryHandle")
            .field("level", &self.level)
            .field("index", &self.index)
            .field("state", &self.entry().state())
            .finish()
    }
}
