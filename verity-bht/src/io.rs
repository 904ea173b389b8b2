//! Read-callback contract
//!
//! The tree never touches the backing device itself. For every entry it needs
//! it hands a [`ReadRequest`] to the installed [`ReadCallback`]; whoever owns
//! the device fills the request's buffer and calls
//! [`ReadRequest::complete`], synchronously or later from another thread.

use std::fmt;
use std::io;

use log::{debug, error};

use crate::entry::{EntryHandle, EntryState, PageBuf};
use crate::error::{BhtError, Result};
use crate::geometry::to_bytes;

/// Issues reads of hash entries against the backing store
///
/// `ctx` is the per-request context passed to [`crate::Bht::populate`]. An
/// implementation may complete the request before returning or keep it and
/// complete it later, but it must complete it exactly once; a request that
/// is dropped instead completes itself with an I/O error.
pub trait ReadCallback<C: ?Sized>: Send + Sync {
    /// Start reading `request.sector_count()` sectors from
    /// `request.start_sector()` into `request.buffer_mut()`
    ///
    /// An error return is logged by the tree; the entry's fate is decided by
    /// the completion status alone.
    fn read(&self, ctx: &C, request: ReadRequest) -> io::Result<()>;
}

impl<C, F> ReadCallback<C> for F
where
    C: ?Sized,
    F: Fn(&C, ReadRequest) -> io::Result<()> + Send + Sync,
{
    fn read(&self, ctx: &C, request: ReadRequest) -> io::Result<()> {
        self(ctx, request)
    }
}

/// One outstanding read of a hash entry
///
/// Owns the entry's page buffer until completion hands it back.
pub struct ReadRequest {
    start_sector: u64,
    sector_count: u64,
    buffer: Option<PageBuf>,
    handle: Option<EntryHandle>,
}

impl ReadRequest {
    pub(crate) fn new(
        handle: EntryHandle,
        start_sector: u64,
        sector_count: u64,
        buffer: PageBuf,
    ) -> Self {
        debug_assert_eq!(to_bytes(sector_count), buffer.len() as u64);
        Self {
            start_sector,
            sector_count,
            buffer: Some(buffer),
            handle: Some(handle),
        }
    }

    /// First sector to read, relative to the start of the hash region
    #[inline]
    pub fn start_sector(&self) -> u64 {
        self.start_sector
    }

    /// Number of 512-byte sectors to read
    #[inline]
    pub fn sector_count(&self) -> u64 {
        self.sector_count
    }

    /// Level of the entry being read
    pub fn level(&self) -> usize {
        self.handle.as_ref().map_or(0, EntryHandle::level)
    }

    /// Index of the entry within its level
    pub fn entry_index(&self) -> u64 {
        self.handle.as_ref().map_or(0, EntryHandle::index)
    }

    /// Destination of the read, `sector_count() * 512` bytes
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }

    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or(&[])
    }

    /// Completion hook: report the outcome of the read
    ///
    /// `Ok(())` moves the entry from `Pending` to `Ready`; an error moves it
    /// to `IoError`, which is permanent for this tree. The buffer is retained
    /// by the entry in both cases. Fails if the entry was not `Pending`.
    pub fn complete(mut self, status: io::Result<()>) -> Result<()> {
        self.finish(status)
    }

    fn finish(&mut self, status: io::Result<()>) -> Result<()> {
        let (handle, buffer) = match (self.handle.take(), self.buffer.take()) {
            (Some(handle), Some(buffer)) => (handle, buffer),
            _ => return Ok(()),
        };
        let entry = handle.entry();
        entry.install_page(buffer);

        let target = match status {
            Ok(()) => EntryState::Ready,
            Err(e) => {
                error!(
                    "I/O error reading hash entry (level {}, index {}): {}",
                    handle.level(),
                    handle.index(),
                    e
                );
                EntryState::IoError
            }
        };
        entry
            .transition(EntryState::Pending, target)
            .map_err(|found| {
                error!(
                    "hash entry (level {}, index {}) changed state under I/O: {}",
                    handle.level(),
                    handle.index(),
                    found
                );
                BhtError::invalid(format!(
                    "completion for entry (level {}, index {}) in state {}",
                    handle.level(),
                    handle.index(),
                    found
                ))
            })?;
        debug!(
            "hash entry (level {}, index {}) -> {}",
            handle.level(),
            handle.index(),
            target
        );
        Ok(())
    }
}

impl Drop for ReadRequest {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.finish(Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "read request dropped without completion",
            )));
        }
    }
}

impl fmt::Debug for ReadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadRequest")
            .field("start_sector", &self.start_sector)
            .field("sector_count", &self.sector_count)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Default callback installed at creation: every read fails
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingReader;

impl<C: ?Sized> ReadCallback<C> for FailingReader {
    fn read(&self, _ctx: &C, request: ReadRequest) -> io::Result<()> {
        error!("no read callback installed; failing read at sector {}", request.start_sector());
        let _ = request.complete(Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no read callback installed",
        )));
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no read callback installed",
        ))
    }
}

/// Callback that fills every entry with zeros and completes at once
///
/// Producer utility for pre-populating an empty tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroReader;

impl<C: ?Sized> ReadCallback<C> for ZeroReader {
    fn read(&self, _ctx: &C, mut request: ReadRequest) -> io::Result<()> {
        request.buffer_mut().fill(0);
        request
            .complete(Ok(()))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
