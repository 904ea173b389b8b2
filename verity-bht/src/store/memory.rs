//! In-memory hash store

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::traits::{HashSink, HashSource};
use super::serve_request;
use crate::geometry::to_bytes;
use crate::io::{ReadCallback, ReadRequest};

/// In-memory hash region
///
/// Mainly used for tests and for producing an image before writing it out.
/// Clones share the same region, so a clone can be installed as a tree's read
/// callback while this handle is kept around to inspect or tamper with.
///
/// Reads complete synchronously, inside the callback.
#[derive(Clone, Default)]
pub struct MemoryHashStore {
    region: Arc<RwLock<Vec<u8>>>,
    reads: Arc<AtomicU64>,
}

impl MemoryHashStore {
    /// Create an empty region
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing hash region bytes
    pub fn from_region(region: Vec<u8>) -> Self {
        Self {
            region: Arc::new(RwLock::new(region)),
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Region size in bytes
    pub fn len(&self) -> usize {
        self.region.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.read().is_empty()
    }

    /// Copy of the whole region
    pub fn snapshot(&self) -> Vec<u8> {
        self.region.read().clone()
    }

    /// Number of read requests served so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn reset_read_count(&self) {
        self.reads.store(0, Ordering::Relaxed);
    }

    /// Flip the bits of `mask` in the byte at `offset`
    ///
    /// Returns false if `offset` lies outside the region.
    pub fn corrupt_byte(&self, offset: usize, mask: u8) -> bool {
        match self.region.write().get_mut(offset) {
            Some(byte) => {
                *byte ^= mask;
                true
            }
            None => false,
        }
    }
}

impl HashSource for MemoryHashStore {
    fn read_entry(&self, start_sector: u64, buf: &mut [u8]) -> io::Result<()> {
        let region = self.region.read();
        let start = to_bytes(start_sector) as usize;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| region.get(start..end))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("sector {} is past the end of the hash region", start_sector),
                )
            })?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

impl HashSink for MemoryHashStore {
    fn write_entry(&mut self, start_sector: u64, page: &[u8]) -> io::Result<()> {
        let mut region = self.region.write();
        let start = to_bytes(start_sector) as usize;
        let end = start + page.len();
        if region.len() < end {
            region.resize(end, 0);
        }
        region[start..end].copy_from_slice(page);
        Ok(())
    }
}

impl<C: ?Sized> ReadCallback<C> for MemoryHashStore {
    fn read(&self, _ctx: &C, request: ReadRequest) -> io::Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        serve_request(self, request)
    }
}
