//! File-backed hash store

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use super::traits::{HashSink, HashSource};
use super::serve_request;
use crate::geometry::to_bytes;
use crate::io::{ReadCallback, ReadRequest};

/// Hash region stored in a file or block device
///
/// `base_sector` places the region inside the file, e.g. after the data
/// blocks when hashes are colocated with the payload.
pub struct FileHashStore {
    file: Mutex<File>,
    base_sector: u64,
}

impl FileHashStore {
    pub fn new(file: File, base_sector: u64) -> Self {
        Self {
            file: Mutex::new(file),
            base_sector,
        }
    }

    /// Open an existing region read-only
    pub fn open(path: impl AsRef<Path>, base_sector: u64) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?, base_sector))
    }

    /// Open (creating if needed) a region for writing
    pub fn create(path: impl AsRef<Path>, base_sector: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::new(file, base_sector))
    }

    #[inline]
    pub fn base_sector(&self) -> u64 {
        self.base_sector
    }

    pub fn into_inner(self) -> File {
        self.file.into_inner()
    }

    fn offset_of(&self, start_sector: u64) -> io::Result<u64> {
        self.base_sector
            .checked_add(start_sector)
            .filter(|s| s.leading_zeros() >= 9)
            .map(to_bytes)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "sector offset overflows"))
    }
}

impl HashSource for FileHashStore {
    fn read_entry(&self, start_sector: u64, buf: &mut [u8]) -> io::Result<()> {
        let offset = self.offset_of(start_sector)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

impl HashSink for FileHashStore {
    fn write_entry(&mut self, start_sector: u64, page: &[u8]) -> io::Result<()> {
        let offset = self.offset_of(start_sector)?;
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page)
    }

    fn flush(&mut self) -> io::Result<()> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_data()
    }
}

impl<C: ?Sized> ReadCallback<C> for FileHashStore {
    fn read(&self, _ctx: &C, request: ReadRequest) -> io::Result<()> {
        serve_request(self, request)
    }
}
