//! Hash store traits

use std::io;

/// Synchronous read access to a hash region
///
/// Offsets are in 512-byte sectors relative to the start of the region.
pub trait HashSource: Send + Sync {
    /// Fill `buf` from `start_sector` onward
    ///
    /// # Errors
    /// Reading past the end of the region or a backend failure.
    fn read_entry(&self, start_sector: u64, buf: &mut [u8]) -> io::Result<()>;
}

/// Write access to a hash region, used by the producer
///
/// # Core operations
///
/// - `write_entry`: store one page at its sector offset
/// - `flush`: push buffered writes down to the backend
pub trait HashSink {
    /// Store `page` at `start_sector`
    fn write_entry(&mut self, start_sector: u64, page: &[u8]) -> io::Result<()>;

    /// For in-memory stores this is a no-op.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
