//! Hash region storage
//!
//! Backends for the bytes of a hash region, usable both as the producer's
//! output ([`HashSink`]) and as a tree's read callback:
//! - `MemoryHashStore`: in-memory region, for tests and image building
//! - `FileHashStore`: region inside a file or block device
//! - `KvHashStore`: one kvdb value per entry (requires the `kvdb-backend` feature)

mod file;
mod memory;
mod traits;

#[cfg(feature = "kvdb-backend")]
mod kvdb;


use std::io;

use log::warn;

use crate::io::ReadRequest;

pub use file::FileHashStore;
pub use memory::MemoryHashStore;
pub use traits::{HashSink, HashSource};

#[cfg(feature = "kvdb-backend")]
pub use kvdb::KvHashStore;

/// Serve a read request synchronously from `source` and complete it
pub(crate) fn serve_request<S: HashSource + ?Sized>(
    source: &S,
    mut request: ReadRequest,
) -> io::Result<()> {
    let start = request.start_sector();
    let status = source.read_entry(start, request.buffer_mut());
    if let Err(e) = &status {
        warn!("hash store read at sector {} failed: {}", start, e);
    }
    request
        .complete(status)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
