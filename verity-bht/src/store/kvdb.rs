//! kvdb-backed hash store

#![cfg(feature = "kvdb-backend")]

use std::io;
use std::sync::Arc;

use kvdb::{DBTransaction, KeyValueDB};

use super::traits::{HashSink, HashSource};
use super::serve_request;
use crate::io::{ReadCallback, ReadRequest};

/// Key prefix: hash entry page
const KEY_PREFIX_ENTRY: u8 = 0x00;

/// Hash region kept in a kvdb column, one value per entry
///
/// Key format: `[prefix: 1B][tree_id: 8B big-endian][start_sector: 8B big-endian]`
///
/// `tree_id` keeps the regions of several trees apart within one column.
///
/// # Example
///
/// ```ignore
/// let db = Arc::new(kvdb_memorydb::create(1));
/// let mut store = KvHashStore::new(db, 0, 1);
/// builder.sync(&mut store)?;
/// bht.set_read_callback(store);
/// ```
pub struct KvHashStore {
    db: Arc<dyn KeyValueDB>,
    col: u32,
    tree_id: u64,
}

impl KvHashStore {
    /// Create a new store
    ///
    /// # Parameters
    /// - `db`: kvdb backend (RocksDB, MDBX, memory, ...)
    /// - `col`: column holding the pages
    /// - `tree_id`: namespace for this tree's pages
    pub fn new(db: Arc<dyn KeyValueDB>, col: u32, tree_id: u64) -> Self {
        Self { db, col, tree_id }
    }

    pub fn tree_id(&self) -> u64 {
        self.tree_id
    }

    /// Key format: `[0x00][tree_id: 8B][start_sector: 8B]` = 17 bytes
    fn make_key(&self, start_sector: u64) -> [u8; 17] {
        let mut key = [0u8; 17];
        key[0] = KEY_PREFIX_ENTRY;
        key[1..9].copy_from_slice(&self.tree_id.to_be_bytes());
        key[9..17].copy_from_slice(&start_sector.to_be_bytes());
        key
    }
}

impl HashSource for KvHashStore {
    fn read_entry(&self, start_sector: u64, buf: &mut [u8]) -> io::Result<()> {
        let key = self.make_key(start_sector);
        match self.db.get(self.col, &key)? {
            Some(bytes) if bytes.len() == buf.len() => {
                buf.copy_from_slice(&bytes);
                Ok(())
            }
            Some(bytes) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "entry at sector {} holds {} bytes, expected {}",
                    start_sector,
                    bytes.len(),
                    buf.len()
                ),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no entry stored at sector {}", start_sector),
            )),
        }
    }
}

impl HashSink for KvHashStore {
    fn write_entry(&mut self, start_sector: u64, page: &[u8]) -> io::Result<()> {
        let key = self.make_key(start_sector);
        let mut tx = DBTransaction::new();
        tx.put(self.col, &key, page);
        self.db.write(tx)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.db.flush()
    }
}

impl<C: ?Sized> ReadCallback<C> for KvHashStore {
    fn read(&self, _ctx: &C, request: ReadRequest) -> io::Result<()> {
        serve_request(self, request)
    }
}
