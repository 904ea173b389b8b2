//! verity-bht: block hash tree verification for read-only block devices
//!
//! A Merkle tree over the fixed-size blocks of a device. The hash entries
//! live on the same untrusted store as the data; only the root digest is
//! trusted. Entries are read lazily through a caller-supplied callback,
//! verified bottom-up against the root, and memoised so that a warm tree
//! checks a block with a single hash.
//!
//! # Core types
//!
//! - **Bht**: the verifier. `populate` issues reads for a block's path,
//!   `verify` checks a block against it.
//! - **ReadCallback / ReadRequest**: the I/O contract. A request owns the
//!   entry's page until `complete` hands it back.
//! - **TreeBuilder**: the producer of hash regions and root digests.
//! - **MemoryHashStore / FileHashStore / KvHashStore**: hash region backends
//!   usable as read callbacks.
//!
//! # Example
//!
//! ```ignore
//! let mut builder = TreeBuilder::new(block_count, HashAlgorithm::Sha256)?;
//! builder.store_from_reader(&mut image)?;
//! builder.compute()?;
//! let store = MemoryHashStore::from_region(builder.region());
//!
//! let mut bht: Bht = Bht::from_config(&builder.config()?)?;
//! bht.set_read_callback(store);
//! bht.check_block(&(), 7, &block_7)?;
//! ```

pub mod bht;
pub mod builder;
pub mod config;
pub mod entry;
pub mod error;
pub mod geometry;
pub mod hash;
pub mod io;
pub mod store;

// bht.rs 导出
pub use bht::Bht;

// builder.rs / config.rs 导出
pub use builder::TreeBuilder;
pub use config::BhtConfig;

// entry.rs 导出
pub use entry::{EntryHandle, EntryState, PageBuf};

// error.rs 导出
pub use error::{BhtError, Result};

// geometry.rs 导出
pub use geometry::{
    Geometry, LevelGeometry, PAGE_SIZE, SECTORS_PER_ENTRY, SECTOR_SHIFT, SECTOR_SIZE,
};

// hash.rs 导出
pub use hash::{HashAlgorithm, HashPool, Salt, MAX_DIGEST_SIZE, SALT_SIZE};

// io.rs 导出
pub use io::{FailingReader, ReadCallback, ReadRequest, ZeroReader};

// store 导出
pub use store::{FileHashStore, HashSink, HashSource, MemoryHashStore};

// kvdb-backend feature 启用时导出 KvHashStore
#[cfg(feature = "kvdb-backend")]
pub use store::KvHashStore;
