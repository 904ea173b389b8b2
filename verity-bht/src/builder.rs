//! Hash tree producer
//!
//! Builds the on-disk hash region for an image: leaf digests per data block,
//! then every upper level bottom-up, then the root digest. The region uses
//! the same geometry and hashing as the verifier, so a [`Bht`] reading it
//! back with the produced root digest accepts every block.
//!
//! [`Bht`]: crate::Bht

use std::io::Read;

use log::{debug, info};

use crate::config::BhtConfig;
use crate::error::{BhtError, Result};
use crate::geometry::{Geometry, PAGE_SIZE};
use crate::hash::{DigestBuf, HashAlgorithm, HashPool, Salt, MAX_DIGEST_SIZE};
use crate::store::HashSink;

/// Producer of a hash region
///
/// # Example
///
/// ```ignore
/// let mut builder = TreeBuilder::new(block_count, HashAlgorithm::Sha256)?;
/// builder.store_from_reader(&mut image)?;
/// builder.compute()?;
/// builder.sync(&mut store)?;
/// println!("{}", builder.table_args()?);
/// ```
pub struct TreeBuilder {
    geometry: Geometry,
    hasher: HashPool,
    salt: Option<Salt>,
    /// Level pages, `entry_count * PAGE_SIZE` bytes each, apex first
    levels: Vec<Vec<u8>>,
    root_digest: Option<DigestBuf>,
}

impl TreeBuilder {
    pub fn new(block_count: u64, algorithm: HashAlgorithm) -> Result<Self> {
        let digest_size = algorithm.digest_size();
        if digest_size > MAX_DIGEST_SIZE {
            return Err(BhtError::DigestTooLarge(digest_size));
        }
        let geometry = Geometry::new(block_count, digest_size)?;

        let mut levels = Vec::with_capacity(geometry.depth());
        for level in geometry.levels() {
            let bytes = usize::try_from(level.entry_count)
                .ok()
                .and_then(|n| n.checked_mul(PAGE_SIZE))
                .ok_or_else(|| BhtError::Overflow("level does not fit in memory".into()))?;
            let mut pages = Vec::new();
            pages.try_reserve_exact(bytes).map_err(|_| BhtError::NoMem)?;
            pages.resize(bytes, 0u8);
            levels.push(pages);
        }

        Ok(Self {
            geometry,
            hasher: HashPool::new(algorithm),
            salt: None,
            levels,
            root_digest: None,
        })
    }

    /// [`TreeBuilder::new`] with the algorithm given by name
    pub fn create(block_count: u64, digest_name: &str) -> Result<Self> {
        Self::new(block_count, HashAlgorithm::from_name(digest_name)?)
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.hasher.algorithm()
    }

    /// Set the salt; an empty string clears it
    ///
    /// Digests already stored were taken with the old salt; set the salt
    /// before storing blocks.
    pub fn set_salt_hex(&mut self, hex_salt: &str) -> Result<()> {
        self.salt = if hex_salt.trim().is_empty() {
            None
        } else {
            Some(Salt::from_hex(hex_salt)?)
        };
        self.root_digest = None;
        Ok(())
    }

    #[inline]
    pub fn salt(&self) -> Option<&Salt> {
        self.salt.as_ref()
    }

    /// Record the digest of data block `block`
    pub fn store_block(&mut self, block: u64, data: &[u8]) -> Result<()> {
        if block >= self.geometry.block_count() {
            return Err(BhtError::invalid(format!(
                "block {} out of range (block count {})",
                block,
                self.geometry.block_count()
            )));
        }
        if data.len() != PAGE_SIZE {
            return Err(BhtError::invalid(format!(
                "block buffer is {} bytes, expected {}",
                data.len(),
                PAGE_SIZE
            )));
        }

        let leaf = self.geometry.leaf_level();
        let digest = self.hasher.digest(data, self.salt.as_ref());
        let offset = self.geometry.entry_index(leaf, block) as usize * PAGE_SIZE;
        let slot = self.geometry.node_range(leaf, block);
        let ds = self.geometry.digest_size();
        self.levels[leaf][offset + slot.start..offset + slot.end].copy_from_slice(&digest[..ds]);
        self.root_digest = None;
        Ok(())
    }

    /// Read and hash `block_count` consecutive pages from `reader`
    pub fn store_from_reader<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<()> {
        let mut page = vec![0u8; PAGE_SIZE];
        for block in 0..self.geometry.block_count() {
            reader.read_exact(&mut page).map_err(|e| {
                BhtError::storage(format!("reading data block {}: {}", block, e))
            })?;
            self.store_block(block, &page)?;
        }
        debug!("hashed {} data blocks", self.geometry.block_count());
        Ok(())
    }

    /// Fill every upper level from the one below it and derive the root
    ///
    /// Slots past the last child of an under-full entry stay zero.
    pub fn compute(&mut self) -> Result<()> {
        let ds = self.geometry.digest_size();
        let shift = self.geometry.fan_out_shift();
        let mask = self.geometry.fan_out() - 1;

        for level in (1..self.geometry.depth()).rev() {
            let (upper, lower) = self.levels.split_at_mut(level);
            let parent = &mut upper[level - 1];
            for (index, page) in lower[0].chunks_exact(PAGE_SIZE).enumerate() {
                let index = index as u64;
                let digest = self.hasher.digest(page, self.salt.as_ref());
                let offset = (index >> shift) as usize * PAGE_SIZE + (index & mask) as usize * ds;
                parent[offset..offset + ds].copy_from_slice(&digest[..ds]);
            }
        }

        let apex = &self.levels[0][..PAGE_SIZE];
        self.root_digest = Some(self.hasher.digest(apex, self.salt.as_ref()));
        info!(
            "computed {} tree over {} blocks: root {}",
            self.hasher.algorithm(),
            self.geometry.block_count(),
            self.root_hex_digest()?
        );
        Ok(())
    }

    /// Root digest; `NotSet` until [`TreeBuilder::compute`] has run since
    /// the last change
    pub fn root_digest(&self) -> Result<&[u8]> {
        self.root_digest
            .as_ref()
            .map(|d| &d[..self.geometry.digest_size()])
            .ok_or(BhtError::NotSet("root digest"))
    }

    pub fn root_hex_digest(&self) -> Result<String> {
        self.root_digest().map(hex::encode)
    }

    /// The hash region exactly as it is laid out on disk
    pub fn region(&self) -> Vec<u8> {
        self.levels.concat()
    }

    /// Write every entry to `sink` at its sector, then flush
    pub fn sync<S: HashSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        self.root_digest()?;
        for (level, pages) in self.levels.iter().enumerate() {
            for (index, page) in pages.chunks_exact(PAGE_SIZE).enumerate() {
                let sector = self.geometry.sector_of(level, index as u64);
                sink.write_entry(sector, page).map_err(|e| {
                    BhtError::storage(format!(
                        "writing entry (level {}, index {}): {}",
                        level, index, e
                    ))
                })?;
            }
        }
        sink.flush()?;
        debug!(
            "wrote {} entries ({} sectors)",
            self.geometry.total_entries(),
            self.geometry.total_sectors()
        );
        Ok(())
    }

    /// Configuration a verifier needs for this tree
    pub fn config(&self) -> Result<BhtConfig> {
        Ok(BhtConfig {
            algorithm: self.hasher.algorithm().name().to_string(),
            block_count: self.geometry.block_count(),
            root_hexdigest: self.root_hex_digest()?,
            salt: self.salt.as_ref().map(Salt::to_hex),
        })
    }

    /// Verity target arguments, `hashstart=… alg=… root_hexdigest=… [salt=…]`
    pub fn table_args(&self) -> Result<String> {
        Ok(self.config()?.to_table_args())
    }
}
