//! Tree shape derived from the block count and digest size
//!
//! Levels are numbered from the apex: level 0 holds the single entry whose
//! digest is compared against the root digest, level `depth - 1` holds the
//! digests of the data blocks themselves. Entries are addressed purely by
//! arithmetic on `(level, block)`; there are no links between entries.

use std::ops::Range;

use log::debug;

use crate::error::{BhtError, Result};

/// Size of a data block and of a hash entry
pub const PAGE_SIZE: usize = 4096;

pub const SECTOR_SHIFT: u32 = 9;

/// Unit of `start_sector` / `sector_count` in read requests
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;

/// Sectors occupied by one entry on disk
pub const SECTORS_PER_ENTRY: u64 = (PAGE_SIZE >> SECTOR_SHIFT) as u64;

/// Convert a byte count to sectors (rounding down)
#[inline]
pub fn to_sectors(bytes: u64) -> u64 {
    bytes >> SECTOR_SHIFT
}

/// Convert a sector count to bytes
#[inline]
pub fn to_bytes(sectors: u64) -> u64 {
    sectors << SECTOR_SHIFT
}

/// Per-level shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelGeometry {
    /// Number of entries at this level
    pub entry_count: u64,
    /// Offset of the level's first entry within the hash region, in sectors
    pub first_sector: u64,
}

/// Shape of a block hash tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    block_count: u64,
    digest_size: usize,
    fan_out: u64,
    fan_out_shift: u32,
    levels: Vec<LevelGeometry>,
    total_sectors: u64,
}

impl Geometry {
    /// Derive the geometry for `block_count` blocks hashed with a digest of
    /// `digest_size` bytes
    ///
    /// Any digest size that fits at least two digests in a page is accepted
    /// here; the cap on supported algorithms is enforced when a tree is
    /// created.
    pub fn new(block_count: u64, digest_size: usize) -> Result<Self> {
        if digest_size == 0 || PAGE_SIZE / digest_size < 2 {
            return Err(BhtError::DigestTooLarge(digest_size));
        }
        if block_count == 0 {
            return Err(BhtError::invalid("block_count must be non-zero"));
        }

        // Round the per-page digest count down to a power of two.
        let nodes_per_page = (PAGE_SIZE / digest_size) as u64;
        let fan_out_shift = u64::BITS - 1 - nodes_per_page.leading_zeros();
        let fan_out = 1u64 << fan_out_shift;

        let last_block = block_count - 1;
        let index_bits = u64::BITS - last_block.leading_zeros();
        let depth = index_bits.div_ceil(fan_out_shift).max(1);
        if depth * fan_out_shift >= u64::BITS {
            return Err(BhtError::Overflow(format!(
                "depth {} with fan-out shift {} exceeds the block index range",
                depth, fan_out_shift
            )));
        }

        let mut levels = Vec::with_capacity(depth as usize);
        let mut total_sectors: u64 = 0;
        for level in 0..depth {
            let shift = (depth - level) * fan_out_shift;
            let entry_count = (last_block >> shift) + 1;
            if usize::try_from(entry_count).is_err() {
                return Err(BhtError::Overflow(format!(
                    "level {} needs {} entries",
                    level, entry_count
                )));
            }
            let level_sectors = entry_count.checked_mul(SECTORS_PER_ENTRY).ok_or_else(|| {
                BhtError::Overflow(format!("level {} sector count overflows", level))
            })?;
            let first_sector = total_sectors;
            total_sectors = total_sectors.checked_add(level_sectors).ok_or_else(|| {
                BhtError::Overflow(format!("level {} sector offset overflows", level))
            })?;
            debug!(
                "level {}: {} entries at sector {}",
                level, entry_count, first_sector
            );
            levels.push(LevelGeometry {
                entry_count,
                first_sector,
            });
        }

        Ok(Self {
            block_count,
            digest_size,
            fan_out,
            fan_out_shift,
            levels,
            total_sectors,
        })
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    #[inline]
    pub fn digest_size(&self) -> usize {
        self.digest_size
    }

    /// Digests per entry
    #[inline]
    pub fn fan_out(&self) -> u64 {
        self.fan_out
    }

    #[inline]
    pub fn fan_out_shift(&self) -> u32 {
        self.fan_out_shift
    }

    /// Number of levels, including the apex and the leaf level
    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn levels(&self) -> &[LevelGeometry] {
        &self.levels
    }

    /// # Panics
    ///
    /// If `level >= depth()`; see [`Geometry::get_level`].
    #[inline]
    pub fn level(&self, level: usize) -> &LevelGeometry {
        &self.levels[level]
    }

    #[inline]
    pub fn get_level(&self, level: usize) -> Option<&LevelGeometry> {
        self.levels.get(level)
    }

    /// Size of the on-disk hash region in sectors
    #[inline]
    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    #[inline]
    pub fn leaf_level(&self) -> usize {
        self.depth() - 1
    }

    /// Total number of entries over all levels
    pub fn total_entries(&self) -> u64 {
        self.levels.iter().map(|l| l.entry_count).sum()
    }

    /// Index of the entry at `level` on `block`'s path
    ///
    /// This and the per-level queries below expect `level < depth()`; larger
    /// levels panic or give a meaningless index. `block` is not range checked.
    /// [`Geometry::get_level`] is the checked way to look up a level.
    ///
    /// # Panics
    ///
    /// If `level > depth()`, and in debug builds if `level == depth()`.
    #[inline]
    pub fn entry_index(&self, level: usize, block: u64) -> u64 {
        debug_assert!(level < self.depth());
        let shift = (self.depth() - level) as u32 * self.fan_out_shift;
        block >> shift
    }

    /// Slot within the `level` entry holding the digest of `block`'s path
    /// child one level down (the data block itself at the leaf level)
    ///
    /// # Panics
    ///
    /// If `level >= depth()`.
    #[inline]
    pub fn node_index(&self, level: usize, block: u64) -> usize {
        let shift = (self.depth() - 1 - level) as u32 * self.fan_out_shift;
        ((block >> shift) & (self.fan_out - 1)) as usize
    }

    /// Byte range of that slot inside the entry page
    #[inline]
    pub fn node_range(&self, level: usize, block: u64) -> Range<usize> {
        let start = self.node_index(level, block) * self.digest_size;
        start..start + self.digest_size
    }

    /// First sector of an entry within the hash region
    ///
    /// # Panics
    ///
    /// If `level >= depth()`.
    #[inline]
    pub fn sector_of(&self, level: usize, entry_index: u64) -> u64 {
        self.levels[level].first_sector + entry_index * SECTORS_PER_ENTRY
    }

    /// Byte offset of an entry within the hash region
    #[inline]
    pub fn byte_offset_of(&self, level: usize, entry_index: u64) -> u64 {
        to_bytes(self.sector_of(level, entry_index))
    }
}
