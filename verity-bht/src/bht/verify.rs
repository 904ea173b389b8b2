//! Verification: recompute a block's path and compare against the root

use log::{debug, error};

use crate::entry::{Entry, EntryState};
use crate::error::{BhtError, Result};
use crate::geometry::PAGE_SIZE;

use super::core::Bht;

impl<C: ?Sized> Bht<C> {
    /// Check `data` against the tree
    ///
    /// Every entry on the path must be loaded (see [`Bht::is_populated`]).
    /// A block that disagrees with its leaf slot moves the leaf entry to
    /// `Mismatch`, whether or not it was verified before, so every block
    /// under that entry fails from then on.
    /// The block's digest is compared with its slot in the leaf entry, then
    /// each unverified entry's digest with its slot in the parent, up to the
    /// first verified ancestor or to the root digest. Only once the whole
    /// chain matched are the entries marked verified, top-down, so a later
    /// block under them stops hashing there.
    ///
    /// # Errors
    ///
    /// - `Mismatch` naming the entry whose digest disagreed
    /// - `Io` / `Mismatch` if an entry on the path is already poisoned
    /// - `NotPopulated` if a read on the path is still outstanding
    /// - `InvalidArgument` for an out-of-range block or a buffer that is not
    ///   exactly one page
    pub fn verify(&self, block: u64, data: &[u8]) -> Result<()> {
        self.check_block_index(block)?;
        if data.len() != PAGE_SIZE {
            return Err(BhtError::invalid(format!(
                "block buffer is {} bytes, expected {}",
                data.len(),
                PAGE_SIZE
            )));
        }

        let geometry = &self.geometry;
        let leaf = geometry.leaf_level();

        // Levels top..=leaf need hashing; top - 1 (if any) is verified.
        let mut top = 0;
        for level in (0..=leaf).rev() {
            let index = geometry.entry_index(level, block);
            let state = self.levels[level].entry(index).state();
            match state {
                EntryState::Verified => {
                    top = level + 1;
                    break;
                }
                EntryState::Ready => {}
                EntryState::IoError | EntryState::Mismatch => {
                    return Err(BhtError::from_state(state, level, index)
                        .unwrap_or(BhtError::NotPopulated(block)));
                }
                EntryState::Unallocated | EntryState::Pending => {
                    return Err(BhtError::NotPopulated(block));
                }
            }
        }

        let ds = geometry.digest_size();
        let salt = self.salt.as_ref();

        // The data block against its slot in the leaf entry
        let leaf_index = geometry.entry_index(leaf, block);
        let leaf_entry = self.levels[leaf].entry(leaf_index);
        let leaf_page = Self::loaded_page(leaf_entry, block)?;
        let computed = self.hasher.digest(data, salt);
        let expected = &leaf_page[geometry.node_range(leaf, block)];
        if expected != &computed[..ds] {
            report_mismatch(block, leaf, leaf_index, expected, &computed[..ds]);
            leaf_entry.poison();
            return Err(BhtError::Mismatch {
                level: leaf,
                index: leaf_index,
            });
        }

        // Each unverified entry against its parent's slot, or the root
        for level in (top..=leaf).rev() {
            let index = geometry.entry_index(level, block);
            let entry = self.levels[level].entry(index);
            let computed = self.hasher.digest(Self::loaded_page(entry, block)?, salt);

            let expected = if level == 0 {
                &self.root_digest[..ds]
            } else {
                let parent_index = geometry.entry_index(level - 1, block);
                let parent = self.levels[level - 1].entry(parent_index);
                &Self::loaded_page(parent, block)?[geometry.node_range(level - 1, block)]
            };

            if expected != &computed[..ds] {
                report_mismatch(block, level, index, expected, &computed[..ds]);
                let _ = entry.transition(EntryState::Ready, EntryState::Mismatch);
                return Err(BhtError::Mismatch { level, index });
            }
        }

        for level in top..=leaf {
            let index = geometry.entry_index(level, block);
            // Losing the race to a concurrent verifier is fine.
            let _ = self.levels[level]
                .entry(index)
                .transition(EntryState::Ready, EntryState::Verified);
        }
        if top <= leaf {
            debug!("block {}: verified levels {}..={}", block, top, leaf);
        }
        Ok(())
    }

    /// Populate, then verify
    ///
    /// For synchronous read callbacks, where every read has completed by the
    /// time `populate` returns. With an asynchronous callback this reports
    /// `NotPopulated` until the outstanding reads complete.
    pub fn check_block(&self, ctx: &C, block: u64, data: &[u8]) -> Result<()> {
        self.populate(ctx, block)?;
        self.verify(block, data)
    }

    fn loaded_page(entry: &Entry, block: u64) -> Result<&[u8]> {
        entry.page().ok_or(BhtError::NotPopulated(block))
    }
}

fn report_mismatch(block: u64, level: usize, index: u64, expected: &[u8], computed: &[u8]) {
    error!(
        "digest mismatch for block {} at entry (level {}, index {}): expected {} computed {}",
        block,
        level,
        index,
        hex::encode(expected),
        hex::encode(computed)
    );
}
