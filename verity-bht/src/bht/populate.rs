//! Population: issue reads for the entries on a block's path

use log::{debug, warn};

use crate::entry::{alloc_page, EntryState};
use crate::error::{BhtError, Result};
use crate::geometry::SECTORS_PER_ENTRY;
use crate::io::ReadRequest;

use super::core::Bht;

impl<C: ?Sized> Bht<C> {
    /// Issue reads for every unloaded entry on `block`'s path
    ///
    /// Walks from the leaf level toward the apex and stops at the first
    /// verified entry. Unallocated entries are claimed, given a page and
    /// handed to the read callback; pending and ready entries are skipped.
    /// Returns as soon as the reads are issued, with the number issued.
    ///
    /// # Errors
    ///
    /// - `Io` / `Mismatch` if an entry on the path is already poisoned
    /// - `NoMem` if a page could not be allocated; entries claimed earlier
    ///   on the path keep their reads
    /// - `InvalidArgument` if `block` is out of range
    pub fn populate(&self, ctx: &C, block: u64) -> Result<usize> {
        self.check_block_index(block)?;

        let mut issued = 0;
        for level in (0..self.geometry.depth()).rev() {
            let index = self.geometry.entry_index(level, block);
            let entry = self.levels[level].entry(index);

            let mut state = entry.state();
            if state == EntryState::Unallocated {
                match entry.transition(EntryState::Unallocated, EntryState::Pending) {
                    Ok(()) => {
                        let page = match alloc_page() {
                            Ok(page) => page,
                            Err(e) => {
                                entry.set_state(EntryState::Unallocated);
                                return Err(e);
                            }
                        };
                        let sector = self.geometry.sector_of(level, index);
                        debug!(
                            "populate block {}: reading entry (level {}, index {}) at sector {}",
                            block, level, index, sector
                        );
                        let request = ReadRequest::new(
                            self.levels[level].handle(level, index),
                            sector,
                            SECTORS_PER_ENTRY,
                            page,
                        );
                        issued += 1;
                        if let Err(e) = self.read_cb.read(ctx, request) {
                            warn!(
                                "read callback failed for entry (level {}, index {}): {}",
                                level, index, e
                            );
                        }
                        continue;
                    }
                    // Another request claimed it first
                    Err(found) => state = found,
                }
            }

            match state {
                EntryState::Verified => break,
                EntryState::IoError => return Err(BhtError::Io { level, index }),
                EntryState::Mismatch => return Err(BhtError::Mismatch { level, index }),
                _ => {}
            }
        }
        Ok(issued)
    }

    /// True iff every entry on `block`'s path is ready or verified
    ///
    /// Out-of-range blocks are never populated.
    pub fn is_populated(&self, block: u64) -> bool {
        if block >= self.geometry.block_count() {
            return false;
        }
        for level in (0..self.geometry.depth()).rev() {
            let index = self.geometry.entry_index(level, block);
            match self.levels[level].entry(index).state() {
                EntryState::Verified => return true,
                EntryState::Ready => {}
                _ => return false,
            }
        }
        true
    }
}
