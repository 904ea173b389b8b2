//! Bht core struct

use std::fmt;

use log::debug;

use crate::entry::{EntryState, Level};
use crate::error::{BhtError, Result};
use crate::geometry::Geometry;
use crate::hash::{DigestBuf, HashAlgorithm, HashPool, Salt, MAX_DIGEST_SIZE};
use crate::io::{FailingReader, ReadCallback};

// ============================================================================
// Block Hash Tree
// ============================================================================

/// Block hash tree verifier for one device
///
/// # Type parameters
///
/// - `C`: per-request context handed through [`Bht::populate`] to the read
///   callback, e.g. the block I/O that triggered the lookup
///
/// # Lifecycle
///
/// 1. [`Bht::create`] derives the geometry and allocates empty levels.
/// 2. The caller installs a read callback and the trusted root digest.
/// 3. Per block: [`Bht::populate`], wait for [`Bht::is_populated`],
///    then [`Bht::verify`].
///
/// `populate` and `verify` take `&self`; a tree can be shared between
/// threads behind an `Arc`. Entry state changes are atomic, so concurrent
/// requests on overlapping paths issue each read once.
pub struct Bht<C: ?Sized = ()> {
    pub(super) geometry: Geometry,
    pub(super) hasher: HashPool,
    pub(super) root_digest: DigestBuf,
    pub(super) salt: Option<Salt>,
    pub(super) levels: Vec<Level>,
    pub(super) read_cb: Box<dyn ReadCallback<C>>,
}

impl<C: ?Sized> Bht<C> {
    /// Create a tree for `block_count` blocks hashed with the algorithm
    /// named `digest_name`
    ///
    /// Every entry starts unallocated and the installed read callback fails
    /// all reads until [`Bht::set_read_callback`] replaces it.
    pub fn create(block_count: u64, digest_name: &str) -> Result<Self> {
        Self::with_algorithm(block_count, HashAlgorithm::from_name(digest_name)?)
    }

    /// [`Bht::create`] with an already resolved algorithm
    pub fn with_algorithm(block_count: u64, algorithm: HashAlgorithm) -> Result<Self> {
        let digest_size = algorithm.digest_size();
        if digest_size > MAX_DIGEST_SIZE {
            return Err(BhtError::DigestTooLarge(digest_size));
        }
        let geometry = Geometry::new(block_count, digest_size)?;

        let mut levels = Vec::new();
        levels
            .try_reserve_exact(geometry.depth())
            .map_err(|_| BhtError::NoMem)?;
        for level in geometry.levels() {
            // entry_count fits usize, checked by Geometry
            levels.push(Level::new(level.entry_count as usize)?);
        }

        debug!(
            "created {} tree: {} blocks, depth {}, fan-out {}, {} sectors",
            algorithm,
            block_count,
            geometry.depth(),
            geometry.fan_out(),
            geometry.total_sectors()
        );

        Ok(Self {
            geometry,
            hasher: HashPool::new(algorithm),
            root_digest: [0u8; MAX_DIGEST_SIZE],
            salt: None,
            levels,
            read_cb: Box::new(FailingReader),
        })
    }

    /// Install the callback used to read hash entries
    pub fn set_read_callback<R>(&mut self, read_cb: R)
    where
        R: ReadCallback<C> + 'static,
    {
        self.read_cb = Box::new(read_cb);
    }

    // ========== 几何信息访问 ==========

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.geometry.block_count()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.geometry.depth()
    }

    #[inline]
    pub fn digest_size(&self) -> usize {
        self.geometry.digest_size()
    }

    #[inline]
    pub fn fan_out(&self) -> u64 {
        self.geometry.fan_out()
    }

    /// Size of the on-disk hash region, in sectors
    #[inline]
    pub fn total_sectors(&self) -> u64 {
        self.geometry.total_sectors()
    }

    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.hasher.algorithm()
    }

    /// State of the entry `index` at `level`, `None` if out of range
    pub fn entry_state(&self, level: usize, index: u64) -> Option<EntryState> {
        let level = self.levels.get(level)?;
        level
            .entries()
            .get(usize::try_from(index).ok()?)
            .map(|e| e.state())
    }

    // ========== 内部辅助方法 ==========

    pub(super) fn check_block_index(&self, block: u64) -> Result<()> {
        if block >= self.geometry.block_count() {
            return Err(BhtError::invalid(format!(
                "block {} out of range (block count {})",
                block,
                self.geometry.block_count()
            )));
        }
        Ok(())
    }

    /// Drop every memoised verification
    ///
    /// Requires `&mut self`: no request can be walking a path meanwhile.
    pub(super) fn demote_verified(&mut self) {
        let mut demoted = 0usize;
        for level in &self.levels {
            for entry in level.entries() {
                if entry
                    .transition(EntryState::Verified, EntryState::Ready)
                    .is_ok()
                {
                    demoted += 1;
                }
            }
        }
        if demoted > 0 {
            debug!("demoted {} verified entries", demoted);
        }
    }
}

impl<C: ?Sized> fmt::Debug for Bht<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bht")
            .field("algorithm", &self.hasher.algorithm())
            .field("block_count", &self.geometry.block_count())
            .field("depth", &self.geometry.depth())
            .field("fan_out", &self.geometry.fan_out())
            .field("salted", &self.salt.is_some())
            .finish()
    }
}
