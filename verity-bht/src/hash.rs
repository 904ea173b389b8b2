//! Hash primitive layer
//!
//! Resolves the named digest used by a tree and hashes pages through a small
//! pool of reusable contexts. Producer and verifier must agree on the name;
//! every digest covers exactly one page followed by the salt, when one is set.

use std::fmt;
use std::str::FromStr;

use digest::DynDigest;
use parking_lot::Mutex;

use crate::error::{BhtError, Result};

/// Upper bound on the digest length of any supported algorithm
pub const MAX_DIGEST_SIZE: usize = 64;

/// Salt length in bytes; a set salt is always this long
pub const SALT_SIZE: usize = 32;

/// Named hash primitives a tree can be built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Blake2b512,
    Blake2s256,
}

impl HashAlgorithm {
    /// All supported algorithms
    pub const ALL: [HashAlgorithm; 7] = [
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake2b512,
        HashAlgorithm::Blake2s256,
    ];

    /// Resolve an algorithm by its short ASCII name (case-insensitive)
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| BhtError::BadAlgorithm(name.to_string()))
    }

    /// Canonical name, as written into device tables
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake2b512 => "blake2b512",
            HashAlgorithm::Blake2s256 => "blake2s256",
        }
    }

    /// Output length in bytes
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 | HashAlgorithm::Blake2s256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 | HashAlgorithm::Blake2b512 => 64,
        }
    }

    fn new_context(&self) -> Box<dyn DynDigest + Send> {
        match self {
            HashAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            HashAlgorithm::Sha224 => Box::new(sha2::Sha224::default()),
            HashAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
            HashAlgorithm::Sha384 => Box::new(sha2::Sha384::default()),
            HashAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
            HashAlgorithm::Blake2b512 => Box::new(blake2::Blake2b512::default()),
            HashAlgorithm::Blake2s256 => Box::new(blake2::Blake2s256::default()),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = BhtError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Digest output buffer, valid up to the algorithm's digest size
pub type DigestBuf = [u8; MAX_DIGEST_SIZE];

/// Pool of reusable hash contexts
///
/// Stands in for one context per CPU: a hashing thread takes an idle context
/// (or makes a fresh one), resets it, and hands it back afterwards. At most
/// one idle context per available CPU is retained.
pub struct HashPool {
    algorithm: HashAlgorithm,
    idle: Mutex<Vec<Box<dyn DynDigest + Send>>>,
    max_idle: usize,
}

impl HashPool {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let max_idle = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            algorithm,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    #[inline]
    pub fn digest_size(&self) -> usize {
        self.algorithm.digest_size()
    }

    /// Hash `page` followed by `salt` (if any) into a fresh digest buffer
    ///
    /// Only the first `digest_size()` bytes of the result are meaningful.
    pub fn digest(&self, page: &[u8], salt: Option<&Salt>) -> DigestBuf {
        let mut out = [0u8; MAX_DIGEST_SIZE];
        let mut ctx = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| self.algorithm.new_context());

        ctx.reset();
        ctx.update(page);
        if let Some(salt) = salt {
            ctx.update(salt.as_bytes());
        }
        let digest = ctx.finalize_reset();
        out[..digest.len()].copy_from_slice(&digest);

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(ctx);
        }
        out
    }
}

impl fmt::Debug for HashPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashPool")
            .field("algorithm", &self.algorithm)
            .field("idle", &self.idle.lock().len())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

/// Salt appended to every hashed page
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Parse up to `2 * SALT_SIZE` hex characters
    ///
    /// Shorter input is zero padded, longer input truncated, and a trailing
    /// odd nibble ignored.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim().as_bytes();
        let usable = (hex.len() / 2).min(SALT_SIZE) * 2;
        let mut salt = [0u8; SALT_SIZE];
        hex::decode_to_slice(&hex[..usable], &mut salt[..usable / 2])
            .map_err(|e| BhtError::invalid(format!("malformed salt hex: {}", e)))?;
        Ok(Salt(salt))
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Salt(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.to_hex())
    }
}
