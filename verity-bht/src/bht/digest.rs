//! Root digest and salt configuration

use crate::error::{BhtError, Result};
use crate::hash::{Salt, MAX_DIGEST_SIZE};

use super::core::Bht;

impl<C: ?Sized> Bht<C> {
    // ========== 根摘要 ==========

    /// Set the trusted root digest from exactly `2 * digest_size` hex chars
    ///
    /// Any memoised verification is dropped.
    pub fn set_root_hex_digest(&mut self, hex_digest: &str) -> Result<()> {
        let ds = self.digest_size();
        if hex_digest.len() != 2 * ds {
            return Err(BhtError::invalid(format!(
                "root digest must be {} hex characters, got {}",
                2 * ds,
                hex_digest.len()
            )));
        }
        let mut digest = [0u8; MAX_DIGEST_SIZE];
        hex::decode_to_slice(hex_digest, &mut digest[..ds])
            .map_err(|e| BhtError::invalid(format!("malformed root digest: {}", e)))?;
        self.root_digest = digest;
        self.demote_verified();
        Ok(())
    }

    /// Binary form of [`Bht::set_root_hex_digest`]
    pub fn set_root_digest(&mut self, digest: &[u8]) -> Result<()> {
        let ds = self.digest_size();
        if digest.len() != ds {
            return Err(BhtError::invalid(format!(
                "root digest must be {} bytes, got {}",
                ds,
                digest.len()
            )));
        }
        self.root_digest = [0u8; MAX_DIGEST_SIZE];
        self.root_digest[..ds].copy_from_slice(digest);
        self.demote_verified();
        Ok(())
    }

    #[inline]
    pub fn root_digest(&self) -> &[u8] {
        &self.root_digest[..self.digest_size()]
    }

    pub fn root_hex_digest(&self) -> String {
        hex::encode(self.root_digest())
    }

    /// Write the root digest as NUL-terminated hex into `buf`
    ///
    /// Returns the hex length, excluding the terminator. Fails with
    /// `ShortBuffer` if `buf` holds fewer than `2 * digest_size + 1` bytes.
    pub fn write_root_hex_digest(&self, buf: &mut [u8]) -> Result<usize> {
        write_hex_nul(self.root_digest(), buf)
    }

    // ========== 盐值 ==========

    /// Set the salt from hex, zero padded or truncated to the salt size
    ///
    /// An empty string clears the salt. Any memoised verification is dropped.
    pub fn set_salt_hex(&mut self, hex_salt: &str) -> Result<()> {
        let salt = if hex_salt.trim().is_empty() {
            None
        } else {
            Some(Salt::from_hex(hex_salt)?)
        };
        self.set_salt(salt);
        Ok(())
    }

    pub fn set_salt(&mut self, salt: Option<Salt>) {
        self.salt = salt;
        self.demote_verified();
    }

    #[inline]
    pub fn salt(&self) -> Option<&Salt> {
        self.salt.as_ref()
    }

    pub fn salt_hex(&self) -> Result<String> {
        self.salt
            .as_ref()
            .map(Salt::to_hex)
            .ok_or(BhtError::NotSet("salt"))
    }

    /// Write the salt as NUL-terminated hex into `buf`
    ///
    /// `buf` must hold `2 * SALT_SIZE + 1` bytes.
    pub fn write_salt_hex(&self, buf: &mut [u8]) -> Result<usize> {
        let salt = self.salt.as_ref().ok_or(BhtError::NotSet("salt"))?;
        write_hex_nul(salt.as_bytes(), buf)
    }
}

fn write_hex_nul(bytes: &[u8], buf: &mut [u8]) -> Result<usize> {
    let len = 2 * bytes.len();
    if buf.len() < len + 1 {
        return Err(BhtError::ShortBuffer {
            needed: len + 1,
            available: buf.len(),
        });
    }
    hex::encode_to_slice(bytes, &mut buf[..len])
        .map_err(|e| BhtError::invalid(e.to_string()))?;
    buf[len] = 0;
    Ok(len)
}
