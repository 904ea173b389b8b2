//! Verifier configuration
//!
//! The values a verifier needs to open a tree: algorithm, block count, root
//! digest and optional salt. Serializable with serde for embedding in a host
//! configuration file, and convertible to and from the verity target
//! argument form:
//!
//! ```text
//! payload=/dev/sda1 hashtree=/dev/sda1 hashstart=2097152 alg=sha256 \
//!     root_hexdigest=9f74809a… salt=5b2a…
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bht::Bht;
use crate::error::{BhtError, Result};
use crate::geometry::SECTORS_PER_ENTRY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BhtConfig {
    /// Hash algorithm name, e.g. `sha256`
    pub algorithm: String,
    /// Number of data blocks
    pub block_count: u64,
    /// Trusted root digest in hex
    pub root_hexdigest: String,
    /// Salt in hex; absent for an unsalted tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl BhtConfig {
    /// Parse verity target arguments
    ///
    /// Recognises `alg=`, `root_hexdigest=`, `salt=` and `hashstart=`. The
    /// hash region starts right after the data, so `hashstart` (in sectors)
    /// gives the block count. Other keys and bare words are ignored.
    pub fn from_table_args(args: &str) -> Result<Self> {
        let mut algorithm = None;
        let mut root_hexdigest = None;
        let mut salt = None;
        let mut hashstart = None;

        for arg in args.split_whitespace() {
            let (key, value) = match arg.split_once('=') {
                Some(kv) => kv,
                None => {
                    debug!("ignoring table argument '{}'", arg);
                    continue;
                }
            };
            match key {
                "alg" => algorithm = Some(value.to_string()),
                "root_hexdigest" => root_hexdigest = Some(value.to_string()),
                "salt" => salt = Some(value.to_string()),
                "hashstart" => {
                    let sectors: u64 = value.parse().map_err(|_| {
                        BhtError::invalid(format!("hashstart '{}' is not a sector count", value))
                    })?;
                    hashstart = Some(sectors);
                }
                _ => debug!("ignoring table argument '{}'", arg),
            }
        }

        let hashstart = hashstart.ok_or_else(|| BhtError::invalid("missing hashstart="))?;
        if hashstart % SECTORS_PER_ENTRY != 0 {
            return Err(BhtError::invalid(format!(
                "hashstart {} is not block aligned",
                hashstart
            )));
        }

        Ok(Self {
            algorithm: algorithm.ok_or_else(|| BhtError::invalid("missing alg="))?,
            block_count: hashstart / SECTORS_PER_ENTRY,
            root_hexdigest: root_hexdigest
                .ok_or_else(|| BhtError::invalid("missing root_hexdigest="))?,
            salt: salt.filter(|s| !s.is_empty()),
        })
    }

    /// Render as verity target arguments
    pub fn to_table_args(&self) -> String {
        let mut args = format!(
            "hashstart={} alg={} root_hexdigest={}",
            self.block_count * SECTORS_PER_ENTRY,
            self.algorithm,
            self.root_hexdigest
        );
        if let Some(salt) = &self.salt {
            args.push_str(" salt=");
            args.push_str(salt);
        }
        args
    }
}

impl<C: ?Sized> Bht<C> {
    /// Create a tree and install the root digest and salt from `config`
    pub fn from_config(config: &BhtConfig) -> Result<Self> {
        let mut bht = Self::create(config.block_count, &config.algorithm)?;
        bht.set_root_hex_digest(&config.root_hexdigest)?;
        if let Some(salt) = &config.salt {
            bht.set_salt_hex(salt)?;
        }
        Ok(bht)
    }

    /// Configuration describing this tree
    pub fn config(&self) -> BhtConfig {
        BhtConfig {
            algorithm: self.algorithm().name().to_string(),
            block_count: self.block_count(),
            root_hexdigest: self.root_hex_digest(),
            salt: self.salt().map(|s| s.to_hex()),
        }
    }
}
