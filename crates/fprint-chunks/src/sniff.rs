//! Trailing-signature check
//!
//! MCAP writers append a fixed magic as the very last bytes of a file, so a
//! file that ends in it is complete. Anything else (a different format, a
//! writer still mid-flush) is `NotRecognized`.

use fprint_core::config::MCAP_SIGNATURE;
use fprint_core::Classification;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SniffError {
    #[error("sniffing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is {size} bytes, shorter than the {needed}-byte signature", path.display())]
    TooSmall {
        path: PathBuf,
        size: u64,
        needed: u64,
    },
}

#[derive(Debug, Clone)]
pub struct Sniffer {
    signature: Vec<u8>,
}

impl Sniffer {
    pub fn new(signature: impl Into<Vec<u8>>) -> Self {
        Self {
            signature: signature.into(),
        }
    }

    /// Sniffer for the MCAP trailing magic `MCAP0\r\n`
    pub fn mcap() -> Self {
        Self::new(MCAP_SIGNATURE.as_bytes())
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Compare the last `signature.len()` bytes of `path` with the signature.
    pub fn sniff(&self, path: &Path) -> Result<Classification, SniffError> {
        let io_err = |source| SniffError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        let needed = self.signature.len() as u64;

        if size < needed {
            return Err(SniffError::TooSmall {
                path: path.to_path_buf(),
                size,
                needed,
            });
        }

        file.seek(SeekFrom::Start(size - needed)).map_err(io_err)?;

        let mut window = Vec::with_capacity(self.signature.len());
        file.take(needed).read_to_end(&mut window).map_err(io_err)?;

        // A short read (file truncated since stat) simply fails the comparison
        if window == self.signature {
            Ok(Classification::Recognized)
        } else {
            Ok(Classification::NotRecognized)
        }
    }
}

impl Default for Sniffer {
    fn default() -> Self {
        Self::mcap()
    }
}

/// Sniff `path` for the MCAP signature.
pub fn sniff(path: &Path) -> Result<Classification, SniffError> {
    Sniffer::mcap().sniff(path)
}
