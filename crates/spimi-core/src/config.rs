//! Build-time options for the compressed layout

use serde::{Deserialize, Serialize};

use crate::codec::GapCodec;
use crate::error::{IndexError, Result};

/// Default number of terms per dictionary block
pub const DEFAULT_BLOCK_SIZE: usize = 8;

/// How the compressed layout is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    /// Terms per dictionary block; one dictionary pointer is stored per block
    pub block_size: usize,
    /// Universal code used for postings gaps
    pub codec: GapCodec,
    /// Front-code each block instead of storing whole terms
    pub front_coding: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            codec: GapCodec::Gamma,
            front_coding: true,
        }
    }
}

impl CompressionOptions {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(IndexError::InvalidOption(
                "block size must be at least 1".to_string(),
            ));
        }
        if self.block_size > u32::MAX as usize {
            return Err(IndexError::InvalidOption(format!(
                "block size {} is too large",
                self.block_size
            )));
        }
        Ok(())
    }
}

/// Written next to a compressed layout so readers need no out-of-band options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutManifest {
    pub version: u32,
    pub options: CompressionOptions,
    pub num_terms: u64,
    pub num_docs: u64,
}

impl LayoutManifest {
    /// Current manifest format version
    pub const VERSION: u32 = 1;

    pub fn new(options: CompressionOptions, num_terms: usize, num_docs: usize) -> Self {
        Self {
            version: Self::VERSION,
            options,
            num_terms: num_terms as u64,
            num_docs: num_docs as u64,
        }
    }
}
