use std::fmt;
use std::sync::Arc;

use crate::bloom::FilterPolicy;
use crate::comparator::{BytewiseComparator, Comparator};
use crate::error::{Error, Result};

/// Block compression, stored as the one-byte tag in every block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Snappy = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Snappy),
            _ => Err(Error::Corruption(format!(
                "invalid compression type: {value}"
            ))),
        }
    }
}

/// Knobs for building a table. Cloned into the builder as a snapshot.
#[derive(Clone)]
pub struct Options {
    /// Ordering of keys. Must not change while a table is being built.
    pub comparator: Arc<dyn Comparator>,
    /// Optional per-block membership filter.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
    /// Uncompressed size at which a data block is cut.
    pub block_size: usize,
    /// Number of entries between restart points in a data block.
    pub block_restart_interval: usize,
    pub compression: CompressionType,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            comparator: Arc::new(BytewiseComparator),
            filter_policy: None,
            block_size: 4096,
            block_restart_interval: 16,
            compression: CompressionType::Snappy,
        }
    }
}

impl Options {
    pub fn with_comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_filter_policy(mut self, policy: Arc<dyn FilterPolicy>) -> Self {
        self.filter_policy = Some(policy);
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field("filter_policy", &self.filter_policy.as_ref().map(|p| p.name()))
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("compression", &self.compression)
            .finish()
    }
}
