//! # Sorted table write path
//!
//! Turns a stream of strictly increasing key/value pairs into an immutable,
//! block-structured table file.
//!
//! ## Core idea
//! Keys are packed into prefix-compressed data blocks. Each block is framed
//! with a compression tag and a checksum, and indexed by a short separator
//! key. A per-file-region bloom filter lets point lookups skip data blocks
//! that provably do not hold the key.
//!
//! ```text
//! [data block 0] ... [data block N] [filter block] [metaindex block] [index block] [footer]
//! ```

pub mod bloom;
pub mod coding;
pub mod comparator;
pub mod error;
pub mod options;
pub mod sink;
pub mod sstable;

// Public re-exports for the top-level API
pub use bloom::{BLOOM_POLICY_NAME, BloomFilterPolicy, FilterPolicy};
pub use comparator::{BytewiseComparator, Comparator};
pub use error::{Error, Result};
pub use options::{CompressionType, Options};
pub use sink::{FileSink, WritableFile};
pub use sstable::builder::TableBuilder;
pub use sstable::reader::Table;
