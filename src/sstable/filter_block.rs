//! The filter block holds one filter per 2KB range of data-block file
//! offsets. A lookup maps the data block's offset to its range and asks
//! only that filter.
//!
//! ```text
//! [filter 0]
//! [filter 1]
//! ...
//! [filter N-1]
//! [offset of filter 0 (4B)]
//! ...
//! [offset of filter N-1 (4B)]
//! [offset of the offset array (4B)]
//! [base_lg (1B)]
//! ```

use std::sync::Arc;

use tracing::trace;

use crate::bloom::FilterPolicy;
use crate::coding::{decode_fixed32, put_fixed32};

/// Generate a new filter every 2^FILTER_BASE_LG bytes of data.
pub const FILTER_BASE_LG: u8 = 11;

/// Builds every filter of one table into a single block.
///
/// Calls must follow `(start_block add_key*)* finish`.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    base_lg: u8,
    /// Flattened key contents for the open bucket.
    keys: Vec<u8>,
    /// Start of each key in `keys`.
    starts: Vec<usize>,
    /// Filters generated so far, then the trailer once finished.
    result: Vec<u8>,
    /// Start of each filter in `result`.
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self::with_base_lg(policy, FILTER_BASE_LG)
    }

    /// Use buckets of `2^base_lg` bytes instead of the default.
    pub fn with_base_lg(policy: Arc<dyn FilterPolicy>, base_lg: u8) -> Self {
        assert!(base_lg < 64, "base_lg must be < 64");
        FilterBlockBuilder {
            policy,
            base_lg,
            keys: Vec::new(),
            starts: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Open the bucket covering `block_offset`, closing every bucket before it.
    ///
    /// # Panics
    /// Panics if `block_offset` maps to a bucket that was already closed.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = (block_offset >> self.base_lg) as usize;
        assert!(
            filter_index >= self.filter_offsets.len(),
            "start_block offsets must not go backwards"
        );
        while filter_index > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.starts.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Close the last bucket and append the offset trailer.
    pub fn finish(&mut self) -> &[u8] {
        if !self.starts.is_empty() {
            self.generate_filter();
        }

        let array_offset = self.result.len() as u32;
        for &offset in &self.filter_offsets {
            put_fixed32(&mut self.result, offset);
        }
        put_fixed32(&mut self.result, array_offset);
        self.result.push(self.base_lg); // Save encoding parameter in result
        &self.result
    }

    /// Name of the policy building the filters.
    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Number of buckets closed so far.
    pub fn num_filters(&self) -> usize {
        self.filter_offsets.len()
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.starts.is_empty() {
            // Fast path if there are no keys for this filter
            return;
        }

        let keys: Vec<&[u8]> = self
            .starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let limit = self.starts.get(i + 1).copied().unwrap_or(self.keys.len());
                &self.keys[start..limit]
            })
            .collect();
        let before = self.result.len();
        self.policy.create_filter(&keys, &mut self.result);
        trace!(
            filter = self.filter_offsets.len() - 1,
            keys = keys.len(),
            bytes = self.result.len() - before,
            "generated filter"
        );

        self.keys.clear();
        self.starts.clear();
    }
}

/// Answers membership queries against a serialized filter block.
///
/// A malformed block is not an error: it just filters nothing.
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Vec<u8>,
    /// Start of the offset array in `data`.
    offset_start: usize,
    num: usize,
    base_lg: u8,
}

impl FilterBlockReader {
    pub fn new(policy: Arc<dyn FilterPolicy>, contents: Vec<u8>) -> Self {
        let mut reader = FilterBlockReader {
            policy,
            data: Vec::new(),
            offset_start: 0,
            num: 0,
            base_lg: 0,
        };
        let n = contents.len();
        if n < 5 {
            return reader; // 1 byte for base_lg and 4 for start of offset array
        }
        let last_word = decode_fixed32(&contents[n - 5..]) as usize;
        if last_word > n - 5 {
            return reader;
        }
        reader.base_lg = contents[n - 1];
        reader.offset_start = last_word;
        reader.num = (n - 5 - last_word) / 4;
        reader.data = contents;
        reader
    }

    pub fn num_filters(&self) -> usize {
        self.num
    }

    /// Whether `key` may be in the data block starting at `block_offset`.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = block_offset.checked_shr(self.base_lg as u32).unwrap_or(0) as usize;
        if index >= self.num {
            return true; // No coverage; cannot rule the key out
        }

        let at = self.offset_start + index * 4;
        let start = decode_fixed32(&self.data[at..]) as usize;
        // The entry after the last filter offset is the array start itself.
        let limit = decode_fixed32(&self.data[at + 4..]) as usize;
        if start == limit {
            // Empty filters do not match any keys
            return false;
        }
        if start < limit && limit <= self.offset_start {
            return self.policy.key_may_match(key, &self.data[start..limit]);
        }
        true // Errors are treated as potential matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records keys verbatim so tests can see exactly what each filter got.
    struct TestHashFilter;

    impl FilterPolicy for TestHashFilter {
        fn name(&self) -> &str {
            "TestHashFilter"
        }

        fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
            for key in keys {
                put_fixed32(dst, xxhash_rust::xxh32::xxh32(key, 1));
            }
        }

        fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
            let h = xxhash_rust::xxh32::xxh32(key, 1);
            filter.chunks_exact(4).any(|c| decode_fixed32(c) == h)
        }
    }

    fn policy() -> Arc<dyn FilterPolicy> {
        Arc::new(TestHashFilter)
    }

    #[test]
    fn empty_builder() {
        let mut builder = FilterBlockBuilder::new(policy());
        let block = builder.finish().to_vec();
        assert_eq!(block, [0, 0, 0, 0, 11]);

        let reader = FilterBlockReader::new(policy(), block);
        assert_eq!(reader.num_filters(), 0);
        assert!(reader.key_may_match(0, b"foo"));
        assert!(reader.key_may_match(100_000, b"foo"));
    }

    #[test]
    fn single_chunk() {
        let mut builder = FilterBlockBuilder::new(policy());
        builder.start_block(100);
        builder.add_key(b"foo");
        builder.add_key(b"bar");
        builder.add_key(b"box");
        builder.start_block(200);
        builder.add_key(b"box");
        builder.start_block(300);
        builder.add_key(b"hello");
        let block = builder.finish().to_vec();

        let reader = FilterBlockReader::new(policy(), block);
        assert!(reader.key_may_match(100, b"foo"));
        assert!(reader.key_may_match(100, b"bar"));
        assert!(reader.key_may_match(100, b"box"));
        assert!(reader.key_may_match(100, b"hello"));
        assert!(reader.key_may_match(100, b"foo"));
        assert!(!reader.key_may_match(100, b"missing"));
        assert!(!reader.key_may_match(100, b"other"));
    }

    #[test]
    fn multi_chunk() {
        let mut builder = FilterBlockBuilder::new(policy());

        // First filter
        builder.start_block(0);
        builder.add_key(b"foo");
        builder.start_block(2000);
        builder.add_key(b"bar");

        // Second filter
        builder.start_block(3100);
        builder.add_key(b"box");

        // Third filter is empty

        // Last filter
        builder.start_block(9000);
        builder.add_key(b"box");
        builder.add_key(b"hello");

        let block = builder.finish().to_vec();
        let reader = FilterBlockReader::new(policy(), block);
        assert_eq!(reader.num_filters(), 5);

        // Check first filter
        assert!(reader.key_may_match(0, b"foo"));
        assert!(reader.key_may_match(2000, b"bar"));
        assert!(!reader.key_may_match(0, b"box"));
        assert!(!reader.key_may_match(0, b"hello"));

        // Check second filter
        assert!(reader.key_may_match(3100, b"box"));
        assert!(!reader.key_may_match(3100, b"foo"));
        assert!(!reader.key_may_match(3100, b"bar"));
        assert!(!reader.key_may_match(3100, b"hello"));

        // Check third filter (empty)
        assert!(!reader.key_may_match(4100, b"foo"));
        assert!(!reader.key_may_match(4100, b"bar"));
        assert!(!reader.key_may_match(4100, b"box"));
        assert!(!reader.key_may_match(4100, b"hello"));

        // Check last filter
        assert!(reader.key_may_match(9000, b"box"));
        assert!(reader.key_may_match(9000, b"hello"));
        assert!(!reader.key_may_match(9000, b"foo"));
        assert!(!reader.key_may_match(9000, b"bar"));

        // Past the last filter: no coverage
        assert!(reader.key_may_match(20_000, b"anything"));
    }

    #[test]
    #[should_panic(expected = "must not go backwards")]
    fn start_block_going_backwards_panics() {
        let mut builder = FilterBlockBuilder::new(policy());
        builder.start_block(5000);
        builder.start_block(100);
    }

    #[test]
    fn short_or_inconsistent_contents_filter_nothing() {
        let reader = FilterBlockReader::new(policy(), vec![1, 2, 3]);
        assert_eq!(reader.num_filters(), 0);
        assert!(reader.key_may_match(0, b"foo"));

        // Offset array claims to start past the end.
        let reader = FilterBlockReader::new(policy(), vec![0xff, 0, 0, 0, 11]);
        assert_eq!(reader.num_filters(), 0);
        assert!(reader.key_may_match(0, b"foo"));
    }

    #[test]
    fn corrupt_offsets_match_everything() {
        // One filter whose offset points past the offset array.
        let mut block = Vec::new();
        put_fixed32(&mut block, 3); // filter 0 starts at 3, array starts at 0
        put_fixed32(&mut block, 0);
        block.push(11);
        let reader = FilterBlockReader::new(policy(), block);
        assert_eq!(reader.num_filters(), 1);
        assert!(reader.key_may_match(0, b"foo"));
    }
}
