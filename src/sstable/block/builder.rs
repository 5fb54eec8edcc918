use std::cmp::Ordering;
use std::sync::Arc;

use crate::coding::{put_fixed32, put_varint};
use crate::comparator::Comparator;

/// Accumulates sorted key-value pairs and serializes them into a block.
///
/// Keys are prefix-compressed: each entry stores only the suffix that
/// differs from the previous key. Every `restart_interval` entries the full
/// key is written again and its offset recorded as a restart point, so a
/// reader can binary search the restart points and scan forward from one.
///
/// On-disk layout of a block:
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │ Entry 0: [shared(v32)][non_shared(v32)][val_len(v32)]        │
/// │          [key suffix][value]                                  │
/// │ Entry 1: ...                                                  │
/// │ Entry N: ...                                                  │
/// ├──────────────────────────────────────────────────────────────┤
/// │ Restart array: [restart_0(4B)][restart_1(4B)]...              │
/// │ Num restarts (4B)                                             │
/// └──────────────────────────────────────────────────────────────┘
/// ```
pub struct BlockBuilder {
    comparator: Arc<dyn Comparator>,
    restart_interval: usize,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    /// Entries emitted since the last restart point.
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    /// # Panics
    /// Panics if `restart_interval` is 0.
    pub fn new(comparator: Arc<dyn Comparator>, restart_interval: usize) -> Self {
        assert!(restart_interval >= 1, "restart_interval must be >= 1");
        BlockBuilder {
            comparator,
            restart_interval,
            buffer: Vec::new(),
            restarts: vec![0], // First restart point is at offset 0
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Reset the contents as if the builder was just constructed.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// Add a key-value pair to the block.
    ///
    /// # Panics
    /// Panics if `finish` was called since the last `reset`, or if `key` is
    /// not strictly greater than the previously added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.finished, "add called on a finished block");
        assert!(
            self.buffer.is_empty()
                || self.comparator.compare(key, &self.last_key) == Ordering::Greater,
            "keys must be added in strictly increasing order"
        );

        let mut shared = 0;
        if self.counter < self.restart_interval {
            // See how much sharing to do with previous key
            shared = self
                .last_key
                .iter()
                .zip(key.iter())
                .take_while(|(a, b)| a == b)
                .count();
        } else {
            // Restart compression
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }
        let non_shared = key.len() - shared;

        // shared | non_shared | value_len | key suffix | value
        put_varint(&mut self.buffer, shared as u32);
        put_varint(&mut self.buffer, non_shared as u32);
        put_varint(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Finalize the block: append the restart array and its length.
    ///
    /// The returned slice stays valid until the next `reset`.
    pub fn finish(&mut self) -> &[u8] {
        if !self.finished {
            for &restart in &self.restarts {
                put_fixed32(&mut self.buffer, restart);
            }
            put_fixed32(&mut self.buffer, self.restarts.len() as u32);
            self.finished = true;
        }
        &self.buffer
    }

    /// Estimate of the serialized (uncompressed) size of the block so far.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// Whether no entries were added since construction or the last reset.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn restart_interval(&self) -> usize {
        self.restart_interval
    }

    /// Change the restart interval. Takes effect at the next restart point.
    pub fn set_restart_interval(&mut self, restart_interval: usize) {
        assert!(restart_interval >= 1, "restart_interval must be >= 1");
        self.restart_interval = restart_interval;
    }
}
