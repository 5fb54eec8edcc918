use std::cmp::Ordering;

use crate::coding::{decode_fixed32, get_varint};
use crate::comparator::Comparator;
use crate::error::{Error, Result};

/// A decoded (uncompressed) block. See `BlockBuilder` for the layout.
///
/// Supports a forward scan over all entries and a seek to the first entry
/// at or after a key, using the restart array to skip ahead.
#[derive(Debug, Clone)]
pub struct Block {
    data: Vec<u8>,
    /// Offset of the restart array; entries live in `data[..restart_offset]`.
    restart_offset: usize,
    num_restarts: usize,
}

impl Block {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Corruption("block too short".into()));
        }
        let num_restarts = decode_fixed32(&data[data.len() - 4..]) as usize;
        let max_restarts = (data.len() - 4) / 4;
        if num_restarts > max_restarts {
            return Err(Error::Corruption(format!(
                "block claims {num_restarts} restarts, room for {max_restarts}"
            )));
        }
        let restart_offset = data.len() - 4 - num_restarts * 4;
        let block = Block {
            data,
            restart_offset,
            num_restarts,
        };
        for i in 0..num_restarts {
            let restart = block.restart_point(i) as usize;
            if restart > restart_offset {
                return Err(Error::Corruption(format!(
                    "restart point {restart} past entries ({restart_offset} bytes)"
                )));
            }
        }
        Ok(block)
    }

    /// Byte offsets of the entries that store a full key.
    pub fn restart_points(&self) -> Vec<u32> {
        (0..self.num_restarts).map(|i| self.restart_point(i)).collect()
    }

    /// Iterate over every `(key, value)` pair in order.
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            block: self,
            offset: 0,
            key: Vec::new(),
            failed: false,
        }
    }

    /// First entry whose key is `>= target`, or `None` if every key is smaller.
    pub fn seek(
        &self,
        comparator: &dyn Comparator,
        target: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        // Binary search for the last restart point with key < target.
        let mut left = 0;
        let mut right = self.num_restarts;
        while left + 1 < right {
            let mid = (left + right) / 2;
            let mut key = Vec::new();
            self.decode_entry(self.restart_point(mid) as usize, &mut key)?;
            if comparator.compare(&key, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid;
            }
        }

        let mut iter = BlockIter {
            block: self,
            offset: if self.num_restarts == 0 {
                self.restart_offset
            } else {
                self.restart_point(left) as usize
            },
            key: Vec::new(),
            failed: false,
        };
        for entry in &mut iter {
            let (key, value) = entry?;
            if comparator.compare(&key, target) != Ordering::Less {
                return Ok(Some((key, value.to_vec())));
            }
        }
        Ok(None)
    }

    fn restart_point(&self, index: usize) -> u32 {
        let at = self.restart_offset + index * 4;
        decode_fixed32(&self.data[at..at + 4])
    }

    /// Decode the entry at `offset`, rebuilding its key into `key` (which
    /// must hold the previous key). Returns the value range and next offset.
    fn decode_entry(&self, offset: usize, key: &mut Vec<u8>) -> Result<(usize, usize, usize)> {
        let entries = &self.data[..self.restart_offset];
        if offset >= entries.len() {
            return Err(Error::Corruption(format!(
                "block entry offset {offset} past entries ({} bytes)",
                entries.len()
            )));
        }
        let mut pos = offset;
        let (shared, n) = get_varint::<u32>(&entries[pos..], "block entry")?;
        pos += n;
        let (non_shared, n) = get_varint::<u32>(&entries[pos..], "block entry")?;
        pos += n;
        let (value_len, n) = get_varint::<u32>(&entries[pos..], "block entry")?;
        pos += n;

        let (shared, non_shared, value_len) =
            (shared as usize, non_shared as usize, value_len as usize);
        if shared > key.len() || pos + non_shared + value_len > entries.len() {
            return Err(Error::Corruption(format!("bad block entry at offset {offset}")));
        }

        key.truncate(shared);
        key.extend_from_slice(&entries[pos..pos + non_shared]);
        let value_start = pos + non_shared;
        Ok((value_start, value_start + value_len, value_start + value_len))
    }
}

/// Forward iterator over a block. Stops after the first corrupt entry.
pub struct BlockIter<'a> {
    block: &'a Block,
    offset: usize,
    key: Vec<u8>,
    failed: bool,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Result<(Vec<u8>, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.block.restart_offset {
            return None;
        }
        match self.block.decode_entry(self.offset, &mut self.key) {
            Ok((value_start, value_end, next)) => {
                self.offset = next;
                let block: &'a Block = self.block;
                Some(Ok((self.key.clone(), &block.data[value_start..value_end])))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
