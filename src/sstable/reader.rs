use std::cmp::Ordering;

use snap::raw::Decoder;
use tracing::debug;

use crate::coding::decode_fixed32;
use crate::comparator::BytewiseComparator;
use crate::error::{Error, Result};
use crate::options::{CompressionType, Options};
use crate::sstable::block::Block;
use crate::sstable::filter_block::FilterBlockReader;
use crate::sstable::footer::{BLOCK_TRAILER_SIZE, BlockHandle, Footer, block_checksum};

/// A block as read back from a file: trailer verified, contents
/// decompressed.
#[derive(Debug, Clone)]
pub struct BlockContents {
    pub data: Vec<u8>,
    /// How the block was stored on disk.
    pub compression: CompressionType,
}

/// Read the block at `handle` out of `file`, verify its checksum and
/// undo its compression.
pub fn read_block(file: &[u8], handle: &BlockHandle) -> Result<BlockContents> {
    let start = handle.offset as usize;
    let end = start
        .checked_add(handle.size as usize)
        .filter(|&end| {
            end.checked_add(BLOCK_TRAILER_SIZE)
                .is_some_and(|limit| limit <= file.len())
        })
        .ok_or_else(|| {
            Error::Corruption(format!(
                "block handle {}+{} past end of file ({} bytes)",
                handle.offset,
                handle.size,
                file.len()
            ))
        })?;

    let stored = &file[start..end];
    let trailer = &file[end..end + BLOCK_TRAILER_SIZE];
    let compression = CompressionType::try_from(trailer[0])?;
    let expected = decode_fixed32(&trailer[1..]);
    if block_checksum(stored, compression) != expected {
        return Err(Error::Corruption(format!(
            "block checksum mismatch at offset {}",
            handle.offset
        )));
    }

    let data = match compression {
        CompressionType::None => stored.to_vec(),
        CompressionType::Snappy => Decoder::new()
            .decompress_vec(stored)
            .map_err(|e| Error::Corruption(format!("snappy decompression failed: {e}")))?,
    };
    Ok(BlockContents { data, compression })
}

/// An opened table held in memory. Supports point lookups and full scans.
///
/// On open:
/// 1. Decode the footer from the last 48 bytes
/// 2. Read the index block
/// 3. Read the metaindex block, and the filter block it points to when
///    the options name a filter policy
pub struct Table {
    options: Options,
    file: Vec<u8>,
    footer: Footer,
    index: Block,
    filter: Option<FilterBlockReader>,
}

impl Table {
    pub fn open(options: Options, file: Vec<u8>) -> Result<Self> {
        if file.len() < Footer::SIZE {
            return Err(Error::Corruption(
                "file too short to contain footer".into(),
            ));
        }
        let footer = Footer::decode_from(&file)?;
        let index = Block::new(read_block(&file, &footer.index_handle)?.data)?;

        let mut filter = None;
        if let Some(policy) = options.filter_policy.clone() {
            let metaindex = Block::new(read_block(&file, &footer.metaindex_handle)?.data)?;
            let key = format!("filter.{}", policy.name());
            match metaindex.seek(&BytewiseComparator, key.as_bytes())? {
                Some((found, handle)) if found == key.as_bytes() => {
                    let (handle, _) = BlockHandle::decode_from(&handle)?;
                    let contents = read_block(&file, &handle)?;
                    filter = Some(FilterBlockReader::new(policy, contents.data));
                }
                _ => debug!(filter = %key, "table has no filter block for policy"),
            }
        }

        Ok(Table {
            options,
            file,
            footer,
            index,
            filter,
        })
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn filter(&self) -> Option<&FilterBlockReader> {
        self.filter.as_ref()
    }

    /// Every index entry: (separator key, data block handle).
    pub fn index_entries(&self) -> Result<Vec<(Vec<u8>, BlockHandle)>> {
        self.index
            .iter()
            .map(|entry| {
                let (key, value) = entry?;
                let (handle, _) = BlockHandle::decode_from(value)?;
                Ok((key, handle))
            })
            .collect()
    }

    /// Look up `key`. Data blocks whose filter rules the key out are not read.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let comparator = self.options.comparator.as_ref();
        let Some((_, handle)) = self.index.seek(comparator, key)? else {
            return Ok(None);
        };
        let (handle, _) = BlockHandle::decode_from(&handle)?;

        if let Some(filter) = &self.filter {
            if !filter.key_may_match(handle.offset, key) {
                return Ok(None);
            }
        }

        let block = Block::new(read_block(&self.file, &handle)?.data)?;
        match block.seek(comparator, key)? {
            Some((found, value)) if comparator.compare(&found, key) == Ordering::Equal => {
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    /// All entries of all data blocks, in order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for (_, handle) in self.index_entries()? {
            let block = Block::new(read_block(&self.file, &handle)?.data)?;
            for entry in block.iter() {
                let (key, value) = entry?;
                out.push((key, value.to_vec()));
            }
        }
        Ok(out)
    }
}
