use crc32fast::Hasher;

use crate::coding::{get_varint, put_varint};
use crate::error::{Error, Result};
use crate::options::CompressionType;

/// Magic number closing every table file.
pub const TABLE_MAGIC: u64 = 0xdb47_7524_8b80_fb57;

/// Bytes following each block: compression tag (1B) + masked crc32 (4B).
pub const BLOCK_TRAILER_SIZE: usize = 5;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Checksum stored in a block trailer: crc32 over the stored bytes and the
/// compression tag, masked so that checksums of data that itself embeds
/// checksums stay well distributed.
pub fn block_checksum(contents: &[u8], compression: CompressionType) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    hasher.update(&[compression as u8]);
    mask(hasher.finalize())
}

fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Locates a block within the file: where it starts and how many bytes it
/// stores, trailer excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    /// Maximum encoding length: two varint64s.
    pub const MAX_ENCODED_LENGTH: usize = 10 + 10;

    pub fn new(offset: u64, size: u64) -> Self {
        BlockHandle { offset, size }
    }

    /// Append the encoding `[offset(v64)][size(v64)]` to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint(dst, self.offset);
        put_varint(dst, self.size);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::MAX_ENCODED_LENGTH);
        self.encode_to(&mut buf);
        buf
    }

    /// Decode a handle from the front of `data`, returning (handle, bytes_consumed).
    pub fn decode_from(data: &[u8]) -> Result<(Self, usize)> {
        let (offset, n) = get_varint::<u64>(data, "block handle")?;
        let (size, m) = get_varint::<u64>(&data[n..], "block handle")?;
        Ok((BlockHandle { offset, size }, n + m))
    }
}

/// The footer sits at the end of the table file. It is the only entry point
/// for reading a table: it tells the reader where to find the metaindex and
/// index blocks.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Metaindex handle (varints)           │
/// │ Index handle (varints)               │
/// │ Zero padding up to 40 bytes          │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footer {
    pub metaindex_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 2 * BlockHandle::MAX_ENCODED_LENGTH + 8; // 48 bytes

    pub fn new(metaindex_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Footer {
            metaindex_handle,
            index_handle,
        }
    }

    /// Encode footer to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.metaindex_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        buf.resize(2 * BlockHandle::MAX_ENCODED_LENGTH, 0); // Padding
        buf.extend_from_slice(&TABLE_MAGIC.to_le_bytes());
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf
    }

    /// Decode footer from bytes.
    pub fn decode_from(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corruption("footer too short".into()));
        }
        let data = &data[data.len() - Self::SIZE..];

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[Self::SIZE - 8..]);
        let magic = u64::from_le_bytes(magic);
        if magic != TABLE_MAGIC {
            return Err(Error::Corruption(format!(
                "bad magic: expected {TABLE_MAGIC:#x}, got {magic:#x}"
            )));
        }

        let (metaindex_handle, n) = BlockHandle::decode_from(data)?;
        let (index_handle, _) = BlockHandle::decode_from(&data[n..])?;
        Ok(Footer {
            metaindex_handle,
            index_handle,
        })
    }
}
