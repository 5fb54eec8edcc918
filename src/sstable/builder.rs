use std::cmp::Ordering;

use snap::raw::{Encoder, max_compress_len};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::options::{CompressionType, Options};
use crate::sink::WritableFile;
use crate::sstable::block::BlockBuilder;
use crate::sstable::filter_block::FilterBlockBuilder;
use crate::sstable::footer::{BLOCK_TRAILER_SIZE, BlockHandle, Footer, block_checksum};

/// Builds a table file from a sorted stream of key-value pairs.
///
/// Build process:
/// 1. Add entries one by one (must be in strictly increasing order)
/// 2. Entries fill up data blocks; a block whose size estimate reaches
///    `block_size` is compressed, framed and written to the sink
/// 3. `finish()` flushes the last block, then writes the filter,
///    metaindex and index blocks and the footer
///
/// The index entry of a data block is written only once the first key of
/// the next block is known. For a boundary between "the quick brown fox"
/// and "the who" the index can then hold "the r", which is >= every key of
/// the first block and < every key after it.
///
/// The first sink failure is sticky: every later call returns it without
/// touching the sink again.
pub struct TableBuilder<W: WritableFile> {
    options: Options,
    file: W,
    /// Bytes written to `file` so far.
    offset: u64,
    status: Option<Error>,
    data_block: BlockBuilder,
    /// Restart interval 1: every index key is stored whole.
    index_block: BlockBuilder,
    last_key: Vec<u8>,
    num_entries: u64,
    /// Either `finish()` or `abandon()` has been called.
    closed: bool,
    filter_block: Option<FilterBlockBuilder>,
    /// Invariant: true only if `data_block` is empty.
    pending_index_entry: bool,
    /// Handle to add to the index block.
    pending_handle: BlockHandle,
    /// Scratch space for compressed blocks.
    compressed_output: Vec<u8>,
}

impl<W: WritableFile> TableBuilder<W> {
    /// Create a builder writing into `file`. `options` is snapshotted.
    pub fn new(options: Options, file: W) -> Self {
        let comparator = options.comparator.clone();
        let mut filter_block = options.filter_policy.clone().map(FilterBlockBuilder::new);
        if let Some(fb) = filter_block.as_mut() {
            fb.start_block(0);
        }
        TableBuilder {
            data_block: BlockBuilder::new(comparator.clone(), options.block_restart_interval),
            index_block: BlockBuilder::new(comparator, 1),
            options,
            file,
            offset: 0,
            status: None,
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            filter_block,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            compressed_output: Vec::new(),
        }
    }

    /// Swap in new options for the blocks still to come.
    ///
    /// The comparator may not change mid-table. The filter policy in use is
    /// the one the builder was created with.
    pub fn change_options(&mut self, options: Options) -> Result<()> {
        if options.comparator.name() != self.options.comparator.name() {
            return Err(Error::InvalidArgument(
                "changing comparator while building table".into(),
            ));
        }
        self.data_block
            .set_restart_interval(options.block_restart_interval);
        self.options = options;
        Ok(())
    }

    /// Add a key-value pair. Keys MUST arrive in strictly increasing order.
    ///
    /// # Panics
    /// Panics if the builder is closed or `key` is not greater than the
    /// previously added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.closed, "add called on a closed table builder");
        self.status()?;
        if self.num_entries > 0 {
            assert!(
                self.options.comparator.compare(key, &self.last_key) == Ordering::Greater,
                "keys must be added in strictly increasing order"
            );
        }

        if self.pending_index_entry {
            debug_assert!(self.data_block.is_empty());
            self.options
                .comparator
                .find_shortest_separator(&mut self.last_key, key);
            self.index_block
                .add(&self.last_key, &self.pending_handle.encode());
            self.pending_index_entry = false;
        }

        if let Some(fb) = self.filter_block.as_mut() {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the current data block out, even if it is not full yet.
    ///
    /// Keys on either side of a flush land in different blocks.
    pub fn flush(&mut self) -> Result<()> {
        assert!(!self.closed, "flush called on a closed table builder");
        self.status()?;
        if self.data_block.is_empty() {
            return Ok(());
        }
        assert!(!self.pending_index_entry);

        let written = write_block(
            &mut self.file,
            &mut self.offset,
            &mut self.data_block,
            self.options.compression,
            &mut self.compressed_output,
        );
        self.pending_handle = self.record(written)?;
        self.pending_index_entry = true;

        let flushed = self.file.flush().map_err(Error::from);
        self.record(flushed)?;

        // A new filter range opens wherever the next data block will start.
        if let Some(fb) = self.filter_block.as_mut() {
            fb.start_block(self.offset);
        }
        Ok(())
    }

    /// Finish the table: flush the last block, then write the filter,
    /// metaindex and index blocks and the footer.
    ///
    /// # Panics
    /// Panics if the builder is already closed.
    pub fn finish(&mut self) -> Result<()> {
        let flushed = self.flush();
        self.closed = true;
        flushed?;

        // Filter block goes out uncompressed.
        let filter_handle = match self.filter_block.as_mut() {
            Some(fb) => Some(write_raw_block(
                &mut self.file,
                &mut self.offset,
                fb.finish(),
                CompressionType::None,
            )),
            None => None,
        }
        .transpose();
        let filter_handle = self.record(filter_handle)?;

        // Metaindex block: "filter.<policy name>" -> filter block handle.
        let mut meta_index_block = BlockBuilder::new(
            self.options.comparator.clone(),
            self.options.block_restart_interval,
        );
        if let (Some(fb), Some(handle)) = (self.filter_block.as_ref(), filter_handle) {
            let key = format!("filter.{}", fb.policy_name());
            meta_index_block.add(key.as_bytes(), &handle.encode());
        }
        let written = write_block(
            &mut self.file,
            &mut self.offset,
            &mut meta_index_block,
            self.options.compression,
            &mut self.compressed_output,
        );
        let metaindex_handle = self.record(written)?;

        // The last data block has no successor to derive a separator from.
        if self.pending_index_entry {
            self.options
                .comparator
                .find_short_successor(&mut self.last_key);
            self.index_block
                .add(&self.last_key, &self.pending_handle.encode());
            self.pending_index_entry = false;
        }
        let written = write_block(
            &mut self.file,
            &mut self.offset,
            &mut self.index_block,
            self.options.compression,
            &mut self.compressed_output,
        );
        let index_handle = self.record(written)?;

        let footer = Footer::new(metaindex_handle, index_handle).encode();
        let appended = self.file.append(&footer).map_err(Error::from);
        self.record(appended)?;
        self.offset += footer.len() as u64;

        let flushed = self.file.flush().map_err(Error::from);
        self.record(flushed)?;

        debug!(
            entries = self.num_entries,
            file_size = self.offset,
            metaindex = ?metaindex_handle,
            index = ?index_handle,
            "finished table"
        );
        Ok(())
    }

    /// Stop building without writing anything else. The caller must discard
    /// whatever was already written to the sink.
    ///
    /// # Panics
    /// Panics if the builder is already closed.
    pub fn abandon(&mut self) {
        assert!(!self.closed, "abandon called on a closed table builder");
        self.closed = true;
        debug!(entries = self.num_entries, file_size = self.offset, "abandoned table");
    }

    /// The first error seen by this builder, if any.
    pub fn status(&self) -> Result<()> {
        match &self.status {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Number of `add` calls so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Size of the file generated so far. After a successful `finish`, the
    /// size of the final file.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The sink this builder writes into.
    pub fn sink(&self) -> &W {
        &self.file
    }

    /// Mutable access to the sink, e.g. to sync it after `finish`.
    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.file
    }

    /// Keep the first error; later calls short-circuit on it.
    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.status.is_none() {
                warn!(error = %e, offset = self.offset, "table write failed");
                self.status = Some(e.clone());
            }
        }
        result
    }
}

impl<W: WritableFile> Drop for TableBuilder<W> {
    fn drop(&mut self) {
        // Catch callers that forgot to call finish() or abandon().
        debug_assert!(
            self.closed || std::thread::panicking(),
            "table builder dropped without finish or abandon"
        );
    }
}

/// Finish `block`, compress it if that pays off, write it and reset it.
fn write_block<W: WritableFile>(
    file: &mut W,
    offset: &mut u64,
    block: &mut BlockBuilder,
    compression: CompressionType,
    compressed_output: &mut Vec<u8>,
) -> Result<BlockHandle> {
    let raw = block.finish();
    let (contents, stored_as) = match compression {
        CompressionType::None => (raw, CompressionType::None),
        CompressionType::Snappy => {
            if snappy_compress(raw, compressed_output)
                && compressed_output.len() < raw.len() - raw.len() / 8
            {
                (compressed_output.as_slice(), CompressionType::Snappy)
            } else {
                // Snappy failed, or compressed less than 12.5%, so just
                // store uncompressed form
                (raw, CompressionType::None)
            }
        }
    };
    let raw_len = raw.len();
    let handle = write_raw_block(file, offset, contents, stored_as);
    compressed_output.clear();
    block.reset();

    if let Ok(handle) = &handle {
        debug!(
            offset = handle.offset,
            raw = raw_len,
            stored = handle.size,
            compression = ?stored_as,
            "wrote block"
        );
    }
    handle
}

/// Write `contents` followed by the trailer `[type(1B)][masked crc32(4B)]`.
fn write_raw_block<W: WritableFile>(
    file: &mut W,
    offset: &mut u64,
    contents: &[u8],
    compression: CompressionType,
) -> Result<BlockHandle> {
    let handle = BlockHandle::new(*offset, contents.len() as u64);
    file.append(contents)?;

    let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
    trailer[0] = compression as u8;
    trailer[1..].copy_from_slice(&block_checksum(contents, compression).to_le_bytes());
    file.append(&trailer)?;

    *offset += (contents.len() + BLOCK_TRAILER_SIZE) as u64;
    Ok(handle)
}

fn snappy_compress(raw: &[u8], dst: &mut Vec<u8>) -> bool {
    dst.resize(max_compress_len(raw.len()), 0);
    match Encoder::new().compress(raw, dst) {
        Ok(n) => {
            dst.truncate(n);
            true
        }
        Err(e) => {
            debug!(error = %e, "snappy compression failed, storing raw");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::BloomFilterPolicy;
    use crate::comparator::Comparator;
    use std::sync::Arc;

    fn no_compression() -> Options {
        Options::default().with_compression(CompressionType::None)
    }

    #[test]
    fn empty_table_has_metaindex_index_and_footer() {
        let mut sink = Vec::new();
        let mut builder = TableBuilder::new(no_compression(), &mut sink);
        builder.finish().unwrap();

        // Two empty blocks (restart array [0] + count = 8 bytes) plus trailers.
        let expected = 2 * (8 + BLOCK_TRAILER_SIZE as u64) + Footer::SIZE as u64;
        assert_eq!(builder.file_size(), expected);
        assert_eq!(builder.num_entries(), 0);
        drop(builder);
        assert_eq!(sink.len() as u64, expected);
    }

    #[test]
    fn pending_index_entry_tracks_empty_data_block() {
        let opts = no_compression().with_block_size(1);
        let mut sink = Vec::new();
        let mut builder = TableBuilder::new(opts, &mut sink);

        builder.add(b"a", b"1").unwrap();
        assert!(builder.pending_index_entry);
        assert!(builder.data_block.is_empty());

        builder.add(b"b", b"2").unwrap();
        assert!(builder.pending_index_entry);
        assert!(builder.index_block.current_size_estimate() > 8);

        builder.finish().unwrap();
        assert!(!builder.pending_index_entry);
    }

    #[test]
    fn flush_on_empty_block_is_noop() {
        let mut sink = Vec::new();
        let mut builder = TableBuilder::new(no_compression(), &mut sink);
        builder.flush().unwrap();
        assert_eq!(builder.file_size(), 0);
        assert!(!builder.pending_index_entry);
        builder.abandon();
    }

    #[test]
    fn change_options_rejects_new_comparator() {
        struct Reverse;
        impl Comparator for Reverse {
            fn name(&self) -> &str {
                "test.Reverse"
            }
            fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
                b.cmp(a)
            }
            fn find_shortest_separator(&self, _: &mut Vec<u8>, _: &[u8]) {}
            fn find_short_successor(&self, _: &mut Vec<u8>) {}
        }

        let mut sink = Vec::new();
        let mut builder = TableBuilder::new(Options::default(), &mut sink);
        let err = builder
            .change_options(Options::default().with_comparator(Arc::new(Reverse)))
            .unwrap_err();
        assert!(err.is_invalid_argument());

        builder
            .change_options(Options::default().with_block_size(128))
            .unwrap();
        assert_eq!(builder.options().block_size, 128);
        builder.abandon();
    }

    #[test]
    fn filter_block_opens_bucket_at_zero() {
        let opts = no_compression().with_filter_policy(Arc::new(BloomFilterPolicy::new(10)));
        let mut sink = Vec::new();
        let mut builder = TableBuilder::new(opts, &mut sink);
        assert_eq!(builder.filter_block.as_ref().unwrap().num_filters(), 0);
        builder.abandon();
    }

    #[test]
    #[should_panic(expected = "closed table builder")]
    fn add_after_finish_panics() {
        let mut sink = Vec::new();
        let mut builder = TableBuilder::new(Options::default(), &mut sink);
        builder.finish().unwrap();
        let _ = builder.add(b"late", b"value");
    }

    #[test]
    #[should_panic(expected = "closed table builder")]
    fn double_abandon_panics() {
        let mut sink = Vec::new();
        let mut builder = TableBuilder::new(Options::default(), &mut sink);
        builder.abandon();
        builder.abandon();
    }
}
