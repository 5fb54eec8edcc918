// Filter block tests with the real bloom policy.

use std::sync::Arc;

use lsm_table::sstable::filter_block::{FILTER_BASE_LG, FilterBlockBuilder, FilterBlockReader};
use lsm_table::{BloomFilterPolicy, FilterPolicy};

fn policy() -> Arc<dyn FilterPolicy> {
    Arc::new(BloomFilterPolicy::new(10))
}

#[test]
fn default_base_is_2kb() {
    assert_eq!(FILTER_BASE_LG, 11);
    let mut builder = FilterBlockBuilder::new(policy());
    let block = builder.finish();
    assert_eq!(*block.last().unwrap(), 11);
}

#[test]
fn every_added_key_matches_its_bucket() {
    let mut builder = FilterBlockBuilder::new(policy());
    let mut placed = Vec::new();

    // Blocks of ~700 bytes: several blocks share each 2KB bucket.
    let mut offset = 0u64;
    for block in 0..30u32 {
        builder.start_block(offset);
        for i in 0..20u32 {
            let key = format!("block{block:03}_key{i:03}");
            builder.add_key(key.as_bytes());
            placed.push((offset, key));
        }
        offset += 700;
    }

    let reader = FilterBlockReader::new(policy(), builder.finish().to_vec());
    assert_eq!(reader.num_filters() as u64, (offset - 700) / 2048 + 1);
    for (offset, key) in &placed {
        assert!(reader.key_may_match(*offset, key.as_bytes()), "{key} at {offset}");
    }
}

#[test]
fn gaps_produce_empty_filters() {
    let mut builder = FilterBlockBuilder::new(policy());
    builder.start_block(0);
    builder.add_key(b"first");
    builder.start_block(10 * 2048);
    builder.add_key(b"last");
    let block = builder.finish().to_vec();

    let reader = FilterBlockReader::new(policy(), block.clone());
    assert_eq!(reader.num_filters(), 11);
    for bucket in 1..10u64 {
        assert!(!reader.key_may_match(bucket * 2048, b"first"));
        assert!(!reader.key_may_match(bucket * 2048, b"last"));
    }
    assert!(reader.key_may_match(0, b"first"));
    assert!(reader.key_may_match(10 * 2048, b"last"));

    // Two real filters (9 bytes each), eleven offsets, array start, base_lg
    assert_eq!(block.len(), 2 * 9 + 11 * 4 + 4 + 1);
}

#[test]
fn custom_base_lg_is_recorded() {
    let mut builder = FilterBlockBuilder::with_base_lg(policy(), 4);
    builder.start_block(0);
    builder.add_key(b"a");
    builder.start_block(16);
    builder.add_key(b"b");
    let reader = FilterBlockReader::new(policy(), builder.finish().to_vec());

    assert_eq!(reader.num_filters(), 2);
    assert!(reader.key_may_match(0, b"a"));
    assert!(reader.key_may_match(16, b"b"));
    assert!(!reader.key_may_match(0, b"b"));
}
