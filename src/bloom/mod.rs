use std::f64::consts::LN_2;

use xxhash_rust::xxh32::xxh32;

/// Builds a compact summary of a key set and answers "definitely absent"
/// or "possibly present" against it.
///
/// Filters are persisted, so a policy must keep reading filters written by
/// older configurations of itself.
pub trait FilterPolicy: Send + Sync {
    /// Stored in the table's metaindex block. Change it whenever the
    /// encoding changes incompatibly.
    fn name(&self) -> &str;

    /// Append a filter summarizing `keys` to `dst`.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);

    /// Must return true for every key passed to the `create_filter` call
    /// that produced `filter`. May return true for other keys too.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Probe counts above this are reserved for other encodings.
const MAX_PROBES: usize = 30;

/// Seed for the bloom hash.
const BLOOM_SEED: u32 = 0xbc9f_1d34;

/// Bloom filter policy.
///
/// - If any probed bit is 0 → key is DEFINITELY NOT in the set
/// - If all probed bits are 1 → key is PROBABLY in the set
///
/// Sizing:
///   num_probes = bits_per_key * ln(2)
///
///   10 bits/key → 7 probes, ~1% false positives
///
/// Hash trick: don't need k independent hash functions. One 32-bit hash
/// `h` and `delta = h.rotate_right(17)` give probe `i` at `h + i * delta`.
///
/// Filter layout: `[bit array][num_probes: u8]`.
#[derive(Debug, Clone)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    num_probes: usize,
}

impl BloomFilterPolicy {
    pub fn new(bits_per_key: usize) -> Self {
        let num_probes = ((bits_per_key as f64) * LN_2).round() as usize;
        BloomFilterPolicy {
            bits_per_key,
            num_probes: num_probes.clamp(1, MAX_PROBES),
        }
    }

    pub fn bits_per_key(&self) -> usize {
        self.bits_per_key
    }

    /// Probes written into filters this policy creates.
    pub fn num_probes(&self) -> usize {
        self.num_probes
    }
}

/// Metaindex name of filters built by [`BloomFilterPolicy`]. The layout
/// matches LevelDB's builtin bloom filter but the probe hash is xxh32, so
/// the name must differ from LevelDB's.
pub const BLOOM_POLICY_NAME: &str = "lsm_table.BloomFilterXxh32";

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &str {
        BLOOM_POLICY_NAME
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        // Tiny key sets get a floor of 64 bits, or the false positive rate
        // is terrible.
        let bits = (keys.len() * self.bits_per_key).max(64);
        let bytes = bits.div_ceil(8);
        let bits = bytes * 8;

        let init_size = dst.len();
        dst.resize(init_size + bytes, 0);
        // Remember # of probes in filter
        dst.push(self.num_probes as u8);

        let array = &mut dst[init_size..init_size + bytes];
        for key in keys {
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.num_probes {
                let bitpos = (h as usize) % bits;
                array[bitpos / 8] |= 1 << (bitpos % 8);
                h = h.wrapping_add(delta);
            }
        }
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }

        let (array, tail) = filter.split_at(filter.len() - 1);
        let bits = array.len() * 8;

        // Use the encoded k so we can read filters built with other
        // parameters.
        let k = tail[0] as usize;
        if k > MAX_PROBES {
            // Reserved for newer encodings of short filters. Consider it a match.
            return true;
        }

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bitpos = (h as usize) % bits;
            if array[bitpos / 8] & (1 << (bitpos % 8)) == 0 {
                return false; // Definitely not in set
            }
            h = h.wrapping_add(delta);
        }

        true // Probably in set
    }
}

fn bloom_hash(key: &[u8]) -> u32 {
    xxh32(key, BLOOM_SEED)
}
