use std::cmp::Ordering;

/// Total order over keys, plus the two key-shortening hooks the table
/// builder uses to keep index blocks small.
pub trait Comparator: Send + Sync {
    /// Identifies the ordering. Tables written under one name must only be
    /// read back under the same name.
    fn name(&self) -> &str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// If `start < limit`, change `start` into a short key in `[start, limit)`.
    /// Leaving `start` unchanged is always a correct implementation.
    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]);

    /// Change `key` into a short key `>= key`. Leaving it unchanged is a
    /// correct implementation.
    fn find_short_successor(&self, key: &mut Vec<u8>);
}

/// Lexicographic byte-wise ordering.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let min_len = start.len().min(limit.len());
        let diff_index = start
            .iter()
            .zip(limit.iter())
            .take_while(|(a, b)| a == b)
            .count();

        // One key is a prefix of the other: nothing shorter to offer.
        if diff_index >= min_len {
            return;
        }

        let diff_byte = start[diff_index];
        if diff_byte < 0xff && diff_byte + 1 < limit[diff_index] {
            start[diff_index] += 1;
            start.truncate(diff_index + 1);
            debug_assert_eq!(self.compare(start, limit), Ordering::Less);
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        if let Some(i) = key.iter().position(|&b| b != 0xff) {
            key[i] += 1;
            key.truncate(i + 1);
        }
        // Otherwise key is a run of 0xff bytes; leave it alone.
    }
}
