//! Negative Fast Path for Line Lookups
//!
//! A bloom filter over the indexed lines. `might_contain` returning false
//! proves the query is not in the data file, which lets the common miss
//! path skip the hash-set probe entirely. A true result proves nothing;
//! callers must fall through to the exact set, so no false positive can
//! ever be reported on the wire.

use ahash::RandomState;
use std::hash::{BuildHasher, Hasher};

/// A space-efficient probabilistic membership filter over byte strings.
#[derive(Clone, Debug)]
pub struct Bloom {
    /// Bit array stored as u64 words for efficient access
    bits: Vec<u64>,
    /// Number of bits in the filter
    num_bits: usize,
    /// Number of hash functions to use
    num_hashes: u8,
}

impl Bloom {
    /// Create a filter sized for the expected number of lines and the
    /// desired false positive rate.
    ///
    /// # Arguments
    /// * `expected_elements` - Expected number of distinct lines
    /// * `false_positive_rate` - Desired false positive rate (e.g., 0.01 for 1%)
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        // Optimal number of bits: m = -n * ln(p) / (ln(2)^2)
        let n = expected_elements.max(1) as f64;
        let p = false_positive_rate.clamp(0.0001, 0.5);
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / ln2_sq).ceil() as usize;
        let num_bits = num_bits.max(64);

        // Round up to a whole number of u64 words
        let num_words = num_bits.div_ceil(64);
        let num_bits = num_words * 64;

        // Optimal number of hash functions: k = (m/n) * ln(2)
        let num_hashes = ((num_bits as f64 / n) * std::f64::consts::LN_2).round() as u8;
        let num_hashes = num_hashes.clamp(1, 16);

        Self {
            bits: vec![0u64; num_words],
            num_bits,
            num_hashes,
        }
    }

    /// Insert a line into the filter.
    #[inline]
    pub fn insert(&mut self, line: &[u8]) {
        let (h1, h2) = self.hash_pair(line);

        for i in 0..self.num_hashes as u64 {
            // Double hashing: h(i) = h1 + i*h2
            let hash = h1.wrapping_add(i.wrapping_mul(h2));
            let bit_index = (hash as usize) % self.num_bits;
            self.bits[bit_index / 64] |= 1u64 << (bit_index % 64);
        }
    }

    /// Check whether a query might be an indexed line.
    /// Returns false if definitely not present, true if possibly present.
    #[inline]
    pub fn might_contain(&self, line: &[u8]) -> bool {
        let (h1, h2) = self.hash_pair(line);

        for i in 0..self.num_hashes as u64 {
            let hash = h1.wrapping_add(i.wrapping_mul(h2));
            let bit_index = (hash as usize) % self.num_bits;

            if (self.bits[bit_index / 64] & (1u64 << (bit_index % 64))) == 0 {
                return false;
            }
        }
        true
    }

    /// Compute two independent hash values for double hashing.
    #[inline]
    fn hash_pair(&self, line: &[u8]) -> (u64, u64) {
        // Two hashers with fixed, distinct seeds. Reusing one hasher after
        // finish() corrupts the distribution, so each gets its own.
        let mut hasher1 = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
        hasher1.write(line);
        let h1 = hasher1.finish();

        let mut hasher2 = RandomState::with_seeds(
            0x517cc1b727220a95,
            0x9e3779b97f4a7c15,
            0xbf58476d1ce4e5b9,
            0x94d049bb133111eb,
        )
        .build_hasher();
        hasher2.write(line);
        let h2 = hasher2.finish();

        (h1, h2)
    }

    /// Number of bits in the filter.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Number of hash functions in use.
    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }

    /// Approximate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.bits.len() * 8 + std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_false_negatives() {
        let mut bloom = Bloom::new(1000, 0.01);

        let lines: Vec<String> = (0..500).map(|i| format!("{i};0;6;28;0;23;5;0;")).collect();
        for line in &lines {
            bloom.insert(line.as_bytes());
        }

        // Every inserted line must be reported as possibly present.
        for line in &lines {
            assert!(bloom.might_contain(line.as_bytes()));
        }
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        let mut bloom = Bloom::new(10_000, 0.01);
        for i in 0..10_000 {
            bloom.insert(format!("line-{i}").as_bytes());
        }

        let mut false_positives = 0;
        let probes = 100_000;
        for i in 0..probes {
            if bloom.might_contain(format!("absent-{i}").as_bytes()) {
                false_positives += 1;
            }
        }

        let rate = false_positives as f64 / probes as f64;
        // 3x tolerance over the 1% target absorbs statistical variance
        // while still catching a broken hash function.
        assert!(rate <= 0.03, "false positive rate too high: {rate:.4}");
    }

    #[test]
    fn binary_lines_are_hashable() {
        let mut bloom = Bloom::new(16, 0.01);
        bloom.insert(b"\x00\xff\xfe");
        assert!(bloom.might_contain(b"\x00\xff\xfe"));
    }

    #[test]
    fn hash_pair_independence() {
        let bloom = Bloom::new(1000, 0.01);

        for i in 0..1000u32 {
            let line = format!("probe-{i}");
            let (h1, h2) = bloom.hash_pair(line.as_bytes());
            assert_ne!(h1, h2, "hash values collide for {line}");
        }
    }

    #[test]
    fn zero_expected_elements_still_works() {
        let bloom = Bloom::new(0, 0.01);
        assert!(bloom.num_bits() >= 64);
        assert!(!bloom.might_contain(b"anything"));
    }
}
