// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use super::BloomFilter;

/// Default requested bit count.
pub const DEFAULT_NUM_BITS: u32 = 1000;
/// Default number of hash functions.
pub const DEFAULT_NUM_HASHES: u16 = 4;
pub(super) const MIN_NUM_BITS: u32 = 1;
/// Largest supported bit count.
pub const MAX_NUM_BITS: u32 = 1 << 30;
pub(super) const MIN_NUM_HASHES: u16 = 1;
/// Largest supported number of hash functions.
pub const MAX_NUM_HASHES: u16 = 64;

/// Sizes a new [`BloomFilter`], either explicitly with
/// [`with_size`](Self::with_size) or from an expected item count and target
/// false positive rate with [`with_accuracy`](Self::with_accuracy).
///
/// The default matches the `exists` aggregate: 1000 bits and 4 hashes.
#[derive(Debug, Clone)]
pub struct BloomFilterBuilder {
    num_bits: u32,
    num_hashes: u16,
}

impl Default for BloomFilterBuilder {
    fn default() -> Self {
        Self::with_size(DEFAULT_NUM_BITS, DEFAULT_NUM_HASHES)
    }
}

impl BloomFilterBuilder {
    /// Sizes the filter so that `max_items` insertions keep the false positive
    /// rate near `fpp`.
    ///
    /// # Panics
    ///
    /// Panics if `max_items` is 0 or `fpp` is not in (0.0, 1.0].
    ///
    /// # Examples
    ///
    /// ```
    /// # use metasketch::bloom::BloomFilterBuilder;
    /// let filter = BloomFilterBuilder::with_accuracy(1000, 0.01).build();
    /// assert_eq!(filter.num_hashes(), 7);
    /// ```
    pub fn with_accuracy(max_items: u32, fpp: f64) -> Self {
        assert!(max_items > 0, "max_items must be positive");
        assert!(
            fpp > 0.0 && fpp <= 1.0,
            "fpp must be in (0.0, 1.0], got {fpp}"
        );

        let num_bits = Self::suggest_num_bits(max_items, fpp);
        let num_hashes = Self::suggest_num_hashes(max_items, num_bits);
        BloomFilterBuilder {
            num_bits,
            num_hashes,
        }
    }

    /// Uses an explicit bit count and number of hashes.
    ///
    /// The actual capacity is rounded up to the next multiple of 32 bits.
    ///
    /// # Panics
    ///
    /// Panics if `num_bits` or `num_hashes` is outside the supported range.
    ///
    /// # Examples
    ///
    /// ```
    /// # use metasketch::bloom::BloomFilterBuilder;
    /// let filter = BloomFilterBuilder::with_size(100, 3).build();
    /// assert_eq!(filter.capacity(), 128);
    /// ```
    pub fn with_size(num_bits: u32, num_hashes: u16) -> Self {
        assert!(
            (MIN_NUM_BITS..=MAX_NUM_BITS).contains(&num_bits),
            "num_bits must be in [{MIN_NUM_BITS}, {MAX_NUM_BITS}]"
        );
        assert!(
            (MIN_NUM_HASHES..=MAX_NUM_HASHES).contains(&num_hashes),
            "num_hashes must be in [{MIN_NUM_HASHES}, {MAX_NUM_HASHES}]"
        );
        BloomFilterBuilder {
            num_bits,
            num_hashes,
        }
    }

    /// Builds an empty filter.
    pub fn build(self) -> BloomFilter {
        let num_words = self.num_bits.div_ceil(32) as usize;
        BloomFilter {
            num_hashes: self.num_hashes,
            words: vec![0u32; num_words].into_boxed_slice(),
        }
    }

    /// Bit count for `max_items` at false positive rate `fpp`.
    ///
    /// `m = -n * ln(p) / ln(2)^2`, clamped to the supported range.
    pub fn suggest_num_bits(max_items: u32, fpp: f64) -> u32 {
        let n = f64::from(max_items);
        let ln2_squared = std::f64::consts::LN_2.powi(2);
        let bits = (-n * fpp.ln() / ln2_squared).ceil();
        bits.clamp(f64::from(MIN_NUM_BITS), f64::from(MAX_NUM_BITS)) as u32
    }

    /// Hash count minimizing the false positive rate for `max_items` in `num_bits`.
    ///
    /// `k = ceil(m / n * ln(2))`, clamped to the supported range.
    pub fn suggest_num_hashes(max_items: u32, num_bits: u32) -> u16 {
        let k = (f64::from(num_bits) / f64::from(max_items) * std::f64::consts::LN_2).ceil();
        k.clamp(f64::from(MIN_NUM_HASHES), f64::from(MAX_NUM_HASHES)) as u16
    }
}
