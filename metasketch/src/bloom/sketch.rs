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

use crate::error::Error;
use crate::hash::fnv_1a;
use crate::hash::fnv_1a_b;

use super::builder::MAX_NUM_BITS;
use super::builder::MAX_NUM_HASHES;
use super::builder::MIN_NUM_HASHES;

/// Fixed-size membership filter over strings.
///
/// After `n` insertions into `m` bits with `k` hashes the false positive rate
/// is roughly `(1 - e^(-k*n/m))^k`. Inserted values always test positive.
/// New filters come from [`super::BloomFilterBuilder`], persisted ones from
/// [`BloomFilter::from_words`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    /// Positions set per value (`k`).
    pub(super) num_hashes: u16,
    /// Bit array packed into u32 words
    pub(super) words: Box<[u32]>,
}

impl BloomFilter {
    /// Rebuilds a filter from persisted words.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if there are no words, too many words, or the hash
    /// count is out of range.
    pub fn from_words(num_hashes: u16, words: Vec<u32>) -> Result<Self, Error> {
        if words.is_empty() || words.len() as u64 * 32 > u64::from(MAX_NUM_BITS) + 31 {
            return Err(Error::malformed(
                "bloom filter",
                format!("unsupported word count {}", words.len()),
            ));
        }
        if !(MIN_NUM_HASHES..=MAX_NUM_HASHES).contains(&num_hashes) {
            return Err(Error::malformed(
                "bloom filter",
                format!("unsupported hash count {num_hashes}"),
            ));
        }
        Ok(Self {
            num_hashes,
            words: words.into_boxed_slice(),
        })
    }

    /// Tests whether an item is possibly in the set.
    ///
    /// # Examples
    ///
    /// ```
    /// # use metasketch::bloom::BloomFilterBuilder;
    /// let mut filter = BloomFilterBuilder::default().build();
    /// filter.insert("apple");
    ///
    /// assert!(filter.contains("apple"));
    /// assert!(!filter.contains("grape"));
    /// ```
    pub fn contains(&self, item: &str) -> bool {
        positions(item, self.num_hashes, self.capacity()).all(|bit| self.get_bit(bit))
    }

    /// Tests and inserts an item in a single operation.
    ///
    /// Returns whether the item was possibly already in the set before insertion.
    pub fn contains_and_insert(&mut self, item: &str) -> bool {
        let capacity = self.capacity();
        let mut was_present = true;
        for bit in positions(item, self.num_hashes, capacity) {
            was_present &= self.set_bit(bit);
        }
        was_present
    }

    /// Inserts an item into the filter.
    ///
    /// After insertion, `contains(item)` will always return `true`.
    pub fn insert(&mut self, item: &str) {
        self.contains_and_insert(item);
    }

    /// Merges another filter into this one via bitwise OR (union).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the filters differ in size or hash count.
    pub fn union(&mut self, other: &BloomFilter) -> Result<(), Error> {
        if !self.is_compatible(other) {
            return Err(Error::incompatible(
                "BloomFilter",
                format!(
                    "{} bits/{} hashes vs {} bits/{} hashes",
                    self.capacity(),
                    self.num_hashes,
                    other.capacity(),
                    other.num_hashes
                ),
            ));
        }
        for (word, other_word) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= *other_word;
        }
        Ok(())
    }

    /// Checks if two filters are compatible for merging.
    pub fn is_compatible(&self, other: &BloomFilter) -> bool {
        self.words.len() == other.words.len() && self.num_hashes == other.num_hashes
    }

    /// Returns whether the filter is empty (no items inserted).
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Returns the number of bits set to 1.
    pub fn bits_used(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Returns the total number of bits in the filter (capacity).
    pub fn capacity(&self) -> u32 {
        self.words.len() as u32 * 32
    }

    /// Returns the number of hash functions used.
    pub fn num_hashes(&self) -> u16 {
        self.num_hashes
    }

    /// Returns the packed bit array.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Returns the current load factor (fraction of bits set).
    pub fn load_factor(&self) -> f64 {
        self.bits_used() as f64 / f64::from(self.capacity())
    }

    /// Estimates the current false positive probability as `load_factor^k`.
    pub fn estimated_fpp(&self) -> f64 {
        self.load_factor().powi(i32::from(self.num_hashes))
    }

    /// Expected false positive probability after `num_items` distinct insertions:
    /// `(1 - e^(-k*n/m))^k`.
    pub fn expected_fpp(&self, num_items: u64) -> f64 {
        let k = f64::from(self.num_hashes);
        let m = f64::from(self.capacity());
        (1.0 - (-k * num_items as f64 / m).exp()).powf(k)
    }

    fn get_bit(&self, bit: u32) -> bool {
        self.words[(bit / 32) as usize] & (1 << (bit % 32)) != 0
    }

    /// Sets a single bit, returning whether it was already set.
    fn set_bit(&mut self, bit: u32) -> bool {
        let word = &mut self.words[(bit / 32) as usize];
        let mask = 1 << (bit % 32);
        let was_set = *word & mask != 0;
        *word |= mask;
        was_set
    }
}

/// Computes the k bit positions of `item` by double hashing.
///
/// Both base hashes are read as signed 32-bit integers, matching the bit layout of
/// filters persisted as `i32` words.
fn positions(item: &str, num_hashes: u16, capacity: u32) -> impl Iterator<Item = u32> {
    let h1 = fnv_1a(item);
    let h2 = fnv_1a_b(h1);
    let (h1, h2) = (i64::from(h1 as i32), i64::from(h2 as i32));
    let m = i64::from(capacity);
    (0..i64::from(num_hashes)).map(move |i| (h1 + i * h2).rem_euclid(m) as u32)
}

#[cfg(test)]
mod tests {
    use super::BloomFilter;
    use crate::bloom::BloomFilterBuilder;

    #[test]
    fn test_default_builder() {
        let filter = BloomFilterBuilder::default().build();
        assert_eq!(filter.capacity(), 1024);
        assert_eq!(filter.num_hashes(), 4);
        assert_eq!(filter.words().len(), 32);
        assert!(filter.is_empty());
    }

    #[test]
    fn test_builder_with_accuracy() {
        let filter = BloomFilterBuilder::with_accuracy(1000, 0.01).build();
        assert!(filter.capacity() >= 9000);
        assert_eq!(filter.num_hashes(), 7);
    }

    #[test]
    fn test_insert_and_contains() {
        let mut filter = BloomFilterBuilder::default().build();

        assert!(!filter.contains("apple"));
        filter.insert("apple");
        assert!(filter.contains("apple"));
        assert!(!filter.is_empty());
        assert!(filter.bits_used() >= 1 && filter.bits_used() <= 4);
    }

    #[test]
    fn test_contains_and_insert() {
        let mut filter = BloomFilterBuilder::default().build();
        assert!(!filter.contains_and_insert("42"));
        assert!(filter.contains_and_insert("42"));
    }

    #[test]
    fn test_positions_stay_in_range() {
        for capacity in [32, 1024, 96] {
            for i in 0..500 {
                let item = format!("item-{i}");
                assert!(super::positions(&item, 4, capacity).all(|p| p < capacity));
            }
        }
    }

    #[test]
    fn test_union() {
        let mut f1 = BloomFilterBuilder::default().build();
        let mut f2 = BloomFilterBuilder::default().build();
        f1.insert("a");
        f2.insert("b");

        f1.union(&f2).unwrap();
        assert!(f1.contains("a"));
        assert!(f1.contains("b"));
    }

    #[test]
    fn test_union_incompatible() {
        let mut f1 = BloomFilterBuilder::with_size(1000, 4).build();
        let f2 = BloomFilterBuilder::with_size(1000, 5).build();
        assert!(f1.union(&f2).is_err());
    }

    #[test]
    fn test_from_words() {
        let mut filter = BloomFilterBuilder::default().build();
        filter.insert("persisted");
        let restored = BloomFilter::from_words(4, filter.words().to_vec()).unwrap();
        assert_eq!(restored, filter);
        assert!(restored.contains("persisted"));

        assert!(BloomFilter::from_words(4, vec![]).is_err());
        assert!(BloomFilter::from_words(0, vec![0; 32]).is_err());
    }

    #[test]
    fn test_fpp_statistics() {
        let mut filter = BloomFilterBuilder::default().build();
        assert_eq!(filter.load_factor(), 0.0);
        assert_eq!(filter.expected_fpp(0), 0.0);

        filter.insert("test");
        assert!(filter.load_factor() > 0.0);
        assert!(filter.estimated_fpp() > 0.0);
        assert!(filter.expected_fpp(100) < filter.expected_fpp(1000));
    }

    #[test]
    #[should_panic(expected = "num_hashes must be in")]
    fn test_invalid_num_hashes() {
        BloomFilterBuilder::with_size(1000, 0);
    }
}
