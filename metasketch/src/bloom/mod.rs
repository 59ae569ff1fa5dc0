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

//! Bloom filter over string values, used by the `exists` aggregate.
//!
//! The filter answers "maybe seen" or "never seen": an inserted value always
//! tests positive, while a value never inserted tests positive with a
//! probability that grows with the load factor. The bit array is sized once
//! and rounded up to whole 32-bit words, so a persisted filter can be read
//! back exactly.
//!
//! # Usage
//!
//! ```rust
//! use metasketch::bloom::BloomFilterBuilder;
//!
//! // 1000 requested bits (1024 after rounding) and 4 hash functions
//! let mut filter = BloomFilterBuilder::default().build();
//!
//! filter.insert("books");
//! filter.insert("music");
//!
//! assert!(filter.contains("books"));
//! assert_eq!(filter.capacity(), 1024);
//! ```
//!
//! # Bit positions
//!
//! A value maps to `k` positions by double hashing. With `h1 = fnv_1a(v)` and
//! `h2 = fnv_1a_b(h1)`, both read as signed 32-bit integers, position `i` is
//! `(h1 + i * h2) mod m` taken non-negative. Bit `p` lives in word `p / 32` at
//! mask `1 << (p % 32)`.

mod builder;
mod sketch;

pub use self::builder::BloomFilterBuilder;
pub use self::builder::DEFAULT_NUM_BITS;
pub use self::builder::DEFAULT_NUM_HASHES;
pub use self::builder::MAX_NUM_BITS;
pub use self::builder::MAX_NUM_HASHES;
pub use self::sketch::BloomFilter;
