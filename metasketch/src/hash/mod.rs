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

//! Deterministic 32-bit hash functions shared by all sketches.
//!
//! Two independent families are provided:
//!
//! - [`murmurhash3_32`]: MurmurHash3 x86_32 over bytes, seeded. Used by
//!   [`HyperLogLog`](crate::hll::HyperLogLog) and by the rows of
//!   [`CountMinSketch`](crate::countmin::CountMinSketch). Text keys are fed
//!   to it through [`utf16_low_bytes`].
//! - [`fnv_1a`] / [`fnv_1a_b`]: FNV-1a over UTF-16 code units with an avalanche
//!   finalizer, plus a one-step re-hash. Used for Bloom filter double hashing.
//!
//! All functions are pure: once a history of stored sketches exists, the hash
//! functions and seeds that produced them can never change.

mod fnv;
mod murmurhash;

pub use self::fnv::fnv_1a;
pub use self::fnv::fnv_1a_b;
pub use self::murmurhash::murmurhash3_32;

/// Seed used by HyperLogLog updates.
pub const HLL_SEED: u32 = 1;

/// Encodes text as one byte per UTF-16 code unit, keeping the low byte.
///
/// This is the key encoding of every murmur-hashed sketch in the store. It is
/// lossy outside Latin-1: code units that share a low byte collide.
///
/// ```
/// # use metasketch::hash::utf16_low_bytes;
/// assert_eq!(utf16_low_bytes("héllo"), [0x68, 0xe9, 0x6c, 0x6c, 0x6f]);
/// assert_eq!(utf16_low_bytes("日本"), [0xe5, 0x2c]);
/// ```
pub fn utf16_low_bytes(text: &str) -> Vec<u8> {
    text.encode_utf16().map(|unit| unit as u8).collect()
}
