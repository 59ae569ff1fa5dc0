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

use byteorder::ByteOrder;
use byteorder::LE;

const C1: u32 = 0xcc9e2d51;
const C2: u32 = 0x1b873593;

/// MurmurHash3 x86_32 of `key` with the given seed.
///
/// A seed of 0 is treated as 1, so that a missing seed and an explicit zero hash
/// the same way as the sketches already persisted with this function.
///
/// # Examples
///
/// ```
/// # use metasketch::hash::murmurhash3_32;
/// assert_eq!(murmurhash3_32(b"", 1), 0x514e28b7);
/// assert_eq!(murmurhash3_32(b"", 0), murmurhash3_32(b"", 1));
/// ```
pub fn murmurhash3_32(key: &[u8], seed: u32) -> u32 {
    let mut h1 = if seed == 0 { 1 } else { seed };

    let mut blocks = key.chunks_exact(4);
    for block in &mut blocks {
        h1 ^= mix_k1(LE::read_u32(block));
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    // tail
    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k1 ^= u32::from(byte) << (8 * i);
        }
        h1 ^= mix_k1(k1);
    }

    h1 ^= key.len() as u32;
    fmix32(h1)
}

#[inline]
fn mix_k1(mut k1: u32) -> u32 {
    k1 = k1.wrapping_mul(C1);
    k1 = k1.rotate_left(15);
    k1.wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}
