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

//! Fowler/Noll/Vo hashing over UTF-16 code units.

const OFFSET_BASIS: u32 = 2166136261;
const PRIME: u32 = 16777619;

/// FNV-1a of `text`, finished with an avalanche mix.
///
/// The input is consumed as UTF-16 code units; a code unit with a non-zero high
/// byte folds that byte in before its low byte.
pub fn fnv_1a(text: &str) -> u32 {
    fnv_mix(fold(text))
}

/// One additional FNV round over an existing hash, used to derive a second
/// independent value for double hashing.
pub fn fnv_1a_b(hash: u32) -> u32 {
    fnv_mix(hash.wrapping_mul(PRIME))
}

fn fold(text: &str) -> u32 {
    let mut hash = OFFSET_BASIS;
    for unit in text.encode_utf16() {
        let high = unit >> 8;
        if high != 0 {
            hash = (hash ^ u32::from(high)).wrapping_mul(PRIME);
        }
        hash = (hash ^ u32::from(unit & 0xff)).wrapping_mul(PRIME);
    }
    hash
}

fn fnv_mix(mut a: u32) -> u32 {
    a = a.wrapping_add(a << 13);
    a ^= a >> 7;
    a = a.wrapping_add(a << 3);
    a ^= a >> 17;
    a.wrapping_add(a << 5)
}
