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

//! HyperLogLog sketch for cardinality estimation.
//!
//! A [`HyperLogLog`] keeps `m = 2^k` small registers. Each update hashes the
//! item, uses the top `k` bits of the hash to pick a register and stores the
//! maximum "rank" (one plus the number of trailing zero bits) seen in that
//! register. The cardinality estimate is the bias-corrected harmonic mean of
//! `2^register` across all registers.
//!
//! The register count is derived from the requested standard error:
//! `k = ceil(log2((1.04 / std_error)^2))`. It is fixed at construction and two
//! sketches can only be merged when both `k` and `std_error` match.
//!
//! # Usage
//!
//! ```rust
//! # use metasketch::hll::HyperLogLog;
//! let mut left = HyperLogLog::new(0.05).unwrap();
//! let mut right = HyperLogLog::new(0.05).unwrap();
//! left.update("apple");
//! right.update("banana");
//!
//! left.union(&right).unwrap();
//! assert_eq!(left.estimate().round(), 2.0);
//! ```
//!
//! # Set operations
//!
//! [`HyperLogLog::union`] is the only statistically sound merge. The
//! register-wise [`HyperLogLog::intersect`] and [`HyperLogLog::without`] exist
//! for compatibility with previously stored sketches; their estimates are not
//! valid cardinalities of a set intersection or difference.

mod sketch;

pub use self::sketch::HyperLogLog;

/// Smallest supported `k` (16 registers).
pub const MIN_LG_REGISTERS: u8 = 4;
/// Largest supported `k` (65536 registers).
pub const MAX_LG_REGISTERS: u8 = 16;
