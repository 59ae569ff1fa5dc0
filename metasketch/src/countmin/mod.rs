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

//! Count-Min sketch for frequency estimation.
//!
//! The sketch keeps `depth` rows of `width` counters. Row `r` hashes a key
//! with [`murmurhash3_32`](crate::hash::murmurhash3_32) seeded with `r` and
//! increments one counter per row. Seed 0 hashes like seed 1, so the first two
//! rows always agree; stored tables depend on this layout. A query returns the minimum of the
//! key's counters, so the estimate never under-counts the true frequency and
//! over-counts by at most `accuracy * total_weight` with probability
//! `1 - prob_incorrect`.
//!
//! ```rust
//! # use metasketch::countmin::CountMinSketch;
//! let mut sketch = CountMinSketch::new(0.1, 0.0001).unwrap();
//! assert_eq!((sketch.width(), sketch.depth()), (28, 10));
//!
//! sketch.update("x", 3);
//! sketch.update("x", 1);
//! assert!(sketch.query("x") >= 4);
//! ```

mod sketch;

pub use self::sketch::CountMinSketch;

/// Default relative accuracy.
pub const DEFAULT_ACCURACY: f64 = 0.1;
/// Default probability that an estimate exceeds the accuracy bound.
pub const DEFAULT_PROB_INCORRECT: f64 = 0.0001;
