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

use std::collections::HashMap;

use googletest::assert_that;
use googletest::prelude::ge;
use googletest::prelude::le;
use metasketch::countmin::CountMinSketch;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn skewed_stream(seed: u64, len: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            // small ids are much more frequent than large ones
            let id = rng.gen_range(0..100u32) * rng.gen_range(0..100u32) / 100;
            format!("key-{id}")
        })
        .collect()
}

fn exact_counts(stream: &[String]) -> HashMap<&str, u32> {
    let mut counts = HashMap::new();
    for key in stream {
        *counts.entry(key.as_str()).or_insert(0) += 1;
    }
    counts
}

#[test]
fn test_never_under_counts() {
    let stream = skewed_stream(1, 20_000);
    let mut sketch = CountMinSketch::new(0.1, 0.0001).unwrap();
    for key in &stream {
        sketch.update(key, 1);
    }

    let total = stream.len() as f64;
    assert_eq!(sketch.total_weight(), stream.len() as u64);
    for (key, exact) in exact_counts(&stream) {
        let estimate = sketch.query(key);
        assert_that!(estimate, ge(exact), "key: {key}");
        assert_that!(
            f64::from(estimate - exact),
            le(sketch.relative_error() * total),
            "key: {key}"
        );
    }
}

#[test]
fn test_unseen_keys_are_bounded() {
    let stream = skewed_stream(2, 5_000);
    let mut sketch = CountMinSketch::new(0.1, 0.0001).unwrap();
    for key in &stream {
        sketch.update(key, 1);
    }
    let bound = sketch.relative_error() * stream.len() as f64;
    for i in 0..100 {
        assert_that!(f64::from(sketch.query(format!("absent-{i}"))), le(bound));
    }
}

#[test]
fn test_merge_adds_counts() {
    let left_stream = skewed_stream(3, 2_000);
    let right_stream = skewed_stream(4, 3_000);
    let mut left = CountMinSketch::new(0.1, 0.0001).unwrap();
    let mut right = CountMinSketch::new(0.1, 0.0001).unwrap();
    for key in &left_stream {
        left.update(key, 1);
    }
    for key in &right_stream {
        right.update(key, 1);
    }

    left.merge(&right).unwrap();
    assert_eq!(left.total_weight(), 5_000);

    let mut all = left_stream.clone();
    all.extend(right_stream);
    for (key, exact) in exact_counts(&all) {
        assert_that!(left.query(key), ge(exact));
    }

    let other = CountMinSketch::new(0.05, 0.0001).unwrap();
    assert!(left.merge(&other).is_err());
}
