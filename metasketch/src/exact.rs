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

//! Exact aggregates: running minimum/maximum and unique-value counting.
//!
//! Unlike the sketches these keep exact state. [`UniqueCounter`] memory grows
//! with the number of distinct values seen.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::Value;

/// Which extremum an [`Extremum`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Keep the smallest value.
    Min,
    /// Keep the largest value.
    Max,
}

/// Running minimum or maximum over JSON values.
///
/// Numbers compare numerically, strings lexicographically and booleans with
/// `false < true`. Values of different JSON types (and `null`, arrays, objects)
/// are incomparable and never replace the recorded value.
///
/// ```rust
/// # use metasketch::exact::{Bound, Extremum};
/// # use serde_json::json;
/// let mut min = Extremum::new(Bound::Min);
/// for v in [5, 3, 9, 1] {
///     min.offer(&json!(v));
/// }
/// assert_eq!(min.value(), Some(&json!(1)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Extremum {
    bound: Bound,
    value: Option<Value>,
}

impl Extremum {
    /// Creates an extremum with no recorded value.
    pub fn new(bound: Bound) -> Self {
        Self { bound, value: None }
    }

    /// Restores an extremum from a persisted value.
    pub fn with_value(bound: Bound, value: Option<Value>) -> Self {
        Self { bound, value }
    }

    /// Offers a candidate. Returns whether the recorded value changed.
    pub fn offer(&mut self, candidate: &Value) -> bool {
        if !is_comparable(candidate) {
            return false;
        }
        let replace = match &self.value {
            None => true,
            Some(current) => match (self.bound, compare_values(candidate, current)) {
                (Bound::Min, Some(Ordering::Less)) => true,
                (Bound::Max, Some(Ordering::Greater)) => true,
                _ => false,
            },
        };
        if replace {
            self.value = Some(candidate.clone());
        }
        replace
    }

    /// Returns the tracked bound.
    pub fn bound(&self) -> Bound {
        self.bound
    }

    /// Returns the recorded value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Consumes the extremum, returning the recorded value.
    pub fn into_value(self) -> Option<Value> {
        self.value
    }
}

/// Orders two JSON values of the same scalar type.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn is_comparable(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::String(_) | Value::Bool(_))
}

/// Exact count of distinct values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueCounter {
    seen: BTreeSet<String>,
}

impl UniqueCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value. Returns whether it had not been seen before.
    pub fn insert(&mut self, value: &str) -> bool {
        if self.seen.contains(value) {
            return false;
        }
        self.seen.insert(value.to_owned())
    }

    /// Returns whether the value has been seen.
    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    /// Returns the number of distinct values seen.
    pub fn count(&self) -> u64 {
        self.seen.len() as u64
    }

    /// Returns the distinct values in sorted order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }
}

impl FromIterator<String> for UniqueCounter {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            seen: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_min_max_any_order() {
        for order in [[5, 3, 9, 1], [1, 9, 3, 5], [9, 1, 5, 3]] {
            let mut min = Extremum::new(Bound::Min);
            let mut max = Extremum::new(Bound::Max);
            for v in order {
                min.offer(&json!(v));
                max.offer(&json!(v));
            }
            assert_eq!(min.value(), Some(&json!(1)));
            assert_eq!(max.value(), Some(&json!(9)));
        }
    }

    #[test]
    fn test_equal_value_is_not_a_change() {
        let mut max = Extremum::with_value(Bound::Max, Some(json!(7)));
        assert!(!max.offer(&json!(7)));
        assert!(!max.offer(&json!(6.5)));
        assert!(max.offer(&json!(7.5)));
    }

    #[test]
    fn test_incomparable_values_are_ignored() {
        let mut min = Extremum::with_value(Bound::Min, Some(json!(3)));
        assert!(!min.offer(&json!("1")));
        assert!(!min.offer(&Value::Null));
        assert_eq!(min.value(), Some(&json!(3)));

        let mut empty = Extremum::new(Bound::Min);
        assert!(!empty.offer(&json!([1, 2])));
        assert_eq!(empty.value(), None);
    }

    #[test]
    fn test_string_ordering() {
        let mut min = Extremum::new(Bound::Min);
        assert!(min.offer(&json!("m")));
        assert!(min.offer(&json!("a")));
        assert!(!min.offer(&json!("z")));
        assert_eq!(min.into_value(), Some(json!("a")));
    }

    #[test]
    fn test_unique_counter() {
        let mut counter = UniqueCounter::new();
        assert!(counter.insert("X"));
        assert!(!counter.insert("X"));
        assert!(counter.insert("Y"));
        assert_eq!(counter.count(), 2);
        assert!(counter.contains("Y"));
        assert_eq!(counter.values().collect::<Vec<_>>(), vec!["X", "Y"]);
    }
}
