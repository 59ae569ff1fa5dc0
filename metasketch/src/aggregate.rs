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

//! Aggregate kinds, their state, and their persisted JSON shapes.
//!
//! Each metadata document holds a map from [`AggregateKind`] to
//! [`AggregateState`]. The map key names the variant, so the persisted values
//! carry no tag of their own:
//!
//! | kind               | persisted shape                                                   |
//! |--------------------|-------------------------------------------------------------------|
//! | `count_unique`     | `{ "value": n, "uniqueValues": { "<v>": 0, ... } }`               |
//! | `count_unique_hll` | `{ "value": n, "hll": { "M": [..], "std_error": e } }`            |
//! | `min`, `max`       | `{ "value": v }`                                                  |
//! | `exists`           | `{ "value": b, "bf": { "buckets": [..], "k": k } }`               |
//! | `count_min`        | `{ "value": n, "cms": { "accuracy", "probIncorrect", "table" } }` |

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as _;
use serde_json::Value;

use crate::bloom::BloomFilter;
use crate::bloom::BloomFilterBuilder;
use crate::config::SketchParams;
use crate::countmin::CountMinSketch;
use crate::error::Error;
use crate::exact::Bound;
use crate::exact::Extremum;
use crate::exact::UniqueCounter;
use crate::hash::utf16_low_bytes;
use crate::hll::HyperLogLog;

/// The closed set of aggregates a document can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    /// Smallest value seen.
    Min,
    /// Largest value seen.
    Max,
    /// Exact number of distinct values.
    CountUnique,
    /// HyperLogLog estimate of the number of distinct values.
    CountUniqueHll,
    /// Bloom filter membership of the latest value.
    Exists,
    /// Count-Min estimate of the latest value's frequency.
    CountMin,
}

impl AggregateKind {
    /// Returns the persisted name of the kind.
    pub const fn name(self) -> &'static str {
        match self {
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::CountUnique => "count_unique",
            AggregateKind::CountUniqueHll => "count_unique_hll",
            AggregateKind::Exists => "exists",
            AggregateKind::CountMin => "count_min",
        }
    }
}

/// State of one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    /// Exact set of distinct values.
    CountUnique(UniqueCounter),
    /// Distinct-count sketch.
    CountUniqueHll(HyperLogLog),
    /// Running minimum.
    Min(Extremum),
    /// Running maximum.
    Max(Extremum),
    /// Membership filter.
    Exists {
        /// Filter over every applied value.
        filter: BloomFilter,
        /// Membership of the most recently applied value.
        value: bool,
    },
    /// Frequency sketch.
    CountMin {
        /// Counters over every applied value.
        sketch: CountMinSketch,
        /// Estimated frequency of the most recently applied value.
        value: u32,
    },
}

impl AggregateState {
    /// Creates the empty state of `kind` using `params` for sketch sizes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `params` cannot build the sketch.
    pub fn create(kind: AggregateKind, params: &SketchParams) -> Result<Self, Error> {
        Ok(match kind {
            AggregateKind::Min => AggregateState::Min(Extremum::new(Bound::Min)),
            AggregateKind::Max => AggregateState::Max(Extremum::new(Bound::Max)),
            AggregateKind::CountUnique => AggregateState::CountUnique(UniqueCounter::new()),
            AggregateKind::CountUniqueHll => {
                AggregateState::CountUniqueHll(HyperLogLog::new(params.hll_std_error)?)
            }
            AggregateKind::Exists => {
                // the builder panics on out-of-range sizes
                params.validate()?;
                AggregateState::Exists {
                    filter: BloomFilterBuilder::with_size(params.bloom_bits, params.bloom_hashes)
                        .build(),
                    value: false,
                }
            }
            AggregateKind::CountMin => AggregateState::CountMin {
                sketch: CountMinSketch::new(params.cms_accuracy, params.cms_prob_incorrect)?,
                value: 0,
            },
        })
    }

    /// Returns the kind of this state.
    pub fn kind(&self) -> AggregateKind {
        match self {
            AggregateState::CountUnique(_) => AggregateKind::CountUnique,
            AggregateState::CountUniqueHll(_) => AggregateKind::CountUniqueHll,
            AggregateState::Min(_) => AggregateKind::Min,
            AggregateState::Max(_) => AggregateKind::Max,
            AggregateState::Exists { .. } => AggregateKind::Exists,
            AggregateState::CountMin { .. } => AggregateKind::CountMin,
        }
    }

    /// Returns the externally observable value (`null` for an empty min/max).
    pub fn value(&self) -> Value {
        match self {
            AggregateState::CountUnique(counter) => Value::from(counter.count()),
            AggregateState::CountUniqueHll(hll) => Value::from(hll_value(hll)),
            AggregateState::Min(ext) | AggregateState::Max(ext) => {
                ext.value().cloned().unwrap_or(Value::Null)
            }
            AggregateState::Exists { value, .. } => Value::from(*value),
            AggregateState::CountMin { value, .. } => Value::from(*value),
        }
    }

    /// Applies one observation. `key` is the rendered value fed to sketches and
    /// sets, `raw` the original value used by min/max. Murmur-hashed sketches
    /// see `key` through [`utf16_low_bytes`].
    ///
    /// Returns whether the state changed.
    pub fn apply(&mut self, key: &str, raw: &Value) -> bool {
        match self {
            AggregateState::CountUnique(counter) => counter.insert(key),
            AggregateState::CountUniqueHll(hll) => hll.update(utf16_low_bytes(key)),
            AggregateState::Min(ext) | AggregateState::Max(ext) => ext.offer(raw),
            AggregateState::Exists { filter, value } => {
                let was_present = filter.contains_and_insert(key);
                let changed = !was_present || !*value;
                *value = true;
                changed
            }
            AggregateState::CountMin { sketch, value } => {
                let key = utf16_low_bytes(key);
                let before = sketch.query(&key);
                sketch.update(&key, 1);
                let after = sketch.query(&key);
                let changed = after != before || *value != after;
                *value = after;
                changed
            }
        }
    }

    /// Rebuilds a state from its persisted JSON.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the JSON does not match the shape of `kind` or
    /// holds inconsistent sketch parameters.
    pub fn from_json(kind: AggregateKind, json: Value) -> Result<Self, Error> {
        let state = match kind {
            AggregateKind::CountUnique => {
                let repr: CountUniqueRepr = serde_json::from_value(json)?;
                AggregateState::CountUnique(repr.unique_values.into_keys().collect())
            }
            AggregateKind::CountUniqueHll => {
                let repr: HllRepr = serde_json::from_value(json)?;
                AggregateState::CountUniqueHll(
                    HyperLogLog::from_registers(repr.hll.std_error, repr.hll.registers)
                        .map_err(as_invalid_data)?,
                )
            }
            AggregateKind::Min | AggregateKind::Max => {
                let repr: ExtremumRepr = serde_json::from_value(json)?;
                let bound = if kind == AggregateKind::Min {
                    Bound::Min
                } else {
                    Bound::Max
                };
                let ext = Extremum::with_value(bound, repr.value);
                match bound {
                    Bound::Min => AggregateState::Min(ext),
                    Bound::Max => AggregateState::Max(ext),
                }
            }
            AggregateKind::Exists => {
                let repr: ExistsRepr = serde_json::from_value(json)?;
                let words = repr.bf.buckets.into_iter().map(|w| w as u32).collect();
                AggregateState::Exists {
                    filter: BloomFilter::from_words(repr.bf.k, words)?,
                    value: repr.value,
                }
            }
            AggregateKind::CountMin => {
                let repr: CountMinRepr = serde_json::from_value(json)?;
                AggregateState::CountMin {
                    sketch: CountMinSketch::from_table(
                        repr.cms.accuracy,
                        repr.cms.prob_incorrect,
                        repr.cms.table,
                    )
                    .map_err(as_invalid_data)?,
                    value: repr.value,
                }
            }
        };
        Ok(state)
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            AggregateState::CountUnique(counter) => serde_json::to_value(CountUniqueRepr {
                value: counter.count(),
                unique_values: counter.values().map(|v| (v.to_owned(), 0)).collect(),
            }),
            AggregateState::CountUniqueHll(hll) => serde_json::to_value(HllRepr {
                value: hll_value(hll),
                hll: HllRegisters {
                    registers: hll.registers().to_vec(),
                    std_error: hll.std_error(),
                },
            }),
            AggregateState::Min(ext) | AggregateState::Max(ext) => {
                serde_json::to_value(ExtremumRepr {
                    value: ext.value().cloned(),
                })
            }
            AggregateState::Exists { filter, value } => serde_json::to_value(ExistsRepr {
                value: *value,
                bf: BloomRepr {
                    buckets: filter.words().iter().map(|w| *w as i32).collect(),
                    k: filter.num_hashes(),
                },
            }),
            AggregateState::CountMin { sketch, value } => serde_json::to_value(CountMinRepr {
                value: *value,
                cms: CmsRepr {
                    accuracy: sketch.accuracy(),
                    prob_incorrect: sketch.prob_incorrect(),
                    table: sketch.table().to_vec(),
                },
            }),
        }
    }
}

fn hll_value(hll: &HyperLogLog) -> u64 {
    hll.estimate().round() as u64
}

fn as_invalid_data(err: Error) -> Error {
    Error::invalid_data(err.message().to_owned())
}

/// The aggregates of one document, keyed by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates(BTreeMap<AggregateKind, AggregateState>);

impl Aggregates {
    /// Returns the state of `kind`, if present.
    pub fn get(&self, kind: AggregateKind) -> Option<&AggregateState> {
        self.0.get(&kind)
    }

    /// Returns the observable value of `kind`, if present.
    pub fn value(&self, kind: AggregateKind) -> Option<Value> {
        self.get(kind).map(AggregateState::value)
    }

    /// Returns the state of `kind`, creating it from `params` when absent.
    ///
    /// The boolean is true when the state was created by this call.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a new state cannot be built from `params`.
    pub fn get_or_create(
        &mut self,
        kind: AggregateKind,
        params: &SketchParams,
    ) -> Result<(&mut AggregateState, bool), Error> {
        match self.0.entry(kind) {
            btree_map::Entry::Occupied(entry) => Ok((entry.into_mut(), false)),
            btree_map::Entry::Vacant(entry) => {
                let state = AggregateState::create(kind, params)?;
                Ok((entry.insert(state), true))
            }
        }
    }

    /// Iterates over all aggregates in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (AggregateKind, &AggregateState)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Returns the number of aggregates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the document holds no aggregate.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Aggregates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kind, state) in &self.0 {
            let json = state.to_json().map_err(S::Error::custom)?;
            map.serialize_entry(kind, &json)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Aggregates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<AggregateKind, Value>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(kind, json)| {
                AggregateState::from_json(kind, json)
                    .map(|state| (kind, state))
                    .map_err(|e| {
                        D::Error::custom(format!("aggregate '{}': {}", kind.name(), e.message()))
                    })
            })
            .collect::<Result<_, _>>()
            .map(Aggregates)
    }
}

#[derive(Serialize, Deserialize)]
struct CountUniqueRepr {
    #[serde(default)]
    value: u64,
    #[serde(rename = "uniqueValues", default)]
    unique_values: BTreeMap<String, u8>,
}

#[derive(Serialize, Deserialize)]
struct HllRepr {
    #[serde(default)]
    value: u64,
    hll: HllRegisters,
}

#[derive(Serialize, Deserialize)]
struct HllRegisters {
    #[serde(rename = "M")]
    registers: Vec<u8>,
    std_error: f64,
}

#[derive(Serialize, Deserialize)]
struct ExtremumRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct ExistsRepr {
    #[serde(default)]
    value: bool,
    bf: BloomRepr,
}

#[derive(Serialize, Deserialize)]
struct BloomRepr {
    buckets: Vec<i32>,
    #[serde(default = "default_bloom_hashes")]
    k: u16,
}

fn default_bloom_hashes() -> u16 {
    crate::bloom::DEFAULT_NUM_HASHES
}

#[derive(Serialize, Deserialize)]
struct CountMinRepr {
    #[serde(default)]
    value: u32,
    cms: CmsRepr,
}

#[derive(Serialize, Deserialize)]
struct CmsRepr {
    accuracy: f64,
    #[serde(rename = "probIncorrect")]
    prob_incorrect: f64,
    table: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use serde_json::json;

    use super::*;

    fn params() -> SketchParams {
        SketchParams::default()
    }

    #[test]
    fn test_kind_names_match_serde() {
        for kind in [
            AggregateKind::Min,
            AggregateKind::Max,
            AggregateKind::CountUnique,
            AggregateKind::CountUniqueHll,
            AggregateKind::Exists,
            AggregateKind::CountMin,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.name()));
            assert_eq!(AggregateState::create(kind, &params()).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_exists_reports_change_only_for_new_members() {
        let mut state = AggregateState::create(AggregateKind::Exists, &params()).unwrap();
        assert_eq!(state.value(), json!(false));
        assert!(state.apply("X", &json!("X")));
        assert_eq!(state.value(), json!(true));
        assert!(!state.apply("X", &json!("X")));
    }

    #[test]
    fn test_count_min_always_counts() {
        let mut state = AggregateState::create(AggregateKind::CountMin, &params()).unwrap();
        assert!(state.apply("X", &json!("X")));
        assert!(state.apply("X", &json!("X")));
        assert_eq!(state.value(), json!(2));
    }

    #[test]
    fn test_hll_value_is_rounded_estimate() {
        let mut state = AggregateState::create(AggregateKind::CountUniqueHll, &params()).unwrap();
        assert!(state.apply("X", &json!("X")));
        assert!(state.apply("Y", &json!("Y")));
        assert!(!state.apply("X", &json!("X")));
        assert_eq!(state.value(), json!(2));
    }

    #[test]
    fn test_sketch_keys_hash_utf16_low_bytes() {
        // murmur3 of the low bytes of "héllo" with seed 1
        let hash: u32 = 2872961205;

        let mut hll = AggregateState::create(AggregateKind::CountUniqueHll, &params()).unwrap();
        assert!(hll.apply("héllo", &json!("héllo")));
        let AggregateState::CountUniqueHll(sketch) = &hll else {
            panic!("expected count_unique_hll, got {:?}", hll.kind());
        };
        let bucket = (hash >> (32 - sketch.lg_registers())) as usize;
        assert_eq!(sketch.registers()[bucket], 1);
        assert_eq!(sketch.registers().iter().filter(|r| **r != 0).count(), 1);

        let mut cms = AggregateState::create(AggregateKind::CountMin, &params()).unwrap();
        assert!(cms.apply("héllo", &json!("héllo")));
        let AggregateState::CountMin { sketch, .. } = &cms else {
            panic!("expected count_min, got {:?}", cms.kind());
        };
        let width = sketch.width() as usize;
        let bucket = (hash % sketch.width()) as usize;
        assert_eq!(sketch.table()[bucket], 1);
        assert_eq!(sketch.table()[width + bucket], 1);
        for row in sketch.table().chunks(width) {
            assert_eq!(row.iter().sum::<u32>(), 1);
        }
    }

    #[test]
    fn test_persisted_shapes() {
        let mut unique = AggregateState::create(AggregateKind::CountUnique, &params()).unwrap();
        unique.apply("b", &json!("b"));
        unique.apply("a", &json!("a"));
        assert_snapshot!(unique.to_json().unwrap(), @r#"{"uniqueValues":{"a":0,"b":0},"value":2}"#);

        let mut min = AggregateState::create(AggregateKind::Min, &params()).unwrap();
        assert_snapshot!(min.to_json().unwrap(), @"{}");
        min.apply("5", &json!(5));
        assert_snapshot!(min.to_json().unwrap(), @r#"{"value":5}"#);
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut aggregates = Aggregates::default();
        for kind in [
            AggregateKind::CountUnique,
            AggregateKind::CountUniqueHll,
            AggregateKind::Exists,
            AggregateKind::CountMin,
            AggregateKind::Min,
            AggregateKind::Max,
        ] {
            let (state, created) = aggregates.get_or_create(kind, &params()).unwrap();
            assert!(created);
            state.apply("7", &json!(7));
        }

        let text = serde_json::to_string(&aggregates).unwrap();
        let restored: Aggregates = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, aggregates);
        assert_eq!(restored.value(AggregateKind::Max), Some(json!(7)));
        assert_eq!(restored.len(), 6);
    }

    #[test]
    fn test_malformed_state_is_rejected() {
        let err = AggregateState::from_json(
            AggregateKind::CountUniqueHll,
            json!({ "value": 0, "hll": { "M": [0, 0, 0], "std_error": 0.175 } }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidData);

        let err = AggregateState::from_json(AggregateKind::CountMin, json!({ "value": 1 }))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidData);

        assert!(serde_json::from_value::<Aggregates>(json!({ "median": { "value": 1 } })).is_err());
    }
}
