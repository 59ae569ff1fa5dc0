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

//! Configuration for sketch construction and update dispatch.
//!
//! Both structs deserialize from JSON with every field optional; missing fields
//! take the defaults documented on each field.
//!
//! ```rust
//! # use metasketch::config::DispatchConfig;
//! let json = r#"{ "batch_size": 4, "sketch": { "hll_std_error": 0.05 } }"#;
//! let config = DispatchConfig::from_json(json).unwrap();
//! assert_eq!(config.batch_size, 4);
//! assert_eq!(config.max_attempts, 100);
//! assert_eq!(config.sketch.hll_std_error, 0.05);
//! assert_eq!(config.sketch.bloom_bits, 1000);
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::countmin::CountMinSketch;
use crate::error::Error;
use crate::hll::HyperLogLog;

/// Parameters used when an aggregate is created for the first time.
///
/// Once an aggregate exists its parameters are read back from the persisted
/// state; changing these values only affects aggregates created afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchParams {
    /// HyperLogLog standard error (default 0.175, 64 registers).
    pub hll_std_error: f64,
    /// Requested Bloom filter size in bits (default 1000, rounded up to 1024).
    pub bloom_bits: u32,
    /// Bloom filter hash count (default 4).
    pub bloom_hashes: u16,
    /// Count-Min relative accuracy (default 0.1).
    pub cms_accuracy: f64,
    /// Count-Min probability of exceeding the accuracy bound (default 0.0001).
    pub cms_prob_incorrect: f64,
}

impl Default for SketchParams {
    fn default() -> Self {
        Self {
            hll_std_error: 0.175,
            bloom_bits: 1000,
            bloom_hashes: 4,
            cms_accuracy: crate::countmin::DEFAULT_ACCURACY,
            cms_prob_incorrect: crate::countmin::DEFAULT_PROB_INCORRECT,
        }
    }
}

impl SketchParams {
    /// Sets the HyperLogLog standard error.
    pub fn hll_std_error(mut self, std_error: f64) -> Self {
        self.hll_std_error = std_error;
        self
    }

    /// Sets the Bloom filter size and hash count.
    pub fn bloom(mut self, bits: u32, hashes: u16) -> Self {
        self.bloom_bits = bits;
        self.bloom_hashes = hashes;
        self
    }

    /// Sets the Count-Min accuracy parameters.
    pub fn count_min(mut self, accuracy: f64, prob_incorrect: f64) -> Self {
        self.cms_accuracy = accuracy;
        self.cms_prob_incorrect = prob_incorrect;
        self
    }

    /// Checks that every sketch can be built from these parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first bad parameter.
    pub fn validate(&self) -> Result<(), Error> {
        HyperLogLog::lg_registers_for(self.hll_std_error)
            .map_err(|e| e.with_context("param", "hll_std_error"))?;
        if self.bloom_bits == 0 || self.bloom_bits > crate::bloom::MAX_NUM_BITS {
            return Err(Error::invalid_argument(format!(
                "bloom_bits must be in [1, {}], got {}",
                crate::bloom::MAX_NUM_BITS,
                self.bloom_bits
            )));
        }
        if self.bloom_hashes == 0 || self.bloom_hashes > crate::bloom::MAX_NUM_HASHES {
            return Err(Error::invalid_argument(format!(
                "bloom_hashes must be in [1, {}], got {}",
                crate::bloom::MAX_NUM_HASHES,
                self.bloom_hashes
            )));
        }
        CountMinSketch::new(self.cms_accuracy, self.cms_prob_incorrect)
            .map_err(|e| e.with_context("param", "cms"))?;
        Ok(())
    }
}

/// Configuration of the dispatch and retry layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of raw records expanded and updated concurrently (default 10).
    pub batch_size: usize,
    /// Attempts per event before a retryable failure becomes fatal (default 100).
    pub max_attempts: u32,
    /// Base delay of the exponential backoff between retries, in milliseconds.
    /// Zero (the default) retries immediately.
    pub retry_backoff_ms: u64,
    /// Upper bound of the backoff delay, in milliseconds (default 1000).
    pub max_backoff_ms: u64,
    /// Record fields treated as entities (default `eid`, `cid`, `uid`).
    pub entities: Vec<String>,
    /// Record fields treated as features (default `time`, `src_evt`, `cat`, `obj`).
    pub features: Vec<String>,
    /// Parameters for newly created aggregates.
    pub sketch: SketchParams,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_attempts: 100,
            retry_backoff_ms: 0,
            max_backoff_ms: 1000,
            entities: ["eid", "cid", "uid"].map(String::from).to_vec(),
            features: ["time", "src_evt", "cat", "obj"].map(String::from).to_vec(),
            sketch: SketchParams::default(),
        }
    }
}

impl DispatchConfig {
    /// Parses a configuration from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the JSON is malformed and `InvalidArgument` if a
    /// value is out of range.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let config: DispatchConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the maximum number of attempts per event.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base and maximum retry backoff.
    pub fn retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry_backoff_ms = base.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Sets the sketch parameters.
    pub fn sketch(mut self, sketch: SketchParams) -> Self {
        self.sketch = sketch;
        self
    }

    /// Returns the delay before retry number `retry` (1-based), if any.
    pub fn backoff(&self, retry: u32) -> Option<Duration> {
        if self.retry_backoff_ms == 0 {
            return None;
        }
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        let delay = self.retry_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Some(Duration::from_millis(delay))
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first bad value.
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::invalid_argument("batch_size must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(Error::invalid_argument("max_attempts must be at least 1"));
        }
        if self.entities.is_empty() || self.features.is_empty() {
            return Err(Error::invalid_argument(
                "entities and features must not be empty",
            ));
        }
        self.sketch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_attempts, 100);
        assert_eq!(config.entities.len() * config.features.len(), 12);
        assert!(config.validate().is_ok());
        assert_eq!(config.backoff(1), None);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(DispatchConfig::from_json("{}").unwrap(), DispatchConfig::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(DispatchConfig::from_json(r#"{ "batch_size": 0 }"#).is_err());
        assert!(DispatchConfig::from_json(r#"{ "sketch": { "hll_std_error": 2.0 } }"#).is_err());
        assert!(DispatchConfig::from_json(r#"{ "sketch": { "bloom_hashes": 0 } }"#).is_err());
        assert!(DispatchConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let config = DispatchConfig::default()
            .retry_backoff(Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(config.backoff(1), Some(Duration::from_millis(10)));
        assert_eq!(config.backoff(2), Some(Duration::from_millis(20)));
        assert_eq!(config.backoff(3), Some(Duration::from_millis(40)));
        assert_eq!(config.backoff(4), Some(Duration::from_millis(50)));
        assert_eq!(config.backoff(90), Some(Duration::from_millis(50)));
    }
}
