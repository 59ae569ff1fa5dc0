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

use crate::error::Error;
use crate::hash::murmurhash3_32;

const MAX_TABLE_ENTRIES: usize = 1 << 24;

/// Count-Min sketch for estimating item frequencies.
///
/// The counter table is stored row-major: row `r` occupies
/// `table[r * width..(r + 1) * width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountMinSketch {
    accuracy: f64,
    prob_incorrect: f64,
    width: u32,
    depth: u32,
    table: Box<[u32]>,
}

impl CountMinSketch {
    /// Creates an empty sketch with `width = ceil(e / accuracy)` and
    /// `depth = ceil(-ln(prob_incorrect))`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `accuracy` is not in (0, 1], `prob_incorrect`
    /// is not in (0, 1), or the table would be too large.
    pub fn new(accuracy: f64, prob_incorrect: f64) -> Result<Self, Error> {
        let (width, depth) = Self::dimensions(accuracy, prob_incorrect)?;
        Ok(CountMinSketch {
            accuracy,
            prob_incorrect,
            width,
            depth,
            table: vec![0u32; width as usize * depth as usize].into_boxed_slice(),
        })
    }

    /// Rebuilds a sketch from a persisted counter table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for bad parameters and `InvalidData` if the
    /// table length is not `width * depth`.
    pub fn from_table(accuracy: f64, prob_incorrect: f64, table: Vec<u32>) -> Result<Self, Error> {
        let (width, depth) = Self::dimensions(accuracy, prob_incorrect)?;
        let expected = width as usize * depth as usize;
        if table.len() != expected {
            return Err(Error::malformed(
                "count-min table",
                format!("expected {expected} counters ({width}x{depth}), got {}", table.len()),
            ));
        }
        Ok(CountMinSketch {
            accuracy,
            prob_incorrect,
            width,
            depth,
            table: table.into_boxed_slice(),
        })
    }

    /// Suggests the number of counters per row for the given relative accuracy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `accuracy` is not in (0, 1].
    pub fn suggest_width(accuracy: f64) -> Result<u32, Error> {
        if !(accuracy > 0.0 && accuracy <= 1.0) {
            return Err(Error::invalid_argument(format!(
                "accuracy must be in (0, 1], got {accuracy}"
            )));
        }
        Ok((std::f64::consts::E / accuracy).ceil() as u32)
    }

    /// Suggests the number of rows for the given probability of exceeding the bound.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `prob_incorrect` is not in (0, 1).
    pub fn suggest_depth(prob_incorrect: f64) -> Result<u32, Error> {
        if !(prob_incorrect > 0.0 && prob_incorrect < 1.0) {
            return Err(Error::invalid_argument(format!(
                "prob_incorrect must be in (0, 1), got {prob_incorrect}"
            )));
        }
        Ok((-prob_incorrect.ln()).ceil() as u32)
    }

    /// Returns the configured accuracy.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Returns the configured probability of exceeding the accuracy bound.
    pub fn prob_incorrect(&self) -> f64 {
        self.prob_incorrect
    }

    /// Returns the number of counters per row.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the number of rows.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns the counter table, row-major.
    pub fn table(&self) -> &[u32] {
        &self.table
    }

    /// Returns the relative error (epsilon) implied by the width.
    pub fn relative_error(&self) -> f64 {
        std::f64::consts::E / f64::from(self.width)
    }

    /// Returns the total weight inserted into the sketch.
    ///
    /// Every update touches exactly one counter per row, so any row sums to the
    /// total.
    pub fn total_weight(&self) -> u64 {
        self.table[..self.width as usize]
            .iter()
            .map(|c| u64::from(*c))
            .sum()
    }

    /// Returns true if the sketch has not seen any updates.
    pub fn is_empty(&self) -> bool {
        self.table.iter().all(|c| *c == 0)
    }

    /// Adds `delta` occurrences of `key`. Counters saturate at `u32::MAX`.
    pub fn update(&mut self, key: impl AsRef<[u8]>, delta: u32) {
        let key = key.as_ref();
        for row in 0..self.depth {
            let index = self.index(key, row);
            self.table[index] = self.table[index].saturating_add(delta);
        }
    }

    /// Returns the estimated frequency of `key`: the minimum of its counters.
    pub fn query(&self, key: impl AsRef<[u8]>) -> u32 {
        let key = key.as_ref();
        (0..self.depth)
            .map(|row| self.table[self.index(key, row)])
            .min()
            .unwrap_or(0)
    }

    /// Merges another sketch into this one by adding counters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the sketches have different dimensions.
    pub fn merge(&mut self, other: &CountMinSketch) -> Result<(), Error> {
        if self.width != other.width || self.depth != other.depth {
            return Err(Error::incompatible(
                "CountMinSketch",
                format!(
                    "{}x{} vs {}x{}",
                    self.width, self.depth, other.width, other.depth
                ),
            ));
        }
        for (dst, src) in self.table.iter_mut().zip(other.table.iter()) {
            *dst = dst.saturating_add(*src);
        }
        Ok(())
    }

    fn dimensions(accuracy: f64, prob_incorrect: f64) -> Result<(u32, u32), Error> {
        let width = Self::suggest_width(accuracy)?;
        let depth = Self::suggest_depth(prob_incorrect)?;
        let entries = width as usize * depth as usize;
        if entries == 0 || entries > MAX_TABLE_ENTRIES {
            return Err(Error::invalid_argument(format!(
                "width * depth must be in [1, {MAX_TABLE_ENTRIES}], got {width}x{depth}"
            )));
        }
        Ok((width, depth))
    }

    // row r is hashed with seed r, so rows 0 and 1 share a hash
    fn index(&self, key: &[u8], row: u32) -> usize {
        let bucket = murmurhash3_32(key, row) % self.width;
        (row * self.width + bucket) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dimensions() {
        let sketch = CountMinSketch::new(0.1, 0.0001).unwrap();
        assert_eq!(sketch.width(), 28);
        assert_eq!(sketch.depth(), 10);
        assert_eq!(sketch.table().len(), 280);
        assert!(sketch.is_empty());
        assert_eq!(sketch.query("missing"), 0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(CountMinSketch::new(0.0, 0.01).is_err());
        assert!(CountMinSketch::new(1.5, 0.01).is_err());
        assert!(CountMinSketch::new(0.1, 0.0).is_err());
        assert!(CountMinSketch::new(0.1, 1.0).is_err());
        assert!(CountMinSketch::new(1e-9, 0.01).is_err());
    }

    #[test]
    fn test_from_table_checks_length() {
        assert!(CountMinSketch::from_table(0.1, 0.0001, vec![0; 280]).is_ok());
        assert!(CountMinSketch::from_table(0.1, 0.0001, vec![0; 279]).is_err());
    }

    #[test]
    fn test_update_and_total_weight() {
        let mut sketch = CountMinSketch::new(0.1, 0.0001).unwrap();
        sketch.update("x", 1);
        sketch.update("x", 9);
        sketch.update("y", 5);
        assert!(sketch.query("x") >= 10);
        assert!(sketch.query("y") >= 5);
        assert_eq!(sketch.total_weight(), 15);
    }

    #[test]
    fn test_saturating_counters() {
        let mut sketch = CountMinSketch::new(0.5, 0.5).unwrap();
        sketch.update("x", u32::MAX);
        sketch.update("x", 1);
        assert_eq!(sketch.query("x"), u32::MAX);
    }
}
