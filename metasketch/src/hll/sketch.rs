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
use crate::hash::HLL_SEED;
use crate::hash::murmurhash3_32;
use crate::hll::MAX_LG_REGISTERS;
use crate::hll::MIN_LG_REGISTERS;

const POW_2_32: f64 = 4294967296.0;

/// A HyperLogLog sketch.
///
/// See the [hll module level documentation](crate::hll) for more.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperLogLog {
    std_error: f64,
    lg_registers: u8,
    registers: Box<[u8]>,
}

impl HyperLogLog {
    /// Create an empty sketch for the given standard error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `std_error` is not a positive finite number or
    /// implies fewer than 16 or more than 65536 registers.
    ///
    /// # Examples
    ///
    /// ```
    /// # use metasketch::hll::HyperLogLog;
    /// let sketch = HyperLogLog::new(0.175).unwrap();
    /// assert_eq!(sketch.num_registers(), 64);
    /// assert!(HyperLogLog::new(0.5).is_err());
    /// ```
    pub fn new(std_error: f64) -> Result<Self, Error> {
        let lg_registers = Self::lg_registers_for(std_error)?;
        Ok(Self {
            std_error,
            lg_registers,
            registers: vec![0u8; 1 << lg_registers].into_boxed_slice(),
        })
    }

    /// Rebuild a sketch from persisted registers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a bad `std_error`, and `InvalidData` if the
    /// register count does not match `std_error` or a register holds a rank that
    /// no update could have produced.
    pub fn from_registers(std_error: f64, registers: Vec<u8>) -> Result<Self, Error> {
        let lg_registers = Self::lg_registers_for(std_error)?;
        let expected = 1usize << lg_registers;
        if registers.len() != expected {
            return Err(Error::malformed(
                "hll registers",
                format!("expected {expected} registers, got {}", registers.len()),
            ));
        }
        let max_rank = max_rank(lg_registers);
        if let Some(bad) = registers.iter().find(|r| **r > max_rank) {
            return Err(Error::malformed(
                "hll registers",
                format!("rank {bad} exceeds maximum {max_rank}"),
            ));
        }
        Ok(Self {
            std_error,
            lg_registers,
            registers: registers.into_boxed_slice(),
        })
    }

    /// Returns `k` such that the sketch has `2^k` registers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `std_error` is out of range.
    pub fn lg_registers_for(std_error: f64) -> Result<u8, Error> {
        if !std_error.is_finite() || std_error <= 0.0 {
            return Err(Error::invalid_argument(format!(
                "std_error must be a positive finite number, got {std_error}"
            )));
        }
        let m = 1.04 / std_error;
        let lg = (m * m).log2().ceil();
        if lg < f64::from(MIN_LG_REGISTERS) || lg > f64::from(MAX_LG_REGISTERS) {
            return Err(Error::invalid_argument(format!(
                "std_error {std_error} requires 2^{lg} registers, \
                 supported range is 2^{MIN_LG_REGISTERS}..=2^{MAX_LG_REGISTERS}"
            )));
        }
        Ok(lg as u8)
    }

    /// Update the sketch with an item.
    ///
    /// Returns whether a register was raised. Empty items are ignored.
    pub fn update(&mut self, item: impl AsRef<[u8]>) -> bool {
        let bytes = item.as_ref();
        if bytes.is_empty() {
            return false;
        }

        let hash = murmurhash3_32(bytes, HLL_SEED);
        let bucket = (hash >> (32 - self.lg_registers)) as usize;
        let rank = (hash.trailing_zeros() as u8 + 1).min(max_rank(self.lg_registers));

        if rank > self.registers[bucket] {
            self.registers[bucket] = rank;
            true
        } else {
            false
        }
    }

    /// Get the current cardinality estimate.
    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let sum: f64 = self
            .registers
            .iter()
            .map(|r| 2f64.powi(-i32::from(*r)))
            .sum();
        let raw = alpha(self.registers.len()) * m * m / sum;

        if raw <= 2.5 * m {
            // linear counting
            let zeros = self.num_zeros();
            if zeros > 0 {
                return m * (m / zeros as f64).ln();
            }
            raw
        } else if raw > POW_2_32 / 30.0 && raw < POW_2_32 {
            -POW_2_32 * (1.0 - raw / POW_2_32).ln()
        } else {
            raw
        }
    }

    /// Merge another sketch into this one (register-wise maximum).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the sketches are not compatible.
    pub fn union(&mut self, other: &HyperLogLog) -> Result<(), Error> {
        self.combine(other, |a, b| a.max(b))
    }

    /// Register-wise minimum.
    ///
    /// This is *not* a sound estimator of the intersection cardinality.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the sketches are not compatible.
    pub fn intersect(&mut self, other: &HyperLogLog) -> Result<(), Error> {
        self.combine(other, |a, b| a.min(b))
    }

    /// Keeps registers strictly greater than the other sketch's, zeroing the rest.
    ///
    /// This is *not* a sound estimator of the difference cardinality.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the sketches are not compatible.
    pub fn without(&mut self, other: &HyperLogLog) -> Result<(), Error> {
        self.combine(other, |a, b| if a > b { a } else { 0 })
    }

    /// Checks if two sketches are compatible for merging.
    pub fn is_compatible(&self, other: &HyperLogLog) -> bool {
        self.lg_registers == other.lg_registers && self.std_error == other.std_error
    }

    /// Returns true if no item has been added.
    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|r| *r == 0)
    }

    /// Returns the standard error the sketch was created with.
    pub fn std_error(&self) -> f64 {
        self.std_error
    }

    /// Returns `k`, the log2 of the register count.
    pub fn lg_registers(&self) -> u8 {
        self.lg_registers
    }

    /// Returns the register count `m`.
    pub fn num_registers(&self) -> usize {
        self.registers.len()
    }

    /// Returns the register values.
    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    fn num_zeros(&self) -> usize {
        self.registers.iter().filter(|r| **r == 0).count()
    }

    fn combine(&mut self, other: &HyperLogLog, op: impl Fn(u8, u8) -> u8) -> Result<(), Error> {
        if !self.is_compatible(other) {
            return Err(Error::incompatible(
                "HyperLogLog",
                format!(
                    "2^{} registers at std_error {} vs 2^{} registers at std_error {}",
                    self.lg_registers, self.std_error, other.lg_registers, other.std_error
                ),
            ));
        }
        for (dst, src) in self.registers.iter_mut().zip(other.registers.iter()) {
            *dst = op(*dst, *src);
        }
        Ok(())
    }
}

fn max_rank(lg_registers: u8) -> u8 {
    32 - lg_registers + 1
}

fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_count_from_std_error() {
        assert_eq!(HyperLogLog::lg_registers_for(0.175).unwrap(), 6);
        assert_eq!(HyperLogLog::lg_registers_for(0.26).unwrap(), 4);
        assert_eq!(HyperLogLog::lg_registers_for(0.02).unwrap(), 12);
        assert!(HyperLogLog::lg_registers_for(0.0).is_err());
        assert!(HyperLogLog::lg_registers_for(f64::NAN).is_err());
        assert!(HyperLogLog::lg_registers_for(0.001).is_err());
    }

    #[test]
    fn test_alpha_constants() {
        assert_eq!(alpha(16), 0.673);
        assert_eq!(alpha(32), 0.697);
        assert_eq!(alpha(64), 0.709);
        assert!((alpha(4096) - 0.7213 / (1.0 + 1.079 / 4096.0)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_estimate_is_zero() {
        let sketch = HyperLogLog::new(0.175).unwrap();
        assert!(sketch.is_empty());
        assert_eq!(sketch.estimate(), 0.0);
    }

    #[test]
    fn test_update_reports_register_change() {
        let mut sketch = HyperLogLog::new(0.175).unwrap();
        assert!(sketch.update("X"));
        assert!(!sketch.update("X"));
        assert!(!sketch.update(""));
    }

    #[test]
    fn test_two_values_linear_counting() {
        let mut sketch = HyperLogLog::new(0.175).unwrap();
        sketch.update("X");
        sketch.update("Y");
        assert_eq!(sketch.estimate().round(), 2.0);
    }

    #[test]
    fn test_rank_is_capped() {
        let mut sketch = HyperLogLog::new(0.26).unwrap();
        for i in 0..10_000 {
            sketch.update(format!("item-{i}"));
        }
        assert!(sketch.registers().iter().all(|r| *r <= 29));
    }

    #[test]
    fn test_from_registers_validation() {
        assert!(HyperLogLog::from_registers(0.175, vec![0; 64]).is_ok());
        assert!(HyperLogLog::from_registers(0.175, vec![0; 63]).is_err());
        assert!(HyperLogLog::from_registers(0.175, vec![28; 64]).is_err());
        assert!(HyperLogLog::from_registers(0.175, vec![27; 64]).is_ok());
    }

    #[test]
    fn test_incompatible_union() {
        let mut left = HyperLogLog::new(0.175).unwrap();
        let right = HyperLogLog::new(0.05).unwrap();
        assert!(left.union(&right).is_err());
    }
}
