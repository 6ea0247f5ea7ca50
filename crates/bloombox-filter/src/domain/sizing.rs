//! Analytical Bloom filter sizing
//!
//! Standard optimum formulas:
//! - m = -n*ln(ε) / (ln(2)^2)   -- minimal bits
//! - k = max(1, ceil(-log2(ε))) -- hash slices
//! - ε = e^(-(m/n)*ln(2)^2)     -- achievable rate for a given density
//!
//! Any two of {m, n, ε} determine the third. The vector is always rounded up
//! to a whole number of equally sized partitions, so `effective_bits` may
//! exceed the requested m; the difference is accounted as waste.

use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Derived sizing parameters of a partitioned Bloom filter
///
/// Constructed through exactly one of the three `from_*` forms; the struct is
/// immutable afterwards and travels inside persisted store headers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSizing {
    /// Requested minimal size in bits (m)
    m: u64,
    /// Expected number of elements (n)
    n: u64,
    /// False positive rate (ε)
    epsilon: f64,
    /// Number of hash slices / partitions (k)
    k: u32,
}

impl FilterSizing {
    /// Derive (m, k) from an expected element count and a target rate.
    pub fn from_elements_and_fpr(n: u64, epsilon: f64) -> Result<Self, FilterError> {
        if n == 0 {
            return Err(FilterError::InvalidElementCount);
        }
        check_fpr(epsilon)?;

        let m = (-(n as f64) * epsilon.ln() / (LN_2 * LN_2)).ceil() as u64;
        Ok(Self {
            m,
            n,
            epsilon,
            k: optimal_k(epsilon),
        })
    }

    /// Derive the element capacity from a target rate and a bit budget.
    pub fn from_fpr_and_bits(epsilon: f64, m: u64) -> Result<Self, FilterError> {
        check_fpr(epsilon)?;
        if m == 0 {
            return Err(FilterError::InvalidBitCount);
        }

        // Inverse of m = -n*ln(ε)/ln(2)^2, rounded down so the rate holds.
        let n = (-(m as f64) * LN_2 * LN_2 / epsilon.ln()).floor() as u64;
        if n == 0 {
            return Err(FilterError::InvalidBitCount);
        }
        Ok(Self {
            m,
            n,
            epsilon,
            k: optimal_k(epsilon),
        })
    }

    /// Derive (k, ε) from a bit budget and an expected element count.
    pub fn from_bits_and_elements(m: u64, n: u64) -> Result<Self, FilterError> {
        if m == 0 {
            return Err(FilterError::InvalidBitCount);
        }
        if n == 0 {
            return Err(FilterError::InvalidElementCount);
        }

        let density = m as f64 / n as f64;
        let k = ((density * LN_2).round() as u32).max(1);
        let epsilon = (-density * LN_2 * LN_2).exp();
        Ok(Self { m, n, epsilon, k })
    }

    /// Requested minimal size in bits.
    pub fn m(&self) -> u64 {
        self.m
    }

    /// Expected number of elements.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Configured false positive rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Number of hash slices, equal to the number of partitions.
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Width of one partition: ceil(m / k).
    pub fn partition_size(&self) -> u64 {
        self.m.div_ceil(self.k as u64)
    }

    /// Allocated vector size: partition_size * k, always >= m.
    pub fn effective_bits(&self) -> u64 {
        self.partition_size() * self.k as u64
    }

    /// Bits allocated beyond the requested m.
    pub fn waste(&self) -> u64 {
        self.effective_bits() - self.m
    }

    /// Number of 64-bit words in one record vector.
    pub fn vector_words(&self) -> usize {
        self.effective_bits().div_ceil(64) as usize
    }
}

/// k = max(1, ceil(-log2(ε)))
fn optimal_k(epsilon: f64) -> u32 {
    ((-epsilon.log2()).ceil() as u32).max(1)
}

fn check_fpr(epsilon: f64) -> Result<(), FilterError> {
    if !epsilon.is_finite() || epsilon <= 0.0 || epsilon >= 1.0 {
        return Err(FilterError::InvalidFpr { epsilon });
    }
    Ok(())
}
