use std::sync::Arc;

use super::{
    Format,
    errors::{RingError, RingResult},
    ntt::reverse_bits,
    params::ElementParams,
};
use crate::math::modular::{
    add_mod, centered, mul_mod, neg_mod, reduce_signed, sub_mod,
};

/// A polynomial in `Z_q[X] / (X^n + 1)` for a single word-sized prime `q`.
///
/// # Invariants
/// - `values.len() == params.ring_dim()`
/// - every value is reduced into `[0, q)`
/// - in [`Format::Evaluation`] the values are NTT slots in bit-reversed order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativePoly {
    params: Arc<ElementParams>,
    values: Vec<u64>,
    format: Format,
}

// ─── Constructors ─────────────────────────────────────────────────────────────

impl NativePoly {
    pub fn zero(params: Arc<ElementParams>, format: Format) -> Self {
        let values = vec![0u64; params.ring_dim()];
        Self {
            params,
            values,
            format,
        }
    }

    /// Wraps already-reduced values.
    pub fn from_values(
        params: Arc<ElementParams>,
        values: Vec<u64>,
        format: Format,
    ) -> RingResult<Self> {
        if values.len() != params.ring_dim() {
            return Err(RingError::LengthMismatch {
                expected: params.ring_dim(),
                actual: values.len(),
            });
        }
        let q = params.modulus();
        if let Some(&value) = values.iter().find(|&&v| v >= q) {
            return Err(RingError::NonReducedValue { value, modulus: q });
        }
        Ok(Self {
            params,
            values,
            format,
        })
    }

    /// Builds a coefficient-format polynomial from signed coefficients.
    ///
    /// Missing trailing coefficients are zero; extra ones are rejected.
    pub fn from_signed(params: Arc<ElementParams>, coeffs: &[i64]) -> RingResult<Self> {
        let n = params.ring_dim();
        if coeffs.len() > n {
            return Err(RingError::LengthMismatch {
                expected: n,
                actual: coeffs.len(),
            });
        }
        let q = params.modulus();
        let mut values = vec![0u64; n];
        for (value, &c) in values.iter_mut().zip(coeffs) {
            *value = reduce_signed(c, q);
        }
        Ok(Self {
            params,
            values,
            format: Format::Coefficient,
        })
    }

    pub(crate) fn new_unchecked(params: Arc<ElementParams>, values: Vec<u64>, format: Format) -> Self {
        Self {
            params,
            values,
            format,
        }
    }
}

// ─── Accessors & format conversion ───────────────────────────────────────────

impl NativePoly {
    pub fn params(&self) -> &Arc<ElementParams> {
        &self.params
    }

    pub fn modulus(&self) -> u64 {
        self.params.modulus()
    }

    pub fn ring_dim(&self) -> usize {
        self.values.len()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [u64] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<u64> {
        self.values
    }

    /// Centred coefficient `i` in `(-q/2, q/2]`.
    pub fn centered_value(&self, index: usize) -> i64 {
        centered(self.values[index], self.modulus())
    }

    /// Flips between coefficient and evaluation representation.
    pub fn switch_format(&mut self) {
        match self.format {
            Format::Coefficient => {
                self.params.ntt().forward_in_place(&mut self.values);
                self.format = Format::Evaluation;
            }
            Format::Evaluation => {
                self.params.ntt().inverse_in_place(&mut self.values);
                self.format = Format::Coefficient;
            }
        }
    }

    pub fn set_format(&mut self, format: Format) {
        if self.format != format {
            self.switch_format();
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.set_format(format);
        self
    }
}

// ─── Arithmetic ───────────────────────────────────────────────────────────────

impl NativePoly {
    fn check_compatible(&self, rhs: &Self, operation: &'static str) -> RingResult<()> {
        if self.params != rhs.params {
            return Err(RingError::ParamsMismatch { operation });
        }
        if self.format != rhs.format {
            return Err(RingError::FormatMismatch {
                expected: self.format,
                actual: rhs.format,
            });
        }
        Ok(())
    }

    pub fn plus_assign(&mut self, rhs: &Self) -> RingResult<()> {
        self.check_compatible(rhs, "plus")?;
        let q = self.modulus();
        for (a, &b) in self.values.iter_mut().zip(&rhs.values) {
            *a = add_mod(*a, b, q);
        }
        Ok(())
    }

    pub fn minus_assign(&mut self, rhs: &Self) -> RingResult<()> {
        self.check_compatible(rhs, "minus")?;
        let q = self.modulus();
        for (a, &b) in self.values.iter_mut().zip(&rhs.values) {
            *a = sub_mod(*a, b, q);
        }
        Ok(())
    }

    /// Slot-wise product; only defined in evaluation format.
    pub fn times_assign(&mut self, rhs: &Self) -> RingResult<()> {
        self.check_compatible(rhs, "times")?;
        if self.format != Format::Evaluation {
            return Err(RingError::UnsupportedFormat {
                operation: "times",
                format: self.format,
            });
        }
        let q = self.modulus();
        for (a, &b) in self.values.iter_mut().zip(&rhs.values) {
            *a = mul_mod(*a, b, q);
        }
        Ok(())
    }

    pub fn plus(&self, rhs: &Self) -> RingResult<Self> {
        let mut out = self.clone();
        out.plus_assign(rhs)?;
        Ok(out)
    }

    pub fn minus(&self, rhs: &Self) -> RingResult<Self> {
        let mut out = self.clone();
        out.minus_assign(rhs)?;
        Ok(out)
    }

    pub fn times(&self, rhs: &Self) -> RingResult<Self> {
        let mut out = self.clone();
        out.times_assign(rhs)?;
        Ok(out)
    }

    pub fn negate_assign(&mut self) {
        let q = self.modulus();
        for a in self.values.iter_mut() {
            *a = neg_mod(*a, q);
        }
    }

    pub fn times_scalar_assign(&mut self, scalar: u64) {
        let q = self.modulus();
        let s = scalar % q;
        for a in self.values.iter_mut() {
            *a = mul_mod(*a, s, q);
        }
    }

    /// Adds a constant polynomial: to coefficient 0 in coefficient format,
    /// to every slot in evaluation format.
    pub fn plus_scalar_assign(&mut self, scalar: u64) {
        let q = self.modulus();
        let s = scalar % q;
        match self.format {
            Format::Coefficient => self.values[0] = add_mod(self.values[0], s, q),
            Format::Evaluation => {
                for a in self.values.iter_mut() {
                    *a = add_mod(*a, s, q);
                }
            }
        }
    }

    /// `self += rhs * scalar`.
    pub fn plus_scaled_assign(&mut self, rhs: &Self, scalar: u64) -> RingResult<()> {
        self.check_compatible(rhs, "plus_scaled")?;
        let q = self.modulus();
        let s = scalar % q;
        for (a, &b) in self.values.iter_mut().zip(&rhs.values) {
            *a = add_mod(*a, mul_mod(b, s, q), q);
        }
        Ok(())
    }
}

// ─── Automorphisms & modulus switching ───────────────────────────────────────

impl NativePoly {
    /// Applies `X -> X^index`; `index` must be odd (hence a unit modulo the
    /// power-of-two cyclotomic order).
    pub fn automorphism_transform(&self, index: u64) -> RingResult<Self> {
        let m = self.params.cyclotomic_order();
        if index % 2 == 0 {
            return Err(RingError::InvalidAutomorphismIndex {
                index,
                cyclotomic_order: m,
            });
        }
        let n = self.ring_dim();
        let two_n = 2 * n as u64;
        let k = index % two_n;
        let q = self.modulus();
        let mut out = vec![0u64; n];
        match self.format {
            Format::Coefficient => {
                for (j, &value) in self.values.iter().enumerate() {
                    let target = (j as u64 * k) % two_n;
                    if target < n as u64 {
                        out[target as usize] = value;
                    } else {
                        out[(target - n as u64) as usize] = neg_mod(value, q);
                    }
                }
            }
            Format::Evaluation => {
                let bits = n.trailing_zeros();
                for (l, slot) in (0..n).map(|l| (l, reverse_bits(l, bits))) {
                    let exponent = (k * (2 * l as u64 + 1)) % two_n;
                    let source = reverse_bits(((exponent - 1) / 2) as usize, bits);
                    out[slot] = self.values[source];
                }
            }
        }
        Ok(Self::new_unchecked(self.params.clone(), out, self.format))
    }

    /// Re-reduces the centred coefficients modulo the target tower.
    pub fn switch_modulus(&self, target: Arc<ElementParams>) -> RingResult<Self> {
        if self.format != Format::Coefficient {
            return Err(RingError::UnsupportedFormat {
                operation: "switch_modulus",
                format: self.format,
            });
        }
        let q = self.modulus();
        let p = target.modulus();
        let values = self
            .values
            .iter()
            .map(|&v| reduce_signed(centered(v, q), p))
            .collect();
        Ok(Self::new_unchecked(target, values, Format::Coefficient))
    }

    /// Number of base-`2^window` digits of a residue.
    pub fn window_count(&self, window: u32) -> RingResult<usize> {
        if window == 0 || window > 62 {
            return Err(RingError::InvalidWindow { window });
        }
        let bits = 64 - self.modulus().leading_zeros();
        Ok(bits.div_ceil(window) as usize)
    }

    /// Digits of every coefficient in base `2^window`, least significant
    /// first; each digit is a coefficient-format polynomial.
    pub fn base_decompose(&self, window: u32) -> RingResult<Vec<Self>> {
        if self.format != Format::Coefficient {
            return Err(RingError::UnsupportedFormat {
                operation: "base_decompose",
                format: self.format,
            });
        }
        let count = self.window_count(window)?;
        let mask = (1u64 << window) - 1;
        Ok((0..count)
            .map(|k| {
                let shift = k as u32 * window;
                let values = self.values.iter().map(|&v| (v >> shift) & mask).collect();
                Self::new_unchecked(self.params.clone(), values, Format::Coefficient)
            })
            .collect())
    }

    /// `self * 2^(window * k)` for every digit position `k`.
    pub fn powers_of_base(&self, window: u32) -> RingResult<Vec<Self>> {
        let count = self.window_count(window)?;
        let q = self.modulus();
        Ok((0..count)
            .map(|k| {
                let mut power = self.clone();
                let factor = crate::math::modular::pow_mod(2, (k as u32 * window) as u64, q);
                power.times_scalar_assign(factor);
                power
            })
            .collect())
    }
}
