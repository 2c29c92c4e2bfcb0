//! Double-CRT ring elements: one [`NativePoly`] tower per modulus of a chain.

use std::sync::Arc;

use super::{
    Format,
    errors::{RingError, RingResult},
    params::{DcrtParams, same_params},
    poly::NativePoly,
};
use crate::math::{
    bigint::{CrtReconstruction, WideUint},
    modular::{inv_mod, reduce_signed},
};

/// A polynomial represented by its residues modulo every tower of a chain.
///
/// # Invariants
/// - `towers.len() == params.len()` and tower `i` lives modulo `params.tower(i)`
/// - every tower carries `format`
///
/// The number of towers is the element's level; dropping towers is one-way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcrtPoly {
    params: Arc<DcrtParams>,
    towers: Vec<NativePoly>,
    format: Format,
}

// ─── Constructors ─────────────────────────────────────────────────────────────

impl DcrtPoly {
    pub fn zero(params: Arc<DcrtParams>, format: Format) -> Self {
        let towers = params
            .towers()
            .iter()
            .map(|t| NativePoly::zero(t.clone(), format))
            .collect();
        Self {
            params,
            towers,
            format,
        }
    }

    pub fn from_towers(params: Arc<DcrtParams>, towers: Vec<NativePoly>) -> RingResult<Self> {
        if towers.len() != params.len() {
            return Err(RingError::TowerCountMismatch {
                expected: params.len(),
                actual: towers.len(),
            });
        }
        let format = towers[0].format();
        for (tower, expected) in towers.iter().zip(params.towers()) {
            if tower.params() != expected {
                return Err(RingError::ParamsMismatch {
                    operation: "DcrtPoly::from_towers",
                });
            }
            if tower.format() != format {
                return Err(RingError::FormatMismatch {
                    expected: format,
                    actual: tower.format(),
                });
            }
        }
        Ok(Self {
            params,
            towers,
            format,
        })
    }

    /// Wraps per-tower residue vectors.
    pub fn from_tower_values(
        params: Arc<DcrtParams>,
        values: Vec<Vec<u64>>,
        format: Format,
    ) -> RingResult<Self> {
        if values.len() != params.len() {
            return Err(RingError::TowerCountMismatch {
                expected: params.len(),
                actual: values.len(),
            });
        }
        let towers = params
            .towers()
            .iter()
            .zip(values)
            .map(|(tower, v)| NativePoly::from_values(tower.clone(), v, format))
            .collect::<RingResult<Vec<_>>>()?;
        Ok(Self {
            params,
            towers,
            format,
        })
    }

    /// CRT-expands one small signed polynomial into every tower.
    pub fn from_signed(params: Arc<DcrtParams>, coeffs: &[i64], format: Format) -> RingResult<Self> {
        let towers = params
            .towers()
            .iter()
            .map(|t| NativePoly::from_signed(t.clone(), coeffs).map(|p| p.with_format(format)))
            .collect::<RingResult<Vec<_>>>()?;
        Ok(Self {
            params,
            towers,
            format,
        })
    }

    /// CRT-expands a single-modulus polynomial by centred modulus switching.
    pub fn from_native(params: Arc<DcrtParams>, poly: &NativePoly, format: Format) -> RingResult<Self> {
        let coeff = poly.clone().with_format(Format::Coefficient);
        let towers = params
            .towers()
            .iter()
            .map(|t| coeff.switch_modulus(t.clone()).map(|p| p.with_format(format)))
            .collect::<RingResult<Vec<_>>>()?;
        Ok(Self {
            params,
            towers,
            format,
        })
    }
}

// ─── Accessors & format conversion ───────────────────────────────────────────

impl DcrtPoly {
    pub fn params(&self) -> &Arc<DcrtParams> {
        &self.params
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Number of towers (the level).
    pub fn len(&self) -> usize {
        self.towers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towers.is_empty()
    }

    pub fn ring_dim(&self) -> usize {
        self.params.ring_dim()
    }

    pub fn towers(&self) -> &[NativePoly] {
        &self.towers
    }

    pub fn tower(&self, index: usize) -> &NativePoly {
        &self.towers[index]
    }

    pub(crate) fn tower_mut(&mut self, index: usize) -> &mut NativePoly {
        &mut self.towers[index]
    }

    pub fn into_towers(self) -> Vec<NativePoly> {
        self.towers
    }

    pub fn switch_format(&mut self) {
        for tower in self.towers.iter_mut() {
            tower.switch_format();
        }
        self.format = self.format.flipped();
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

impl DcrtPoly {
    fn check_compatible(&self, rhs: &Self, operation: &'static str) -> RingResult<()> {
        if self.len() != rhs.len() {
            return Err(RingError::TowerCountMismatch {
                expected: self.len(),
                actual: rhs.len(),
            });
        }
        if !same_params(&self.params, &rhs.params) {
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

    fn check_scalars(&self, scalars: &[u64]) -> RingResult<()> {
        if scalars.len() < self.len() {
            return Err(RingError::LengthMismatch {
                expected: self.len(),
                actual: scalars.len(),
            });
        }
        Ok(())
    }

    pub fn plus_assign(&mut self, rhs: &Self) -> RingResult<()> {
        self.check_compatible(rhs, "plus")?;
        for (a, b) in self.towers.iter_mut().zip(&rhs.towers) {
            a.plus_assign(b)?;
        }
        Ok(())
    }

    pub fn minus_assign(&mut self, rhs: &Self) -> RingResult<()> {
        self.check_compatible(rhs, "minus")?;
        for (a, b) in self.towers.iter_mut().zip(&rhs.towers) {
            a.minus_assign(b)?;
        }
        Ok(())
    }

    pub fn times_assign(&mut self, rhs: &Self) -> RingResult<()> {
        self.check_compatible(rhs, "times")?;
        for (a, b) in self.towers.iter_mut().zip(&rhs.towers) {
            a.times_assign(b)?;
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
        for tower in self.towers.iter_mut() {
            tower.negate_assign();
        }
    }

    pub fn negate(&self) -> Self {
        let mut out = self.clone();
        out.negate_assign();
        out
    }

    /// Multiplies every tower by the same integer (reduced per tower).
    pub fn times_scalar_assign(&mut self, scalar: u64) {
        for tower in self.towers.iter_mut() {
            tower.times_scalar_assign(scalar);
        }
    }

    /// Multiplies tower `i` by `scalars[i]`; extra scalars are ignored.
    pub fn times_scalars_assign(&mut self, scalars: &[u64]) -> RingResult<()> {
        self.check_scalars(scalars)?;
        for (tower, &s) in self.towers.iter_mut().zip(scalars) {
            tower.times_scalar_assign(s);
        }
        Ok(())
    }

    /// Adds the constant polynomial with residue `scalars[i]` in tower `i`.
    pub fn plus_scalars_assign(&mut self, scalars: &[u64]) -> RingResult<()> {
        self.check_scalars(scalars)?;
        for (tower, &s) in self.towers.iter_mut().zip(scalars) {
            tower.plus_scalar_assign(s);
        }
        Ok(())
    }

    /// Adds a signed constant to every tower.
    pub fn plus_signed_scalar_assign(&mut self, scalar: i64) {
        for tower in self.towers.iter_mut() {
            let s = reduce_signed(scalar, tower.modulus());
            tower.plus_scalar_assign(s);
        }
    }
}

// ─── Automorphisms, decomposition & level reduction ─────────────────────────

impl DcrtPoly {
    pub fn automorphism_transform(&self, index: u64) -> RingResult<Self> {
        let towers = self
            .towers
            .iter()
            .map(|t| t.automorphism_transform(index))
            .collect::<RingResult<Vec<_>>>()?;
        Ok(Self {
            params: self.params.clone(),
            towers,
            format: self.format,
        })
    }

    /// Splits the element into key-switching digits, all in evaluation format.
    ///
    /// With `window == 0` digit `i` is tower `i` lifted (centred) into every
    /// tower. Otherwise tower `i` is further split into base-`2^window`
    /// digits; the ordering is tower-major and matches [`Self::powers_of_base`].
    pub fn crt_decompose(&self, window: u32) -> RingResult<Vec<Self>> {
        let coeff = self.clone().with_format(Format::Coefficient);
        let mut digits = Vec::new();
        for tower in &coeff.towers {
            if window == 0 {
                digits.push(self.lift_digit(tower)?);
            } else {
                for digit in tower.base_decompose(window)? {
                    digits.push(self.lift_digit(&digit)?);
                }
            }
        }
        Ok(digits)
    }

    fn lift_digit(&self, digit: &NativePoly) -> RingResult<Self> {
        let towers = self
            .params
            .towers()
            .iter()
            .map(|t| {
                let lifted = if t.modulus() == digit.modulus() {
                    digit.clone()
                } else {
                    digit.switch_modulus(t.clone())?
                };
                Ok(lifted.with_format(Format::Evaluation))
            })
            .collect::<RingResult<Vec<_>>>()?;
        Ok(Self {
            params: self.params.clone(),
            towers,
            format: Format::Evaluation,
        })
    }

    /// Key-switching gadget for this element: tower `i` (times `2^(window*k)`
    /// when windowed) placed in tower `i` with zeros elsewhere.
    pub fn powers_of_base(&self, window: u32) -> RingResult<Vec<Self>> {
        let mut out = Vec::new();
        for (i, tower) in self.towers.iter().enumerate() {
            let powers = if window == 0 {
                vec![tower.clone()]
            } else {
                tower.powers_of_base(window)?
            };
            for power in powers {
                let mut element = Self::zero(self.params.clone(), self.format);
                element.towers[i] = power;
                out.push(element);
            }
        }
        Ok(out)
    }

    /// Keeps the first `len` towers (the key material of a higher level
    /// restricted to a ciphertext's chain).
    pub fn truncated(&self, len: usize) -> RingResult<Self> {
        let params = Arc::new(self.params.truncated(len)?);
        Ok(Self {
            params,
            towers: self.towers[..len].to_vec(),
            format: self.format,
        })
    }

    pub fn drop_last_element(&mut self) -> RingResult<()> {
        self.drop_last_elements(1)
    }

    /// Removes the last `count` towers; at least one tower must remain.
    pub fn drop_last_elements(&mut self, count: usize) -> RingResult<()> {
        if count >= self.len() {
            return Err(RingError::OutOfTowers {
                requested: count,
                available: self.len(),
            });
        }
        let keep = self.len() - count;
        self.params = Arc::new(self.params.truncated(keep)?);
        self.towers.truncate(keep);
        Ok(())
    }

    /// Divides by the last modulus `q_l` with rounding and drops it:
    /// `x_i' = (x_i - [x_l]_centred) * q_l^{-1} mod q_i`.
    ///
    /// `ql_inv_mod_q[i]` holds `q_l^{-1} mod q_i` for the remaining towers.
    pub fn drop_last_element_and_scale(&mut self, ql_inv_mod_q: &[u64]) -> RingResult<()> {
        let last = self.last_tower_coefficients()?;
        self.check_remaining_scalars(ql_inv_mod_q)?;
        self.drop_last_element()?;
        let format = self.format;
        for (tower, &inv) in self.towers.iter_mut().zip(ql_inv_mod_q) {
            let correction = last.switch_modulus(tower.params().clone())?.with_format(format);
            tower.minus_assign(&correction)?;
            tower.times_scalar_assign(inv);
        }
        Ok(())
    }

    /// BGV modulus switching that keeps the plaintext modulo `t` intact:
    /// adds `t * delta` with `delta = -x_l * t^{-1} mod q_l`, making the value
    /// divisible by `q_l`, then divides and drops the last tower.
    pub fn mod_reduce(
        &mut self,
        t: u64,
        neg_t_inv_mod_ql: u64,
        ql_inv_mod_q: &[u64],
    ) -> RingResult<()> {
        let mut delta = self.last_tower_coefficients()?;
        delta.times_scalar_assign(neg_t_inv_mod_ql);
        self.check_remaining_scalars(ql_inv_mod_q)?;
        self.drop_last_element()?;
        let format = self.format;
        for (tower, &inv) in self.towers.iter_mut().zip(ql_inv_mod_q) {
            let mut correction = delta.switch_modulus(tower.params().clone())?.with_format(format);
            correction.times_scalar_assign(t);
            tower.plus_assign(&correction)?;
            tower.times_scalar_assign(inv);
        }
        Ok(())
    }

    fn check_remaining_scalars(&self, scalars: &[u64]) -> RingResult<()> {
        if scalars.len() + 1 < self.len() {
            return Err(RingError::LengthMismatch {
                expected: self.len() - 1,
                actual: scalars.len(),
            });
        }
        Ok(())
    }

    fn last_tower_coefficients(&self) -> RingResult<NativePoly> {
        if self.len() < 2 {
            return Err(RingError::OutOfTowers {
                requested: 1,
                available: self.len(),
            });
        }
        Ok(self.towers[self.len() - 1].clone().with_format(Format::Coefficient))
    }
}

// ─── CRT interpolation ────────────────────────────────────────────────────────

impl DcrtPoly {
    fn residues_at(&self, index: usize) -> Vec<u64> {
        self.towers.iter().map(|t| t.values()[index]).collect()
    }

    /// Full-precision coefficients in `[0, Q)`.
    pub fn crt_interpolate(&self, crt: &CrtReconstruction) -> RingResult<Vec<WideUint>> {
        self.require_coefficient("crt_interpolate")?;
        Ok((0..self.ring_dim())
            .map(|j| crt.interpolate(&self.residues_at(j)))
            .collect())
    }

    /// Centred coefficients converted to `f64`.
    pub fn crt_interpolate_f64(&self, crt: &CrtReconstruction) -> RingResult<Vec<f64>> {
        self.require_coefficient("crt_interpolate_f64")?;
        Ok((0..self.ring_dim())
            .map(|j| crt.interpolate_f64(&self.residues_at(j)))
            .collect())
    }

    pub(crate) fn require_coefficient(&self, operation: &'static str) -> RingResult<()> {
        if self.format != Format::Coefficient {
            return Err(RingError::UnsupportedFormat {
                operation,
                format: self.format,
            });
        }
        Ok(())
    }
}

/// `q_l^{-1} mod q_i` for `i < l`, with `l` the last tower of `moduli`.
pub fn last_modulus_inverses(moduli: &[u64]) -> RingResult<Vec<u64>> {
    let (&ql, rest) = moduli.split_last().ok_or(RingError::EmptyBasis)?;
    rest.iter()
        .map(|&q| {
            inv_mod(ql % q, q)
                .ok_or(RingError::NotInvertible { value: ql, modulus: q })
        })
        .collect()
}

/// Residues of `value` modulo each modulus.
pub fn residues_of(value: u64, moduli: &[u64]) -> Vec<u64> {
    moduli.iter().map(|&q| value % q).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rings::ntt::NttEngine;

    const MODULI: [u64; 3] = [97, 113, 193];

    fn params() -> Arc<DcrtParams> {
        Arc::new(DcrtParams::from_moduli(16, &MODULI, &NttEngine::new()).unwrap())
    }

    fn centered_crt(poly: &DcrtPoly) -> Vec<f64> {
        let crt = CrtReconstruction::new(&poly.params().moduli()).unwrap();
        poly.clone()
            .with_format(Format::Coefficient)
            .crt_interpolate_f64(&crt)
            .unwrap()
    }

    #[test]
    fn product_matches_integer_convolution() {
        let p = params();
        let a = DcrtPoly::from_signed(p.clone(), &[3, -2, 0, 1], Format::Evaluation).unwrap();
        let b = DcrtPoly::from_signed(p.clone(), &[-1, 4], Format::Evaluation).unwrap();
        let prod = a.times(&b).unwrap();
        // (3 - 2X + X^3)(-1 + 4X) = -3 + 14X - 8X^2 - X^3 + 4X^4
        assert_eq!(
            centered_crt(&prod),
            vec![-3.0, 14.0, -8.0, -1.0, 4.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn coefficient_product_is_a_format_error() {
        let p = params();
        let a = DcrtPoly::from_signed(p, &[1, 2], Format::Coefficient).unwrap();
        assert!(matches!(
            a.times(&a),
            Err(RingError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn decomposition_recombines_against_gadget() {
        let p = params();
        let x = DcrtPoly::from_signed(p.clone(), &[1234, -5678, 42, 9], Format::Evaluation).unwrap();
        let s = DcrtPoly::from_signed(p.clone(), &[1, -1, 0, 1], Format::Evaluation).unwrap();
        let expected = x.times(&s).unwrap();
        for window in [0u32, 2, 5] {
            let digits = x.crt_decompose(window).unwrap();
            let gadget = s.powers_of_base(window).unwrap();
            assert_eq!(digits.len(), gadget.len());
            let mut acc = DcrtPoly::zero(p.clone(), Format::Evaluation);
            for (d, g) in digits.iter().zip(&gadget) {
                acc.plus_assign(&d.times(g).unwrap()).unwrap();
            }
            assert_eq!(acc, expected, "window {window}");
        }
    }

    #[test]
    fn scale_down_rounds_by_last_modulus() {
        let p = params();
        let value = 193 * 57 + 20;
        let mut x = DcrtPoly::from_signed(p.clone(), &[value, -value], Format::Evaluation).unwrap();
        let inverses = last_modulus_inverses(&MODULI).unwrap();
        x.drop_last_element_and_scale(&inverses).unwrap();
        assert_eq!(x.len(), 2);
        assert_eq!(&centered_crt(&x)[..2], &[57.0, -57.0]);
    }

    #[test]
    fn mod_reduce_preserves_value_mod_t() {
        // t = 2 keeps (97, 113, 193) valid moduli = 1 mod t.
        let p = params();
        let t = 2u64;
        let value: i64 = 193 * 25 + 7;
        let mut x = DcrtPoly::from_signed(p.clone(), &[value], Format::Coefficient).unwrap();
        let neg_t_inv = 193 - crate::math::modular::inv_mod(t, 193).unwrap();
        let inverses = last_modulus_inverses(&MODULI).unwrap();
        x.mod_reduce(t, neg_t_inv, &inverses).unwrap();
        let reduced = centered_crt(&x)[0] as i64;
        assert_eq!(reduced.rem_euclid(2), value.rem_euclid(2));
        assert!((reduced - value / 193).abs() <= 2);
    }

    #[test]
    fn dropping_every_tower_is_a_capacity_error() {
        let mut x = DcrtPoly::zero(params(), Format::Evaluation);
        x.drop_last_elements(2).unwrap();
        assert!(matches!(
            x.drop_last_element(),
            Err(RingError::OutOfTowers { .. })
        ));
        let mut y = DcrtPoly::zero(params(), Format::Evaluation);
        assert!(matches!(
            y.drop_last_element_and_scale(&[]),
            Err(RingError::LengthMismatch { .. })
        ));
        assert_eq!(y.len(), 3);
    }
}
