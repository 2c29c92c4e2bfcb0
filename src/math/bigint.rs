//! Wide unsigned integers used only while precomputing CRT tables and during
//! full CRT interpolation.
//!
//! Hot paths never touch these: every homomorphic operation stays in native
//! words. The fixed width comfortably holds `Q * P` for the moduli chains the
//! parameter generators produce; [`check_capacity`] guards the rest.

use crypto_bigint::{NonZero, U2048};

use super::modular::{inv_mod, mul_mod};

pub type WideUint = U2048;

/// Number of bits in [`WideUint`].
pub const WIDE_BITS: u32 = 2048;

/// Bits kept free on top of a modulus product for intermediate sums.
const HEADROOM_BITS: u32 = 192;

#[inline]
pub fn from_u64(value: u64) -> WideUint {
    WideUint::from_u64(value)
}

/// Product of word-sized moduli.
pub fn product(moduli: &[u64]) -> WideUint {
    moduli
        .iter()
        .fold(WideUint::ONE, |acc, &q| acc.wrapping_mul(&from_u64(q)))
}

#[inline]
pub fn mul_u64(x: &WideUint, m: u64) -> WideUint {
    x.wrapping_mul(&from_u64(m))
}

/// Floor division by a non-zero word.
pub fn div_u64(x: &WideUint, m: u64) -> WideUint {
    div_wide(x, &from_u64(m))
}

/// Floor division by a wide value; returns zero for a zero divisor.
pub fn div_wide(x: &WideUint, d: &WideUint) -> WideUint {
    match Option::<NonZero<WideUint>>::from(NonZero::new(*d)) {
        Some(divisor) => x.div_rem(&divisor).0,
        None => WideUint::ZERO,
    }
}

/// Remainder by a word, computed limb by limb from the most significant end.
pub fn rem_u64(x: &WideUint, m: u64) -> u64 {
    let m = m as u128;
    x.as_words()
        .iter()
        .rev()
        .fold(0u128, |r, &w| ((r << 64) | w as u128) % m) as u64
}

/// Approximate conversion to `f64`.
pub fn to_f64(x: &WideUint) -> f64 {
    x.as_words()
        .iter()
        .rev()
        .fold(0.0f64, |acc, &w| acc * 18_446_744_073_709_551_616.0 + w as f64)
}

pub fn bit_len(x: &WideUint) -> u32 {
    x.bits()
}

/// `log2` of a moduli product without materialising it.
pub fn log2_product(moduli: &[u64]) -> f64 {
    moduli.iter().map(|&q| (q as f64).log2()).sum()
}

/// `true` when a product of these moduli, times an extra factor of
/// `extra_bits`, still fits in [`WideUint`] with headroom.
pub fn check_capacity(moduli: &[u64], extra_bits: u32) -> bool {
    let bits: u32 = moduli.iter().map(|&q| 64 - q.leading_zeros()).sum();
    bits + extra_bits + HEADROOM_BITS <= WIDE_BITS
}

/// `[(Q / q_i)^{-1}]_{q_i}` for every modulus of the basis.
pub fn hat_inverses(moduli: &[u64]) -> Option<Vec<u64>> {
    let big_q = product(moduli);
    moduli
        .iter()
        .map(|&q| inv_mod(rem_u64(&div_u64(&big_q, q), q), q))
        .collect()
}

/// `[Q / q_i]_{p}` for every `q_i` of `moduli`.
pub fn hat_residues(moduli: &[u64], p: u64) -> Vec<u64> {
    let big_q = product(moduli);
    moduli
        .iter()
        .map(|&q| rem_u64(&div_u64(&big_q, q), p))
        .collect()
}

/// Precomputed data for exact CRT reconstruction into `[0, Q)`.
#[derive(Debug, Clone)]
pub struct CrtReconstruction {
    modulus: WideUint,
    hats: Vec<WideUint>,
    hat_inverses: Vec<u64>,
    moduli: Vec<u64>,
}

impl CrtReconstruction {
    pub fn new(moduli: &[u64]) -> Option<Self> {
        let modulus = product(moduli);
        let hats = moduli.iter().map(|&q| div_u64(&modulus, q)).collect();
        Some(Self {
            modulus,
            hats,
            hat_inverses: hat_inverses(moduli)?,
            moduli: moduli.to_vec(),
        })
    }

    pub fn modulus(&self) -> &WideUint {
        &self.modulus
    }

    /// Reconstructs `x in [0, Q)` from its residues.
    pub fn interpolate(&self, residues: &[u64]) -> WideUint {
        let mut acc = WideUint::ZERO;
        for (i, &r) in residues.iter().enumerate() {
            let q = self.moduli[i];
            let y = mul_mod(r, self.hat_inverses[i], q);
            acc = acc.wrapping_add(&mul_u64(&self.hats[i], y));
            if acc >= self.modulus {
                acc = acc.wrapping_sub(&self.modulus);
            }
        }
        acc
    }

    /// Reconstructs and centres into `(-Q/2, Q/2]`, returning `(negative, |x|)`.
    pub fn interpolate_centered(&self, residues: &[u64]) -> (bool, WideUint) {
        let x = self.interpolate(residues);
        let half = div_u64(&self.modulus, 2);
        if x > half {
            (true, self.modulus.wrapping_sub(&x))
        } else {
            (false, x)
        }
    }

    /// Reconstructs, centres and converts to `f64`.
    pub fn interpolate_f64(&self, residues: &[u64]) -> f64 {
        let (negative, magnitude) = self.interpolate_centered(residues);
        let value = to_f64(&magnitude);
        if negative { -value } else { value }
    }
}
