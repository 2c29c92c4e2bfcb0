//! CKKS canonical embedding restricted to a power-of-two number of slots.
//!
//! With `s` slots the message lives in the subring generated by
//! `Y = X^(n / 2s)`. Slot `j` is the evaluation at `zeta^(5^j)` for a
//! primitive `4s`-th root `zeta`; evaluating at every odd power of `zeta` is a
//! length-`2s` FFT after twisting coefficient `i` by `zeta^i`. Embedding into
//! the full ring repeats the slots with period `s`, so rotations by the
//! automorphism `5^r` stay cyclic over the `s` values.

use std::{f64::consts::PI, fmt, sync::Arc};

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use super::{EncodingError, EncodingResult};
use crate::math::modular::{mul_mod, pow_mod};
use crate::rings::{DcrtParams, DcrtPoly, Format};

/// Largest magnitude of a scaled coefficient before rounding.
const MAX_SCALED: f64 = 1.0e36;

#[derive(Clone)]
pub struct CkksEncoder {
    ring_dim: usize,
    slots: usize,
    /// Position of slot `j` (and of its conjugate) in the evaluation vector.
    slot_index: Vec<(usize, usize)>,
    /// `zeta^i` for `i < 2s`.
    twist: Vec<Complex64>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for CkksEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CkksEncoder")
            .field("ring_dim", &self.ring_dim)
            .field("slots", &self.slots)
            .finish()
    }
}

impl CkksEncoder {
    pub fn new(ring_dim: usize, slots: usize) -> EncodingResult<Self> {
        let max = ring_dim / 2;
        if slots == 0 || !slots.is_power_of_two() || slots > max {
            return Err(EncodingError::InvalidSlotCount { slots, max });
        }
        let sub_dim = 2 * slots;
        let order = 2 * sub_dim as u64;
        let slot_index = (0..slots)
            .map(|j| {
                let e = pow_mod(5, j as u64, order);
                (((e - 1) / 2) as usize, ((order - e - 1) / 2) as usize)
            })
            .collect();
        let twist = (0..sub_dim)
            .map(|i| Complex64::from_polar(1.0, 2.0 * PI * i as f64 / order as f64))
            .collect();
        let mut planner = FftPlanner::<f64>::new();
        Ok(Self {
            ring_dim,
            slots,
            slot_index,
            twist,
            forward: planner.plan_fft_forward(sub_dim),
            inverse: planner.plan_fft_inverse(sub_dim),
        })
    }

    pub fn ring_dim(&self) -> usize {
        self.ring_dim
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    fn gap(&self) -> usize {
        self.ring_dim / (2 * self.slots)
    }

    /// Real coefficients (unscaled) of the polynomial holding `values`;
    /// missing slots are zero.
    pub fn encode(&self, values: &[Complex64]) -> EncodingResult<Vec<f64>> {
        if values.len() > self.slots {
            return Err(EncodingError::TooManyValues {
                got: values.len(),
                max: self.slots,
            });
        }
        if let Some(index) = values.iter().position(|z| !z.re.is_finite() || !z.im.is_finite()) {
            return Err(EncodingError::NonFinite { index });
        }
        let sub_dim = 2 * self.slots;
        let mut buffer = vec![Complex64::new(0.0, 0.0); sub_dim];
        for (z, &(at, conj_at)) in values.iter().zip(&self.slot_index) {
            buffer[at] = *z;
            buffer[conj_at] = z.conj();
        }
        self.forward.process(&mut buffer);
        let scale = 1.0 / sub_dim as f64;
        let mut coefficients = vec![0.0; self.ring_dim];
        let gap = self.gap();
        for (i, (b, w)) in buffer.iter().zip(&self.twist).enumerate() {
            coefficients[i * gap] = (*b * w.conj()).re * scale;
        }
        Ok(coefficients)
    }

    /// Slot values of real coefficients (already divided by the scale).
    pub fn decode(&self, coefficients: &[f64]) -> EncodingResult<Vec<Complex64>> {
        if coefficients.len() != self.ring_dim {
            return Err(crate::rings::RingError::LengthMismatch {
                expected: self.ring_dim,
                actual: coefficients.len(),
            }
            .into());
        }
        let gap = self.gap();
        let mut buffer: Vec<Complex64> = self
            .twist
            .iter()
            .enumerate()
            .map(|(i, w)| *w * coefficients[i * gap])
            .collect();
        self.inverse.process(&mut buffer);
        Ok(self.slot_index.iter().map(|&(at, _)| buffer[at]).collect())
    }
}

/// Rounds `coefficients * 2^scale_bits` into `params` and multiplies by
/// `2^(scale_bits * (depth - 1))`, giving a plaintext at scale degree `depth`.
pub fn scaled_element(
    coefficients: &[f64],
    scale_bits: u32,
    depth: usize,
    params: Arc<DcrtParams>,
) -> EncodingResult<DcrtPoly> {
    let delta = (scale_bits as f64).exp2();
    let scaled = coefficients
        .iter()
        .map(|&c| {
            let v = (c * delta).round();
            if !v.is_finite() || v.abs() > MAX_SCALED {
                return Err(EncodingError::CoefficientOverflow { value: v });
            }
            Ok(v as i128)
        })
        .collect::<EncodingResult<Vec<i128>>>()?;
    let extra = depth.saturating_sub(1) as u64;
    let values = params
        .moduli()
        .into_iter()
        .map(|q| {
            let factor = pow_mod(pow_mod(2, scale_bits as u64, q), extra, q);
            scaled
                .iter()
                .map(|&v| mul_mod(v.rem_euclid(q as i128) as u64, factor, q))
                .collect()
        })
        .collect();
    let element = DcrtPoly::from_tower_values(params, values, Format::Coefficient)?;
    Ok(element.with_format(Format::Evaluation))
}
