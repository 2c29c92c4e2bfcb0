//! Plaintext encodings: integer slot packing, coefficient packing, byte
//! strings and the CKKS canonical embedding.
//!
//! Encoders only map between user values and ring coefficients; scaling by
//! `Q/t` (BFV) or by the CKKS scaling factor happens in the scheme layer.

pub mod ckks_packed;
pub mod coef_packed;
pub mod packed;
pub mod string;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rings::RingError;

pub use ckks_packed::CkksEncoder;
pub use packed::PackedEncoder;

pub type EncodingResult<T> = Result<T, EncodingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("too many values: got {got}, capacity is {max}")]
    TooManyValues { got: usize, max: usize },

    #[error("value {value} at position {index} is outside the range of plaintext modulus {modulus}")]
    ValueOutOfRange { index: usize, value: i64, modulus: u64 },

    #[error("plaintext modulus {modulus} does not support slot packing for cyclotomic order {cyclotomic_order}")]
    PackingUnsupported { modulus: u64, cyclotomic_order: u32 },

    #[error("slot count {slots} must be a power of two no larger than {max}")]
    InvalidSlotCount { slots: usize, max: usize },

    #[error("value at position {index} is not finite")]
    NonFinite { index: usize },

    #[error("scaled coefficient {value:e} does not fit the modulus chain")]
    CoefficientOverflow { value: f64 },

    #[error("plaintext holds {actual:?} data, not {expected:?}")]
    WrongEncoding {
        expected: EncodingKind,
        actual: EncodingKind,
    },

    #[error(transparent)]
    Ring(#[from] RingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingKind {
    Packed,
    CoefPacked,
    String,
    CkksPacked,
}

/// Values carried by a plaintext, tagged by how they are encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaintextValue {
    Packed(Vec<i64>),
    CoefPacked(Vec<i64>),
    String(String),
    CkksPacked(Vec<Complex64>),
}

impl PlaintextValue {
    pub fn kind(&self) -> EncodingKind {
        match self {
            Self::Packed(_) => EncodingKind::Packed,
            Self::CoefPacked(_) => EncodingKind::CoefPacked,
            Self::String(_) => EncodingKind::String,
            Self::CkksPacked(_) => EncodingKind::CkksPacked,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Packed(v) | Self::CoefPacked(v) => v.len(),
            Self::String(s) => s.len(),
            Self::CkksPacked(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rejects integers outside the centred range of `modulus`.
pub(crate) fn check_range(values: &[i64], modulus: u64) -> EncodingResult<()> {
    let max = ((modulus - 1) / 2) as i64;
    let min = -((modulus / 2) as i64);
    match values.iter().position(|&v| v < min || v > max) {
        Some(index) => Err(EncodingError::ValueOutOfRange {
            index,
            value: values[index],
            modulus,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centred_range_is_inclusive() {
        assert!(check_range(&[-32768, 32768, 0], 65537).is_ok());
        assert!(matches!(
            check_range(&[1, 32769], 65537),
            Err(EncodingError::ValueOutOfRange { index: 1, .. })
        ));
        assert!(check_range(&[-8, 7], 16).is_ok());
        assert!(check_range(&[8], 16).is_err());
    }
}
