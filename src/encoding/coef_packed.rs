//! Integers placed directly in the polynomial coefficients.

use super::{EncodingError, EncodingResult, check_range};
use crate::math::modular::{centered, reduce_signed};

pub fn encode(values: &[i64], plaintext_modulus: u64, ring_dim: usize) -> EncodingResult<Vec<u64>> {
    if values.len() > ring_dim {
        return Err(EncodingError::TooManyValues {
            got: values.len(),
            max: ring_dim,
        });
    }
    check_range(values, plaintext_modulus)?;
    let mut coefficients = vec![0u64; ring_dim];
    for (c, &v) in coefficients.iter_mut().zip(values) {
        *c = reduce_signed(v, plaintext_modulus);
    }
    Ok(coefficients)
}

pub fn decode(coefficients: &[u64], plaintext_modulus: u64) -> Vec<i64> {
    coefficients
        .iter()
        .map(|&c| centered(c % plaintext_modulus, plaintext_modulus))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_values_wrap_and_come_back() {
        let coeffs = encode(&[-3, 0, 5], 17, 8).unwrap();
        assert_eq!(&coeffs[..3], &[14, 0, 5]);
        assert_eq!(&decode(&coeffs, 17)[..3], &[-3, 0, 5]);
        assert!(encode(&[1; 9], 17, 8).is_err());
    }
}
