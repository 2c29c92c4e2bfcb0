//! SIMD packing of integers modulo a prime `t ≡ 1 (mod m)`.
//!
//! Slot `i < n/2` is the evaluation at `zeta^(5^i)` and slot `n/2 + i` the
//! evaluation at `zeta^(-5^i)`, so the automorphism `X -> X^(5^r)` rotates
//! both halves left by `r`.

use super::{EncodingError, EncodingResult, check_range};
use crate::math::{
    modular::{centered, pow_mod, reduce_signed},
    primes::{is_prime, root_of_unity},
};
use crate::rings::ntt::{NttTable, reverse_bits};

#[derive(Debug, Clone)]
pub struct PackedEncoder {
    table: NttTable,
    positions: Vec<usize>,
}

impl PackedEncoder {
    pub fn new(plaintext_modulus: u64, cyclotomic_order: u32) -> EncodingResult<Self> {
        let t = plaintext_modulus;
        let m = cyclotomic_order as u64;
        let unsupported = EncodingError::PackingUnsupported {
            modulus: t,
            cyclotomic_order,
        };
        if !is_prime(t) || t % m != 1 {
            return Err(unsupported);
        }
        let root = root_of_unity(m, t).ok_or(unsupported)?;
        let table = NttTable::new(root, cyclotomic_order, t)?;

        let n = table.ring_dim();
        let bits = n.trailing_zeros();
        let half = n / 2;
        let mut positions = vec![0usize; n];
        for i in 0..half {
            let e = pow_mod(5, i as u64, m);
            positions[i] = reverse_bits(((e - 1) / 2) as usize, bits);
            positions[half + i] = reverse_bits(((m - e - 1) / 2) as usize, bits);
        }
        Ok(Self { table, positions })
    }

    pub fn plaintext_modulus(&self) -> u64 {
        self.table.modulus()
    }

    pub fn slots(&self) -> usize {
        self.positions.len()
    }

    /// Coefficients (in `[0, t)`) of the polynomial whose slots hold `values`.
    pub fn encode(&self, values: &[i64]) -> EncodingResult<Vec<u64>> {
        let t = self.plaintext_modulus();
        if values.len() > self.slots() {
            return Err(EncodingError::TooManyValues {
                got: values.len(),
                max: self.slots(),
            });
        }
        check_range(values, t)?;
        let mut evaluations = vec![0u64; self.slots()];
        for (&v, &position) in values.iter().zip(&self.positions) {
            evaluations[position] = reduce_signed(v, t);
        }
        self.table.inverse_in_place(&mut evaluations);
        Ok(evaluations)
    }

    /// Centred slot values of a coefficient vector reduced modulo `t`.
    pub fn decode(&self, coefficients: &[u64]) -> EncodingResult<Vec<i64>> {
        if coefficients.len() != self.slots() {
            return Err(crate::rings::RingError::LengthMismatch {
                expected: self.slots(),
                actual: coefficients.len(),
            }
            .into());
        }
        let t = self.plaintext_modulus();
        let evaluations = self.table.forward(coefficients);
        Ok(self
            .positions
            .iter()
            .map(|&p| centered(evaluations[p], t))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::modular::{add_mod, mul_mod};

    fn negacyclic_product(a: &[u64], b: &[u64], t: u64) -> Vec<u64> {
        let n = a.len();
        let mut out = vec![0u64; n];
        for i in 0..n {
            for j in 0..n {
                let p = mul_mod(a[i], b[j], t);
                if i + j < n {
                    out[i + j] = add_mod(out[i + j], p, t);
                } else {
                    out[i + j - n] = (out[i + j - n] + t - p) % t;
                }
            }
        }
        out
    }

    #[test]
    fn slots_multiply_pointwise() {
        let encoder = PackedEncoder::new(65537, 32).unwrap();
        let x: Vec<i64> = (1..=16).collect();
        let y: Vec<i64> = (0..16).map(|i| 3 - i).collect();
        let product = negacyclic_product(&encoder.encode(&x).unwrap(), &encoder.encode(&y).unwrap(), 65537);
        let decoded = encoder.decode(&product).unwrap();
        let expected: Vec<i64> = x.iter().zip(&y).map(|(a, b)| a * b).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn automorphism_by_five_rotates_each_half() {
        let t = 65537;
        let encoder = PackedEncoder::new(t, 32).unwrap();
        let x: Vec<i64> = (1..=16).collect();
        let coeffs = encoder.encode(&x).unwrap();
        // X -> X^5 in Z_t[X]/(X^16 + 1)
        let mut rotated = vec![0u64; 16];
        for (j, &c) in coeffs.iter().enumerate() {
            let target = (j * 5) % 32;
            if target < 16 {
                rotated[target] = c;
            } else {
                rotated[target - 16] = (t - c) % t;
            }
        }
        let decoded = encoder.decode(&rotated).unwrap();
        assert_eq!(&decoded[..8], &[2, 3, 4, 5, 6, 7, 8, 1]);
        assert_eq!(&decoded[8..], &[10, 11, 12, 13, 14, 15, 16, 9]);
    }

    #[test]
    fn rejects_unsupported_moduli_and_overflow() {
        assert!(matches!(
            PackedEncoder::new(65539, 32),
            Err(EncodingError::PackingUnsupported { .. })
        ));
        let encoder = PackedEncoder::new(97, 16).unwrap();
        assert!(matches!(
            encoder.encode(&[0; 9]),
            Err(EncodingError::TooManyValues { got: 9, max: 8 })
        ));
        assert!(matches!(
            encoder.encode(&[49]),
            Err(EncodingError::ValueOutOfRange { .. })
        ));
        assert_eq!(encoder.decode(&encoder.encode(&[-48, 48]).unwrap()).unwrap()[..2], [-48, 48]);
    }
}
