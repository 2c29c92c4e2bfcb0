//! Byte strings, one byte per coefficient.

use super::{EncodingError, EncodingResult};

const BYTE_RANGE: u64 = 256;

pub fn encode(text: &str, plaintext_modulus: u64, ring_dim: usize) -> EncodingResult<Vec<u64>> {
    let bytes = text.as_bytes();
    if bytes.len() > ring_dim {
        return Err(EncodingError::TooManyValues {
            got: bytes.len(),
            max: ring_dim,
        });
    }
    if plaintext_modulus < BYTE_RANGE {
        if let Some(index) = bytes.iter().position(|&b| b as u64 >= plaintext_modulus) {
            return Err(EncodingError::ValueOutOfRange {
                index,
                value: bytes[index] as i64,
                modulus: plaintext_modulus,
            });
        }
    }
    let mut coefficients = vec![0u64; ring_dim];
    for (c, &b) in coefficients.iter_mut().zip(bytes) {
        *c = b as u64;
    }
    Ok(coefficients)
}

/// Trailing zero coefficients are padding and are dropped.
pub fn decode(coefficients: &[u64]) -> String {
    let mut bytes: Vec<u8> = coefficients
        .iter()
        .map(|&c| (c % BYTE_RANGE) as u8)
        .collect();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_survives_padding() {
        let coeffs = encode("hello, ring", 65537, 32).unwrap();
        assert_eq!(coeffs.len(), 32);
        assert_eq!(decode(&coeffs), "hello, ring");
    }

    #[test]
    fn small_moduli_reject_high_bytes() {
        assert!(matches!(
            encode("za", 100, 8),
            Err(EncodingError::ValueOutOfRange { index: 0, value: 122, .. })
        ));
    }
}
