use thiserror::Error;

use super::Format;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("ring dimension must be a power of two, got {ring_dim}")]
    InvalidRingDimension { ring_dim: usize },
    #[error("modulus chain must contain at least one modulus")]
    EmptyBasis,
    #[error("modulus {modulus} is not NTT-friendly for cyclotomic order {cyclotomic_order}")]
    NonNttFriendlyModulus { modulus: u64, cyclotomic_order: u32 },
    #[error("no primitive root of unity of order {cyclotomic_order} modulo {modulus}")]
    MissingRootOfUnity { modulus: u64, cyclotomic_order: u32 },
    #[error("NTT tables for modulus {modulus} and cyclotomic order {cyclotomic_order} were not precomputed")]
    NttNotPrecomputed { modulus: u64, cyclotomic_order: u32 },
    #[error("format mismatch: expected {expected:?}, got {actual:?}")]
    FormatMismatch { expected: Format, actual: Format },
    #[error("operation `{operation}` is not defined in {format:?} format")]
    UnsupportedFormat { operation: &'static str, format: Format },
    #[error("ring parameter mismatch in `{operation}`")]
    ParamsMismatch { operation: &'static str },
    #[error("tower count mismatch: expected {expected}, got {actual}")]
    TowerCountMismatch { expected: usize, actual: usize },
    #[error("vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("value {value} is not reduced modulo {modulus}")]
    NonReducedValue { value: u64, modulus: u64 },
    #[error("automorphism index {index} is not odd and coprime to cyclotomic order {cyclotomic_order}")]
    InvalidAutomorphismIndex { index: u64, cyclotomic_order: u32 },
    #[error("cannot drop {requested} towers from an element with {available}")]
    OutOfTowers { requested: usize, available: usize },
    #[error("modulus {modulus} is too small for Barrett reduction")]
    InvalidModulus { modulus: u64 },
    #[error("{value} has no inverse modulo {modulus}")]
    NotInvertible { value: u64, modulus: u64 },
    #[error("modulus product of {bits} bits exceeds the wide-integer capacity")]
    WideIntegerOverflow { bits: u32 },
    #[error("decomposition window {window} must be in 1..=62")]
    InvalidWindow { window: u32 },
    #[error("no NTT-friendly prime left below {below} for an auxiliary basis")]
    AuxiliaryBasisExhausted { below: u64 },
    #[error("auxiliary modulus would need more than {bits} bits")]
    AuxiliaryModulusTooLarge { bits: u32 },
    #[error("plaintext modulus {modulus} is not supported by this conversion")]
    UnsupportedPlaintextModulus { modulus: u64 },
}

pub type RingResult<T> = Result<T, RingError>;
