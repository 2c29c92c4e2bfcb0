use thiserror::Error;

use super::params::SchemeKind;
use crate::encoding::EncodingError;
use crate::rings::RingError;
use crate::sampling::SamplerError;

/// Coarse classification of every failure the library reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operands disagree on format or ring parameters.
    Format,
    /// A value is outside the mathematical domain of the operation.
    Math,
    /// Parameters are infeasible or inconsistent.
    Config,
    /// The scheme does not offer the requested operation.
    NotImplemented,
    /// A persisted record cannot be loaded.
    Deserialize,
    /// The modulus chain or key material is exhausted.
    Capacity,
}

#[derive(Error, Debug)]
pub enum HeError {
    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    #[error("sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("invalid parameter `{name}`: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("parameter generation failed: {message}")]
    ParamsGen { message: String },

    #[error("CRT tables for {scheme:?} were not precomputed")]
    TablesNotPrecomputed { scheme: SchemeKind },

    #[error("operands of `{operation}` belong to different contexts or keys")]
    ContextMismatch { operation: &'static str },

    #[error("`{operation}` expects {expected} ciphertext components, got {actual}")]
    ComponentCount {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("no {kind} key for index {index}")]
    MissingKey { kind: &'static str, index: u64 },

    #[error("`{operation}` is not available for {scheme:?}")]
    NotImplemented {
        operation: &'static str,
        scheme: SchemeKind,
    },

    #[error("ran out of levels: {requested} more towers requested, {available} available")]
    OutOfLevels { requested: usize, available: usize },

    #[error("depth {depth} exceeds the supported maximum {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("a ciphertext at scale degree {depth} has no factor left to rescale")]
    ScaleExhausted { depth: usize },

    #[error("{type_name} record has version {found}, newest supported is {supported}")]
    VersionTooNew {
        type_name: &'static str,
        found: u32,
        supported: u32,
    },

    #[error("malformed record: {message}")]
    Malformed { message: String },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HeResult<T> = Result<T, HeError>;

impl HeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ring(e) => ring_kind(e),
            Self::Sampler(e) => match e {
                SamplerError::InvalidParameter { .. } | SamplerError::StdTooLarge { .. } => {
                    ErrorKind::Config
                }
                SamplerError::CdfLookup { .. } | SamplerError::RetriesExhausted { .. } => ErrorKind::Math,
                SamplerError::Ring(r) => ring_kind(r),
            },
            Self::Encoding(e) => match e {
                EncodingError::TooManyValues { .. } | EncodingError::CoefficientOverflow { .. } => {
                    ErrorKind::Capacity
                }
                EncodingError::ValueOutOfRange { .. } | EncodingError::NonFinite { .. } => {
                    ErrorKind::Math
                }
                EncodingError::PackingUnsupported { .. } | EncodingError::InvalidSlotCount { .. } => {
                    ErrorKind::Config
                }
                EncodingError::WrongEncoding { .. } => ErrorKind::Format,
                EncodingError::Ring(r) => ring_kind(r),
            },
            Self::InvalidParameter { .. }
            | Self::ParamsGen { .. }
            | Self::TablesNotPrecomputed { .. }
            | Self::ContextMismatch { .. }
            | Self::MissingKey { .. } => ErrorKind::Config,
            Self::ComponentCount { .. } => ErrorKind::Format,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::OutOfLevels { .. } | Self::DepthExceeded { .. } | Self::ScaleExhausted { .. } => {
                ErrorKind::Capacity
            }
            Self::VersionTooNew { .. } | Self::Malformed { .. } | Self::Json(_) => {
                ErrorKind::Deserialize
            }
        }
    }
}

fn ring_kind(error: &RingError) -> ErrorKind {
    match error {
        RingError::FormatMismatch { .. }
        | RingError::UnsupportedFormat { .. }
        | RingError::ParamsMismatch { .. }
        | RingError::TowerCountMismatch { .. }
        | RingError::LengthMismatch { .. } => ErrorKind::Format,
        RingError::InvalidAutomorphismIndex { .. }
        | RingError::NotInvertible { .. }
        | RingError::NonReducedValue { .. }
        | RingError::InvalidWindow { .. } => ErrorKind::Math,
        RingError::InvalidRingDimension { .. }
        | RingError::EmptyBasis
        | RingError::InvalidModulus { .. }
        | RingError::NonNttFriendlyModulus { .. }
        | RingError::MissingRootOfUnity { .. }
        | RingError::NttNotPrecomputed { .. }
        | RingError::AuxiliaryBasisExhausted { .. }
        | RingError::AuxiliaryModulusTooLarge { .. }
        | RingError::UnsupportedPlaintextModulus { .. } => ErrorKind::Config,
        RingError::OutOfTowers { .. } | RingError::WideIntegerOverflow { .. } => {
            ErrorKind::Capacity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rings::Format;

    #[test]
    fn taxonomy_covers_every_layer() {
        let format: HeError = RingError::UnsupportedFormat {
            operation: "times",
            format: Format::Coefficient,
        }
        .into();
        assert_eq!(format.kind(), ErrorKind::Format);

        let capacity: HeError = RingError::OutOfTowers {
            requested: 1,
            available: 1,
        }
        .into();
        assert_eq!(capacity.kind(), ErrorKind::Capacity);

        let sampler: HeError = SamplerError::CdfLookup { draw: 0.5 }.into();
        assert_eq!(sampler.kind(), ErrorKind::Math);

        let version = HeError::VersionTooNew {
            type_name: "Ciphertext",
            found: 9,
            supported: 1,
        };
        assert_eq!(version.kind(), ErrorKind::Deserialize);
        assert!(version.to_string().contains("version 9"));

        let missing = HeError::NotImplemented {
            operation: "mod_reduce",
            scheme: SchemeKind::BfvRns,
        };
        assert_eq!(missing.kind(), ErrorKind::NotImplemented);
    }
}
