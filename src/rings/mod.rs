//! Ring layer: single-modulus polynomials, their double-CRT composition, the
//! NTT engine and the CRT basis conversions used by the BFV variants.

pub mod behz;
pub mod dcrt;
pub mod errors;
pub mod hps;
pub mod ntt;
pub mod params;
pub mod poly;

use serde::{Deserialize, Serialize};

pub use dcrt::DcrtPoly;
pub use errors::{RingError, RingResult};
pub use ntt::{NttEngine, NttTable};
pub use params::{DcrtParams, ElementParams};
pub use poly::NativePoly;

/// Representation of a polynomial's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// Coefficients of `X^0 .. X^{n-1}`.
    Coefficient,
    /// NTT slots in bit-reversed order.
    Evaluation,
}

impl Format {
    pub fn flipped(self) -> Self {
        match self {
            Self::Coefficient => Self::Evaluation,
            Self::Evaluation => Self::Coefficient,
        }
    }
}
