//! Random ring elements: uniform residues, ternary secrets and discrete
//! Gaussian errors.
//!
//! There is no process-wide generator; every entry point borrows the caller's
//! `Rng`, so threads that sample concurrently each own their generator.

pub mod gaussian;
pub mod generic;
pub mod ternary;
pub mod uniform;

use std::sync::Arc;

use rand::Rng;
use thiserror::Error;

use crate::rings::{DcrtParams, DcrtPoly, Format, RingError};

pub use gaussian::DiscreteGaussian;
pub use generic::{BaseSampler, BaseSamplerKind, BitGenerator, GenericGaussian, Sampler, SamplerCombiner};
pub use ternary::TernaryUniform;
pub use uniform::DiscreteUniform;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    #[error("Invalid distribution parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Standard deviation {std} exceeds 59 bits")]
    StdTooLarge { std: f64 },

    #[error("CDF inversion found no bucket for {draw}")]
    CdfLookup { draw: f64 },

    #[error("Sampler gave up after {attempts} attempts")]
    RetriesExhausted { attempts: usize },

    #[error(transparent)]
    Ring(#[from] RingError),
}

pub type SamplerResult<T> = Result<T, SamplerError>;

/// A distribution over small signed integers that can fill a ring element.
pub trait SignedSampler {
    fn sample_signed<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> SamplerResult<Vec<i64>>;

    /// Draws `ring_dim` coefficients and lifts them into every tower.
    fn sample_poly<R: Rng + ?Sized>(
        &self,
        params: &Arc<DcrtParams>,
        format: Format,
        rng: &mut R,
    ) -> SamplerResult<DcrtPoly> {
        let coeffs = self.sample_signed(params.ring_dim(), rng)?;
        Ok(DcrtPoly::from_signed(params.clone(), &coeffs, format)?)
    }
}
