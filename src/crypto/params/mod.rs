//! Per-scheme parameter sets: the modulus chain chosen by parameter
//! generation plus every table derived from it.
//!
//! Tables are plain data built once by `precompute`; nothing mutates them
//! afterwards, so a parameter set is shared read-only by every key and
//! ciphertext of a context.

pub mod bfvrns;
pub mod bfvrnsb;
pub mod bgvrns;
pub mod ckks;
pub mod security;

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::errors::{HeError, HeResult};
use crate::rings::{DcrtParams, DcrtPoly, Format, NttEngine, dcrt::last_modulus_inverses};
use crate::sampling::{DiscreteGaussian, DiscreteUniform, SignedSampler, TernaryUniform};

pub use bfvrns::{BfvRnsParams, BfvRnsTables, BfvWorkload};
pub use bfvrnsb::{BfvRnsBParams, BfvRnsBTables};
pub use bgvrns::{BgvRnsParams, BgvRnsTables};
pub use ckks::CkksParams;
pub use security::{DistributionKind, find_ring_dim, max_log_q, resolve_ring_dim};

pub const DEFAULT_SIGMA: f64 = 3.19;
pub const DEFAULT_BFV_SIGMA: f64 = 3.2;
pub const DEFAULT_ASSURANCE: f64 = 36.0;
pub const DEFAULT_ROOT_HERMITE: f64 = 1.006;
pub const DEFAULT_MAX_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeKind {
    BfvRns,
    BfvRnsB,
    BgvRns,
    Ckks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    Classic128,
    Classic192,
    Classic256,
    /// No lattice-security constraint; the ring dimension must be given.
    NotSet,
}

/// Secret-key distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Discrete Gaussian secrets.
    Rlwe,
    /// Ternary secrets.
    Optimized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySwitchTechnique {
    Bv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RescaleTechnique {
    ApproxRescale,
}

/// User-facing knobs shared by every RLWE scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlweSettings {
    pub sigma: f64,
    pub assurance: f64,
    pub root_hermite: f64,
    pub security_level: SecurityLevel,
    pub relin_window: u32,
    pub mode: Mode,
    pub max_depth: usize,
    pub batch_size: usize,
    pub key_switch: KeySwitchTechnique,
}

impl Default for RlweSettings {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
            assurance: DEFAULT_ASSURANCE,
            root_hermite: DEFAULT_ROOT_HERMITE,
            security_level: SecurityLevel::Classic128,
            relin_window: 0,
            mode: Mode::Optimized,
            max_depth: DEFAULT_MAX_DEPTH,
            batch_size: 0,
            key_switch: KeySwitchTechnique::Bv,
        }
    }
}

impl RlweSettings {
    pub fn validate(&self) -> HeResult<()> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(HeError::InvalidParameter {
                name: "sigma",
                message: format!("must be positive, got {}", self.sigma),
            });
        }
        if self.relin_window > 60 {
            return Err(HeError::InvalidParameter {
                name: "relin_window",
                message: format!("must be at most 60 bits, got {}", self.relin_window),
            });
        }
        if self.max_depth == 0 {
            return Err(HeError::InvalidParameter {
                name: "max_depth",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn distribution(&self) -> DistributionKind {
        self.mode.distribution()
    }
}

impl Mode {
    pub fn distribution(self) -> DistributionKind {
        match self {
            Mode::Rlwe => DistributionKind::Error,
            Mode::Optimized => DistributionKind::Ternary,
        }
    }
}

/// The part of a parameter set every RLWE scheme has: settings, the chain
/// `Q`, the plaintext modulus and the samplers.
#[derive(Debug, Clone)]
pub struct RlweParams {
    settings: RlweSettings,
    engine: Arc<NttEngine>,
    element_params: Arc<DcrtParams>,
    plaintext_modulus: u64,
    dgg: DiscreteGaussian,
    tug: TernaryUniform,
}

impl RlweParams {
    pub fn new(
        settings: RlweSettings,
        engine: Arc<NttEngine>,
        element_params: Arc<DcrtParams>,
        plaintext_modulus: u64,
    ) -> HeResult<Self> {
        settings.validate()?;
        let dgg = DiscreteGaussian::new(settings.sigma)?;
        Ok(Self {
            settings,
            engine,
            element_params,
            plaintext_modulus,
            dgg,
            tug: TernaryUniform::new(),
        })
    }

    pub fn settings(&self) -> &RlweSettings {
        &self.settings
    }

    pub fn engine(&self) -> &Arc<NttEngine> {
        &self.engine
    }

    pub fn element_params(&self) -> &Arc<DcrtParams> {
        &self.element_params
    }

    pub fn plaintext_modulus(&self) -> u64 {
        self.plaintext_modulus
    }

    pub fn ring_dim(&self) -> usize {
        self.element_params.ring_dim()
    }

    pub fn cyclotomic_order(&self) -> u32 {
        self.element_params.cyclotomic_order()
    }

    pub fn moduli(&self) -> Vec<u64> {
        self.element_params.moduli()
    }

    pub fn relin_window(&self) -> u32 {
        self.settings.relin_window
    }

    pub fn max_depth(&self) -> usize {
        self.settings.max_depth
    }

    pub fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    pub(crate) fn set_batch_size(&mut self, batch_size: usize) {
        self.settings.batch_size = batch_size;
    }

    pub fn dgg(&self) -> &DiscreteGaussian {
        &self.dgg
    }

    /// The first `towers` moduli of the chain.
    pub fn params_at(&self, towers: usize) -> HeResult<Arc<DcrtParams>> {
        if towers == self.element_params.len() {
            return Ok(self.element_params.clone());
        }
        Ok(Arc::new(self.element_params.truncated(towers)?))
    }

    /// A secret key polynomial in evaluation format (ternary or Gaussian by
    /// mode).
    pub fn sample_secret<R: Rng + ?Sized>(&self, rng: &mut R) -> HeResult<DcrtPoly> {
        Ok(match self.settings.mode {
            Mode::Optimized => self.tug.sample_poly(&self.element_params, Format::Evaluation, rng)?,
            Mode::Rlwe => self.dgg.sample_poly(&self.element_params, Format::Evaluation, rng)?,
        })
    }

    /// Ephemeral encryption randomness, drawn like the secret.
    pub fn sample_ephemeral<R: Rng + ?Sized>(
        &self,
        params: &Arc<DcrtParams>,
        rng: &mut R,
    ) -> HeResult<DcrtPoly> {
        Ok(match self.settings.mode {
            Mode::Optimized => self.tug.sample_poly(params, Format::Evaluation, rng)?,
            Mode::Rlwe => self.dgg.sample_poly(params, Format::Evaluation, rng)?,
        })
    }

    pub fn sample_error<R: Rng + ?Sized>(
        &self,
        params: &Arc<DcrtParams>,
        rng: &mut R,
    ) -> HeResult<DcrtPoly> {
        Ok(self.dgg.sample_poly(params, Format::Evaluation, rng)?)
    }

    pub fn sample_uniform<R: Rng + ?Sized>(
        &self,
        params: &Arc<DcrtParams>,
        rng: &mut R,
    ) -> HeResult<DcrtPoly> {
        Ok(DiscreteUniform.sample_poly(params, Format::Evaluation, rng)?)
    }
}

/// `q_l^{-1} mod q_i` for every prefix `q_0 .. q_l` of the chain, indexed by
/// the number of towers `l + 1`. Entries 0 and 1 are empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescaleTables {
    ql_inv_mod_q: Vec<Vec<u64>>,
}

impl RescaleTables {
    pub fn new(moduli: &[u64]) -> HeResult<Self> {
        let mut ql_inv_mod_q = vec![Vec::new(), Vec::new()];
        for towers in 2..=moduli.len() {
            ql_inv_mod_q.push(last_modulus_inverses(&moduli[..towers])?);
        }
        Ok(Self { ql_inv_mod_q })
    }

    /// Inverses used when dropping the last of `towers` towers.
    pub fn ql_inv_mod_q(&self, towers: usize) -> HeResult<&[u64]> {
        match self.ql_inv_mod_q.get(towers) {
            Some(row) if towers >= 2 => Ok(row),
            _ => Err(HeError::OutOfLevels {
                requested: 1,
                available: towers.saturating_sub(1),
            }),
        }
    }
}

/// Residues `[value]_{q_i}` of a value given as a wide integer.
pub(crate) fn wide_residues(value: &crate::math::bigint::WideUint, moduli: &[u64]) -> Vec<u64> {
    moduli
        .iter()
        .map(|&q| crate::math::bigint::rem_u64(value, q))
        .collect()
}

/// Every scheme's parameter set behind one tag.
#[derive(Debug, Clone)]
pub enum SchemeParams {
    BfvRns(BfvRnsParams),
    BfvRnsB(BfvRnsBParams),
    BgvRns(BgvRnsParams),
    Ckks(CkksParams),
}

impl SchemeParams {
    pub fn kind(&self) -> SchemeKind {
        match self {
            Self::BfvRns(_) => SchemeKind::BfvRns,
            Self::BfvRnsB(_) => SchemeKind::BfvRnsB,
            Self::BgvRns(_) => SchemeKind::BgvRns,
            Self::Ckks(_) => SchemeKind::Ckks,
        }
    }

    pub fn rlwe(&self) -> &RlweParams {
        match self {
            Self::BfvRns(p) => p.rlwe(),
            Self::BfvRnsB(p) => p.rlwe(),
            Self::BgvRns(p) => p.rlwe(),
            Self::Ckks(p) => p.rlwe(),
        }
    }

    /// Re-derives every CRT table from the modulus chain.
    pub fn precompute(&mut self) -> HeResult<()> {
        match self {
            Self::BfvRns(p) => p.precompute(),
            Self::BfvRnsB(p) => p.precompute(),
            Self::BgvRns(p) => p.precompute(),
            Self::Ckks(p) => p.precompute(),
        }
    }

    pub fn is_precomputed(&self) -> bool {
        match self {
            Self::BfvRns(p) => p.tables().is_ok(),
            Self::BfvRnsB(p) => p.tables().is_ok(),
            Self::BgvRns(p) => p.tables().is_ok(),
            Self::Ckks(p) => p.tables().is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_tables_are_indexed_by_tower_count() {
        let tables = RescaleTables::new(&[97, 113, 193]).unwrap();
        assert_eq!(tables.ql_inv_mod_q(2).unwrap().len(), 1);
        let row = tables.ql_inv_mod_q(3).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!((193 * row[0]) % 97, 1);
        assert_eq!((193 * row[1]) % 113, 1);
        assert!(matches!(
            tables.ql_inv_mod_q(1),
            Err(HeError::OutOfLevels { .. })
        ));
    }

    #[test]
    fn settings_reject_nonsense() {
        let mut settings = RlweSettings::default();
        assert!(settings.validate().is_ok());
        settings.sigma = -1.0;
        assert!(settings.validate().is_err());
        let settings = RlweSettings {
            max_depth: 0,
            ..RlweSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(HeError::InvalidParameter { name: "max_depth", .. })
        ));
    }
}
