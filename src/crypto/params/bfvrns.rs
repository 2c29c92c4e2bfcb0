//! BFVrns parameters: a chain of equal-size primes sized by the BFV noise
//! bounds, plus the HPS tables for multiplication and decryption.

use std::{f64::consts::LN_2, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{Mode, RlweParams, RlweSettings, SchemeKind, SecurityLevel, find_ring_dim, wide_residues};
use crate::crypto::errors::{HeError, HeResult};
use crate::math::{
    bigint,
    primes::{first_prime, previous_prime},
};
use crate::rings::{DcrtParams, NttEngine, hps::HpsTables};

pub const MIN_DCRT_BITS: u32 = 30;
pub const MAX_DCRT_BITS: u32 = 60;
const DEFAULT_START_DIM: usize = 512;
const MAX_RING_DIM: usize = 1 << 17;
const MAX_FIXED_POINT_STEPS: usize = 100;

/// The homomorphic workload the modulus must absorb.
///
/// Only one of the three counters drives the noise bound: multiplications
/// win over key switches, which win over additions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfvWorkload {
    pub eval_adds: usize,
    pub eval_mults: usize,
    pub key_switches: usize,
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Additive,
    KeySwitch,
    Multiplicative,
}

/// Noise growth model for BFV with BV key switching.
struct NoiseModel {
    p: f64,
    b_err: f64,
    b_key: f64,
    dcrt_bits: f64,
    relin_base: f64,
    workload: BfvWorkload,
    bound: Bound,
    level: SecurityLevel,
    mode: Mode,
}

impl NoiseModel {
    fn new(settings: &RlweSettings, t: u64, workload: BfvWorkload, dcrt_bits: u32) -> Self {
        let b_err = settings.sigma * settings.assurance.sqrt();
        let b_key = match settings.mode {
            Mode::Rlwe => b_err,
            Mode::Optimized => 1.0,
        };
        let window = if settings.relin_window == 0 {
            dcrt_bits
        } else {
            settings.relin_window
        };
        let bound = if workload.eval_mults > 0 {
            Bound::Multiplicative
        } else if workload.key_switches > 0 {
            Bound::KeySwitch
        } else {
            Bound::Additive
        };
        Self {
            p: t as f64,
            b_err,
            b_key,
            dcrt_bits: dcrt_bits as f64,
            relin_base: (window as f64).exp2(),
            workload,
            bound,
            level: settings.security_level,
            mode: settings.mode,
        }
    }

    fn expansion(n: usize) -> f64 {
        2.0 * (n as f64).sqrt()
    }

    fn fresh_norm(&self, n: usize) -> f64 {
        self.b_err * (1.0 + 2.0 * Self::expansion(n) * self.b_key)
    }

    fn key_switch_noise(&self, n: usize, log_q_prev: f64) -> f64 {
        Self::expansion(n) * ((log_q_prev / (LN_2 * self.dcrt_bits)).floor() + 1.0) * self.relin_base * self.b_err
    }

    /// Natural log of the smallest modulus that decrypts correctly.
    fn log_q(&self, n: usize, log_q_prev: f64) -> f64 {
        let p = self.p;
        let w = &self.workload;
        match self.bound {
            Bound::Additive => {
                let adds = w.eval_adds as f64;
                (p * (4.0 * ((adds + 1.0) * self.fresh_norm(n) + adds) + p)).ln()
            }
            Bound::KeySwitch => {
                let ks = w.key_switches as f64 * self.key_switch_noise(n, log_q_prev);
                (p * (4.0 * (self.fresh_norm(n) + ks) + p)).ln()
            }
            Bound::Multiplicative => {
                let depth = w.eval_mults as f64;
                let delta = Self::expansion(n);
                let c1 = delta * delta * p * self.b_key;
                let c2 = delta * delta * self.b_key * self.b_key / 2.0 + self.key_switch_noise(n, log_q_prev);
                (4.0 * p).ln() + (depth - 1.0) * c1.ln() + (c1 * self.fresh_norm(n) + depth * c2).ln()
            }
        }
    }

    /// Smallest ring dimension the security table allows for `log_q` nats.
    fn secure_dim(&self, log_q: f64) -> HeResult<usize> {
        if self.level == SecurityLevel::NotSet {
            return Ok(0);
        }
        let bits = (log_q / LN_2).ceil() as u32;
        find_ring_dim(self.mode.distribution(), self.level, bits).ok_or_else(|| HeError::ParamsGen {
            message: format!("a {bits}-bit modulus exceeds every tabulated ring dimension"),
        })
    }

    fn towers(&self, log_q: f64) -> usize {
        (((log_q / LN_2).ceil() + 1.0) / self.dcrt_bits).ceil() as usize
    }
}

/// Ring dimension and modulus chain for a BFV workload. Shared by both RNS
/// variants.
#[instrument(skip_all, fields(t = plaintext_modulus, dcrt_bits = dcrt_bits))]
pub(crate) fn bfv_chain(
    settings: &RlweSettings,
    plaintext_modulus: u64,
    workload: BfvWorkload,
    dcrt_bits: u32,
    ring_dim: usize,
) -> HeResult<(usize, Vec<u64>)> {
    if !(MIN_DCRT_BITS..=MAX_DCRT_BITS).contains(&dcrt_bits) {
        return Err(HeError::InvalidParameter {
            name: "dcrt_bits",
            message: format!("must be in {MIN_DCRT_BITS}..={MAX_DCRT_BITS}, got {dcrt_bits}"),
        });
    }
    if plaintext_modulus < 2 {
        return Err(HeError::InvalidParameter {
            name: "plaintext_modulus",
            message: format!("must be at least 2, got {plaintext_modulus}"),
        });
    }
    let model = NoiseModel::new(settings, plaintext_modulus, workload, dcrt_bits);

    let mut n = if ring_dim > 0 { ring_dim } else { DEFAULT_START_DIM };
    let mut log_q_prev = 6.0 * 10f64.ln();
    let mut log_q = model.log_q(n, log_q_prev);
    if ring_dim > 0 && model.secure_dim(log_q)? > n {
        return Err(HeError::ParamsGen {
            message: format!("ring dimension {n} does not meet the security requirement"),
        });
    }
    loop {
        let mut steps = 0;
        while (log_q - log_q_prev).abs() > 1.001f64.ln() {
            steps += 1;
            if steps > MAX_FIXED_POINT_STEPS {
                return Err(HeError::ParamsGen {
                    message: "modulus estimate does not converge".into(),
                });
            }
            log_q_prev = log_q;
            log_q = model.log_q(n, log_q_prev);
        }
        let rounded = model.towers(log_q) as f64 * dcrt_bits as f64 * LN_2;
        if model.secure_dim(rounded)? <= n {
            break;
        }
        n *= 2;
        if n > MAX_RING_DIM {
            return Err(HeError::ParamsGen {
                message: "required ring dimension is too large".into(),
            });
        }
        log_q_prev = rounded;
        log_q = model.log_q(n, log_q_prev);
    }

    let towers = model.towers(log_q).max(1);
    let m = 2 * n as u64;
    let missing = || HeError::ParamsGen {
        message: format!("ran out of {dcrt_bits}-bit primes congruent to 1 mod {m}"),
    };
    let mut moduli = Vec::with_capacity(towers);
    let mut q = first_prime(dcrt_bits, m).ok_or_else(missing)?;
    for _ in 0..towers {
        q = previous_prime(q, m).ok_or_else(missing)?;
        moduli.push(q);
    }
    debug!(ring_dim = n, towers, log_q_bits = log_q / LN_2, "BFV chain");
    Ok((n, moduli))
}

/// Default and validated batch size for the BFV variants.
pub(crate) fn bfv_batch_size(requested: usize, ring_dim: usize) -> HeResult<usize> {
    match requested {
        0 => Ok(ring_dim),
        b if b > ring_dim => Err(HeError::InvalidParameter {
            name: "batch_size",
            message: format!("{b} exceeds the ring dimension {ring_dim}"),
        }),
        b => Ok(b),
    }
}

/// Builds the shared RLWE part over an explicit chain.
pub(crate) fn rlwe_over_chain(
    settings: RlweSettings,
    plaintext_modulus: u64,
    cyclotomic_order: u32,
    moduli: &[u64],
) -> HeResult<RlweParams> {
    let engine = Arc::new(NttEngine::new());
    let element_params = Arc::new(DcrtParams::from_moduli(cyclotomic_order, moduli, &engine)?);
    RlweParams::new(settings, engine, element_params, plaintext_modulus)
}

/// `floor(Q / t)` in every tower together with the HPS tables.
#[derive(Debug, Clone)]
pub struct BfvRnsTables {
    delta: Vec<u64>,
    hps: Arc<HpsTables>,
}

impl BfvRnsTables {
    pub fn delta(&self) -> &[u64] {
        &self.delta
    }

    pub fn hps(&self) -> &HpsTables {
        &self.hps
    }
}

pub(crate) fn delta_residues(moduli: &[u64], t: u64) -> Vec<u64> {
    let delta = bigint::div_u64(&bigint::product(moduli), t);
    wide_residues(&delta, moduli)
}

#[derive(Debug, Clone)]
pub struct BfvRnsParams {
    rlwe: RlweParams,
    tables: Option<BfvRnsTables>,
}

impl BfvRnsParams {
    /// Runs parameter generation and precomputes every table.
    pub fn generate(
        mut settings: RlweSettings,
        plaintext_modulus: u64,
        workload: BfvWorkload,
        dcrt_bits: u32,
        ring_dim: usize,
    ) -> HeResult<Self> {
        let (n, moduli) = bfv_chain(&settings, plaintext_modulus, workload, dcrt_bits, ring_dim)?;
        settings.batch_size = bfv_batch_size(settings.batch_size, n)?;
        let mut params = Self::from_chain(settings, plaintext_modulus, 2 * n as u32, &moduli)?;
        params.precompute()?;
        Ok(params)
    }

    /// Wraps an existing chain without building the CRT tables.
    pub fn from_chain(
        settings: RlweSettings,
        plaintext_modulus: u64,
        cyclotomic_order: u32,
        moduli: &[u64],
    ) -> HeResult<Self> {
        Ok(Self {
            rlwe: rlwe_over_chain(settings, plaintext_modulus, cyclotomic_order, moduli)?,
            tables: None,
        })
    }

    pub fn rlwe(&self) -> &RlweParams {
        &self.rlwe
    }

    pub fn tables(&self) -> HeResult<&BfvRnsTables> {
        self.tables.as_ref().ok_or(HeError::TablesNotPrecomputed {
            scheme: SchemeKind::BfvRns,
        })
    }

    #[instrument(skip_all)]
    pub fn precompute(&mut self) -> HeResult<()> {
        let q_params = self.rlwe.element_params().clone();
        let t = self.rlwe.plaintext_modulus();
        let hps = HpsTables::new(q_params.clone(), t, self.rlwe.engine())?;
        self.tables = Some(BfvRnsTables {
            delta: delta_residues(&q_params.moduli(), t),
            hps: Arc::new(hps),
        });
        Ok(())
    }
}
