//! CKKS parameters: a first modulus for the final precision and scaling
//! primes close to `2^scale_bits`, alternating just below and just above it
//! so that repeated rescaling does not drift.

use tracing::{debug, instrument};

use super::bfvrns::rlwe_over_chain;
use super::{RescaleTables, RlweParams, RlweSettings, SchemeKind, resolve_ring_dim};
use crate::crypto::errors::{HeError, HeResult};
use crate::math::primes::{first_prime, next_prime, previous_prime};

pub const MAX_MODULUS_BITS: u32 = 60;
pub const DEFAULT_SCALE_BITS: u32 = 50;
pub const DEFAULT_FIRST_MOD_BITS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CkksChainRequest {
    /// Total number of moduli: one plus the multiplicative depth.
    pub towers: usize,
    pub scale_bits: u32,
    pub first_mod_bits: u32,
    pub ring_dim: usize,
}

#[instrument(skip_all, fields(towers = request.towers, scale_bits = request.scale_bits))]
pub(crate) fn ckks_chain(settings: &RlweSettings, request: &CkksChainRequest) -> HeResult<(usize, Vec<u64>)> {
    if request.towers == 0 {
        return Err(HeError::InvalidParameter {
            name: "towers",
            message: "the chain needs at least one modulus".into(),
        });
    }
    for (name, bits) in [
        ("scale_bits", request.scale_bits),
        ("first_mod_bits", request.first_mod_bits),
    ] {
        if bits < 2 || bits > MAX_MODULUS_BITS {
            return Err(HeError::InvalidParameter {
                name,
                message: format!("must be in 2..={MAX_MODULUS_BITS}, got {bits}"),
            });
        }
    }
    let mut q_bound = request.first_mod_bits + (request.towers as u32 - 1) * request.scale_bits;
    if q_bound != MAX_MODULUS_BITS {
        q_bound += 1;
    }
    let n = resolve_ring_dim(
        settings.distribution(),
        settings.security_level,
        request.ring_dim,
        q_bound,
    )?;

    let m = 2 * n as u64;
    let missing = |bits: u32| HeError::ParamsGen {
        message: format!("ran out of {bits}-bit primes congruent to 1 mod {m}"),
    };
    let last = request.towers - 1;
    let mut moduli = vec![0u64; request.towers];
    let mut q_prev = 0;
    if last > 0 {
        let anchor = first_prime(request.scale_bits, m).ok_or_else(|| missing(request.scale_bits))?;
        moduli[last] = anchor;
        q_prev = anchor;
        let mut q_next = anchor;
        for (count, i) in (1..last).rev().enumerate() {
            if count % 2 == 0 {
                q_prev = previous_prime(q_prev, m).ok_or_else(|| missing(request.scale_bits))?;
                moduli[i] = q_prev;
            } else {
                q_next = next_prime(q_next, m).ok_or_else(|| missing(request.scale_bits))?;
                moduli[i] = q_next;
            }
        }
    }
    moduli[0] = if last > 0 && request.first_mod_bits == request.scale_bits {
        previous_prime(q_prev, m)
    } else {
        first_prime(request.first_mod_bits, m).and_then(|q| previous_prime(q, m))
    }
    .ok_or_else(|| missing(request.first_mod_bits))?;
    debug!(ring_dim = n, ?moduli, "CKKS chain");
    Ok((n, moduli))
}

pub(crate) fn ckks_batch_size(requested: usize, ring_dim: usize) -> HeResult<usize> {
    let max = ring_dim / 2;
    match requested {
        0 => Ok(max),
        b if b > max || !b.is_power_of_two() => Err(HeError::InvalidParameter {
            name: "batch_size",
            message: format!("must be a power of two at most {max}, got {b}"),
        }),
        b => Ok(b),
    }
}

#[derive(Debug, Clone)]
pub struct CkksParams {
    rlwe: RlweParams,
    scale_bits: u32,
    tables: Option<RescaleTables>,
}

impl CkksParams {
    pub fn generate(mut settings: RlweSettings, request: &CkksChainRequest) -> HeResult<Self> {
        let (n, moduli) = ckks_chain(&settings, request)?;
        settings.batch_size = ckks_batch_size(settings.batch_size, n)?;
        let mut params = Self::from_chain(settings, request.scale_bits, 2 * n as u32, &moduli)?;
        params.precompute()?;
        Ok(params)
    }

    pub fn from_chain(
        settings: RlweSettings,
        scale_bits: u32,
        cyclotomic_order: u32,
        moduli: &[u64],
    ) -> HeResult<Self> {
        Ok(Self {
            rlwe: rlwe_over_chain(settings, 0, cyclotomic_order, moduli)?,
            scale_bits,
            tables: None,
        })
    }

    pub fn rlwe(&self) -> &RlweParams {
        &self.rlwe
    }

    /// `log2` of the scaling factor `Delta`.
    pub fn scale_bits(&self) -> u32 {
        self.scale_bits
    }

    pub fn tables(&self) -> HeResult<&RescaleTables> {
        self.tables.as_ref().ok_or(HeError::TablesNotPrecomputed {
            scheme: SchemeKind::Ckks,
        })
    }

    pub fn precompute(&mut self) -> HeResult<()> {
        self.tables = Some(RescaleTables::new(&self.rlwe.moduli())?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::params::SecurityLevel;

    fn unset() -> RlweSettings {
        RlweSettings {
            security_level: SecurityLevel::NotSet,
            ..RlweSettings::default()
        }
    }

    #[test]
    fn scaling_primes_hug_the_scale() {
        let request = CkksChainRequest {
            towers: 5,
            scale_bits: 40,
            first_mod_bits: 60,
            ring_dim: 1024,
        };
        let (_, moduli) = ckks_chain(&unset(), &request).unwrap();
        assert_eq!(moduli.len(), 5);
        assert_eq!(64 - moduli[0].leading_zeros(), 60);
        let scale = (1u64 << 40) as f64;
        for &q in &moduli[1..] {
            assert_eq!(q % 2048, 1);
            assert!((q as f64 / scale - 1.0).abs() < 1e-3);
        }
        let mut sorted = moduli.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), moduli.len());
        // Alternation: one prime below the anchor, then one above.
        assert!(moduli[3] < moduli[4]);
        assert!(moduli[2] > moduli[4]);
    }

    #[test]
    fn equal_first_size_reuses_the_progression() {
        let request = CkksChainRequest {
            towers: 3,
            scale_bits: 45,
            first_mod_bits: 45,
            ring_dim: 512,
        };
        let (_, moduli) = ckks_chain(&unset(), &request).unwrap();
        assert!(moduli[0] < moduli[1]);
        assert!(moduli[1] < moduli[2]);
    }

    #[test]
    fn batch_size_is_a_power_of_two_up_to_half_n() {
        assert_eq!(ckks_batch_size(0, 1024).unwrap(), 512);
        assert_eq!(ckks_batch_size(8, 1024).unwrap(), 8);
        assert!(ckks_batch_size(12, 1024).is_err());
        assert!(ckks_batch_size(1024, 1024).is_err());
    }
}
