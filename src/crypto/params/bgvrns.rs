//! BGVrns parameters. Every modulus is `1 mod t` (and `1 mod 2n`), so modulus
//! switching leaves the plaintext untouched.

use tracing::{debug, instrument};

use super::bfvrns::rlwe_over_chain;
use super::{RescaleTables, RlweParams, RlweSettings, SchemeKind, resolve_ring_dim};
use crate::crypto::errors::{HeError, HeResult};
use crate::math::{
    inv_mod, neg_mod,
    primes::{first_prime, previous_prime},
};

pub const MAX_MODULUS_BITS: u32 = 60;
const BASE_NOISE_BITS: u32 = 28;

fn msb(x: u64) -> u32 {
    64 - x.leading_zeros()
}

/// Tower size used when the caller does not pick one.
pub fn default_dcrt_bits(plaintext_modulus: u64) -> u32 {
    (BASE_NOISE_BITS + msb(plaintext_modulus)).min(MAX_MODULUS_BITS)
}

/// `lcm(2n, t)` for power-of-two `2n`: the progression all moduli live in.
pub(crate) fn modulus_order(cyclotomic_order: u64, t: u64) -> u64 {
    let twos = t.trailing_zeros();
    let odd = t >> twos;
    (1u64 << twos).max(cyclotomic_order) * odd
}

/// Moduli count, sizes and ring dimension of a BGV chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BgvChainRequest {
    pub plaintext_modulus: u64,
    pub towers: usize,
    pub first_mod_bits: u32,
    pub dcrt_bits: u32,
    pub ring_dim: usize,
}

#[instrument(skip_all, fields(t = request.plaintext_modulus, towers = request.towers))]
pub(crate) fn bgv_chain(settings: &RlweSettings, request: &BgvChainRequest) -> HeResult<(usize, Vec<u64>)> {
    let t = request.plaintext_modulus;
    if t < 2 {
        return Err(HeError::InvalidParameter {
            name: "plaintext_modulus",
            message: format!("must be at least 2, got {t}"),
        });
    }
    if request.towers == 0 {
        return Err(HeError::InvalidParameter {
            name: "towers",
            message: "the chain needs at least one modulus".into(),
        });
    }
    for (name, bits) in [("first_mod_bits", request.first_mod_bits), ("dcrt_bits", request.dcrt_bits)] {
        if bits == 0 || bits > MAX_MODULUS_BITS {
            return Err(HeError::InvalidParameter {
                name,
                message: format!("must be in 1..={MAX_MODULUS_BITS}, got {bits}"),
            });
        }
    }
    let mut q_bound = request.first_mod_bits + (request.towers as u32 - 1) * request.dcrt_bits;
    if q_bound != MAX_MODULUS_BITS {
        q_bound += 1;
    }
    let n = resolve_ring_dim(
        settings.distribution(),
        settings.security_level,
        request.ring_dim,
        q_bound,
    )?;

    let order = modulus_order(2 * n as u64, t);
    let missing = |bits: u32| HeError::ParamsGen {
        message: format!("ran out of {bits}-bit primes congruent to 1 mod {order}"),
    };
    let below = |bits: u32| {
        first_prime(bits, order)
            .and_then(|q| previous_prime(q, order))
            .ok_or_else(|| missing(bits))
    };
    let mut moduli = vec![below(request.first_mod_bits)?];
    if request.towers > 1 {
        let start = if request.first_mod_bits != request.dcrt_bits {
            below(request.dcrt_bits)?
        } else {
            moduli[0]
        };
        let mut q = previous_prime(start, order).ok_or_else(|| missing(request.dcrt_bits))?;
        moduli.push(q);
        while moduli.len() < request.towers {
            q = previous_prime(q, order).ok_or_else(|| missing(request.dcrt_bits))?;
            moduli.push(q);
        }
    }
    debug!(ring_dim = n, ?moduli, "BGV chain");
    Ok((n, moduli))
}

/// Multiplicative order of `t` modulo `m`, or `None` when they share a factor.
fn multiplicative_order(t: u64, m: u64) -> Option<u64> {
    if gcd(t, m) != 1 {
        return None;
    }
    let t = t % m;
    let mut power = t;
    let mut order = 1;
    while power != 1 {
        power = ((power as u128 * t as u128) % m as u128) as u64;
        order += 1;
    }
    Some(order)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Full packing when `t` splits completely, otherwise `n / ord_m(t)` slots.
pub(crate) fn bgv_batch_size(requested: usize, t: u64, ring_dim: usize) -> HeResult<usize> {
    if requested > ring_dim {
        return Err(HeError::InvalidParameter {
            name: "batch_size",
            message: format!("{requested} exceeds the ring dimension {ring_dim}"),
        });
    }
    if requested > 0 {
        return Ok(requested);
    }
    let m = 2 * ring_dim as u64;
    Ok(match multiplicative_order(t, m) {
        Some(order) => ring_dim / order as usize,
        None => ring_dim,
    })
}

/// Modulus-switching constants for every level.
#[derive(Debug, Clone)]
pub struct BgvRnsTables {
    rescale: RescaleTables,
    /// `-t^{-1} mod q_l`, indexed by tower count `l + 1`.
    neg_t_inv_mod_ql: Vec<u64>,
}

impl BgvRnsTables {
    pub fn rescale(&self) -> &RescaleTables {
        &self.rescale
    }

    pub fn neg_t_inv_mod_ql(&self, towers: usize) -> HeResult<u64> {
        self.neg_t_inv_mod_ql
            .get(towers)
            .copied()
            .filter(|_| towers >= 2)
            .ok_or(HeError::OutOfLevels {
                requested: 1,
                available: towers.saturating_sub(1),
            })
    }
}

#[derive(Debug, Clone)]
pub struct BgvRnsParams {
    rlwe: RlweParams,
    tables: Option<BgvRnsTables>,
}

impl BgvRnsParams {
    pub fn generate(mut settings: RlweSettings, request: &BgvChainRequest) -> HeResult<Self> {
        let (n, moduli) = bgv_chain(&settings, request)?;
        settings.batch_size = bgv_batch_size(settings.batch_size, request.plaintext_modulus, n)?;
        let mut params = Self::from_chain(settings, request.plaintext_modulus, 2 * n as u32, &moduli)?;
        params.precompute()?;
        Ok(params)
    }

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

    pub fn tables(&self) -> HeResult<&BgvRnsTables> {
        self.tables.as_ref().ok_or(HeError::TablesNotPrecomputed {
            scheme: SchemeKind::BgvRns,
        })
    }

    #[instrument(skip_all)]
    pub fn precompute(&mut self) -> HeResult<()> {
        let moduli = self.rlwe.moduli();
        let t = self.rlwe.plaintext_modulus();
        let mut neg_t_inv_mod_ql = vec![0, 0];
        for &q in moduli.iter().skip(1) {
            let inv = inv_mod(t % q, q).ok_or(HeError::InvalidParameter {
                name: "plaintext_modulus",
                message: format!("{t} is not invertible modulo {q}"),
            })?;
            neg_t_inv_mod_ql.push(neg_mod(inv, q));
        }
        self.tables = Some(BgvRnsTables {
            rescale: RescaleTables::new(&moduli)?,
            neg_t_inv_mod_ql,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::params::SecurityLevel;

    #[test]
    fn moduli_are_one_mod_t_and_2n() {
        let settings = RlweSettings {
            security_level: SecurityLevel::NotSet,
            ..RlweSettings::default()
        };
        let request = BgvChainRequest {
            plaintext_modulus: 65537,
            towers: 3,
            first_mod_bits: 50,
            dcrt_bits: default_dcrt_bits(65537),
            ring_dim: 2048,
        };
        let (n, moduli) = bgv_chain(&settings, &request).unwrap();
        assert_eq!(n, 2048);
        assert_eq!(moduli.len(), 3);
        for &q in &moduli {
            assert_eq!(q % 65537, 1);
            assert_eq!(q % 4096, 1);
        }
        assert_eq!(64 - moduli[0].leading_zeros(), 50);
        assert_eq!(64 - moduli[1].leading_zeros(), 45);
        assert!(moduli[2] < moduli[1]);
    }

    #[test]
    fn security_level_picks_the_dimension() {
        let request = BgvChainRequest {
            plaintext_modulus: 257,
            towers: 2,
            first_mod_bits: 40,
            dcrt_bits: 37,
            ring_dim: 0,
        };
        let (n, _) = bgv_chain(&RlweSettings::default(), &request).unwrap();
        // 78 bits need n = 4096 at 128-bit security.
        assert_eq!(n, 4096);
        let unset = RlweSettings {
            security_level: SecurityLevel::NotSet,
            ..RlweSettings::default()
        };
        assert!(matches!(bgv_chain(&unset, &request), Err(HeError::ParamsGen { .. })));
    }

    #[test]
    fn batch_size_follows_the_order_of_t() {
        assert_eq!(bgv_batch_size(0, 65537, 2048).unwrap(), 2048);
        // 3 has order 2^(k-2) modulo 2^k.
        assert_eq!(bgv_batch_size(0, 3, 8).unwrap(), 8 / 4);
        assert_eq!(bgv_batch_size(0, 4, 8).unwrap(), 8);
        assert!(bgv_batch_size(9, 3, 8).is_err());
        assert_eq!(modulus_order(16, 12), 48);
        assert_eq!(modulus_order(16, 64), 64);
    }
}
