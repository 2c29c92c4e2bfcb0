//! BEHZ-style RNS conversions for BFVrnsB.
//!
//! The auxiliary basis is `Bsk = B U {msk}` where `B` has as many primes as
//! `Q` and `msk` is sized so that `Q * B * msk` exceeds the largest tensor
//! coefficient `2 n Q^2 t`. Conversions avoid floating point entirely:
//! `Q -> Bsk` is corrected by a small Montgomery reduction modulo
//! `mtilde = 2^16`, and `Bsk -> Q` by the Shenoy-Kumaresan trick on `msk`.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::{
    Format,
    dcrt::DcrtPoly,
    errors::{RingError, RingResult},
    hps::{auxiliary_moduli, barretts},
    ntt::NttEngine,
    params::DcrtParams,
};
use crate::math::{
    bigint,
    modular::{Barrett, add_mod, inv_mod, mul_mod, reduce_signed, sub_mod},
    primes::{first_prime, next_prime},
};

pub const MTILDE_BITS: u32 = 16;
const MTILDE: u64 = 1 << MTILDE_BITS;
pub const GAMMA_BITS: u32 = 26;
const GAMMA: u64 = 1 << GAMMA_BITS;
const MAX_MSK_BITS: u32 = 60;

fn inverse(value: u64, modulus: u64) -> RingResult<u64> {
    inv_mod(value % modulus, modulus).ok_or(RingError::NotInvertible { value, modulus })
}

#[derive(Debug, Clone)]
pub struct BehzTables {
    plaintext_modulus: u64,
    q_params: Arc<DcrtParams>,
    bsk_params: Arc<DcrtParams>,
    q_bsk_params: Arc<DcrtParams>,
    q_barrett: Vec<Barrett>,
    bsk_barrett: Vec<Barrett>,

    // Q -> Bsk (Montgomery)
    mtilde_q_hat_inv_mod_q: Vec<u64>,
    /// `[Q/q_i]_{bsk_j}`, indexed `[i][j]`
    q_hat_mod_bsk: Vec<Vec<u64>>,
    q_hat_mod_mtilde: Vec<u64>,
    neg_q_inv_mod_mtilde: u64,
    q_mod_bsk: Vec<u64>,
    mtilde_inv_mod_bsk: Vec<u64>,

    // approximate floor
    t_q_hat_inv_mod_q: Vec<u64>,
    /// `[q_i^{-1}]_{bsk_j}`, indexed `[i][j]`
    q_inv_mod_bsk: Vec<Vec<u64>>,
    t_q_inv_mod_bsk: Vec<u64>,

    // Bsk -> Q (Shenoy-Kumaresan)
    b_hat_inv_mod_b: Vec<u64>,
    /// `[B/b_i]_{q_j}`, indexed `[i][j]`
    b_hat_mod_q: Vec<Vec<u64>>,
    b_hat_mod_msk: Vec<u64>,
    b_inv_mod_msk: u64,
    b_mod_q: Vec<u64>,

    // decryption
    tgamma: u64,
    tgamma_q_hat_inv_mod_q: Vec<u64>,
    neg_inv_q_mod_tgamma: Vec<u64>,
}

impl BehzTables {
    #[instrument(skip_all, fields(towers = q_params.len(), t = plaintext_modulus))]
    pub fn new(q_params: Arc<DcrtParams>, plaintext_modulus: u64, engine: &NttEngine) -> RingResult<Self> {
        let t = plaintext_modulus;
        let tgamma = t
            .checked_mul(GAMMA)
            .filter(|&v| v < 1 << 58)
            .ok_or(RingError::UnsupportedPlaintextModulus { modulus: t })?;

        let m = q_params.cyclotomic_order();
        let n = q_params.ring_dim() as f64;
        let q_moduli = q_params.moduli();
        let mut bsk_moduli = auxiliary_moduli(&q_moduli, q_moduli.len() + 1, m as u64)?;
        let b_moduli = bsk_moduli[..q_moduli.len()].to_vec();

        // Q * B * msk must exceed 2 n Q^2 t.
        let log_q = bigint::log2_product(&q_moduli);
        let log_b = bigint::log2_product(&b_moduli);
        let needed = 1.0 + n.log2() + 2.0 * log_q + (t as f64).log2();
        let mut msk = bsk_moduli[q_moduli.len()];
        let mut bits = 64 - msk.leading_zeros();
        while log_q + log_b + (msk as f64).log2() < needed {
            if bits >= MAX_MSK_BITS {
                return Err(RingError::AuxiliaryModulusTooLarge { bits: MAX_MSK_BITS });
            }
            let first = first_prime(bits + 1, m as u64)
                .ok_or(RingError::AuxiliaryModulusTooLarge { bits: bits + 1 })?;
            msk = next_prime(first, m as u64)
                .ok_or(RingError::AuxiliaryModulusTooLarge { bits: bits + 1 })?;
            while q_moduli.contains(&msk) || b_moduli.contains(&msk) {
                msk = next_prime(msk, m as u64)
                    .ok_or(RingError::AuxiliaryModulusTooLarge { bits: bits + 1 })?;
            }
            bits += 1;
        }
        bsk_moduli[q_moduli.len()] = msk;
        debug!(?b_moduli, msk, "auxiliary basis Bsk");

        let mut all = q_moduli.clone();
        all.extend(&bsk_moduli);
        if !bigint::check_capacity(&all, 64) {
            return Err(RingError::WideIntegerOverflow {
                bits: q_params.modulus_bits() * 2 + 64,
            });
        }

        let bsk_params = Arc::new(DcrtParams::from_moduli(m, &bsk_moduli, engine)?);
        let q_bsk_params = Arc::new(q_params.extended(&bsk_params)?);

        let big_q = bigint::product(&q_moduli);
        let big_b = bigint::product(&b_moduli);
        let q_hat_inv = bigint::hat_inverses(&q_moduli).ok_or(RingError::NotInvertible {
            value: 0,
            modulus: q_moduli[0],
        })?;

        let mtilde_q_hat_inv_mod_q = q_moduli
            .iter()
            .zip(&q_hat_inv)
            .map(|(&q, &h)| mul_mod(h, MTILDE % q, q))
            .collect();
        let t_q_hat_inv_mod_q = q_moduli
            .iter()
            .zip(&q_hat_inv)
            .map(|(&q, &h)| mul_mod(h, t % q, q))
            .collect();
        let tgamma_q_hat_inv_mod_q = q_moduli
            .iter()
            .zip(&q_hat_inv)
            .map(|(&q, &h)| mul_mod(mul_mod(h, GAMMA % q, q), t % q, q))
            .collect();

        let q_hat_mod_bsk = q_moduli
            .iter()
            .map(|&q| {
                let hat = bigint::div_u64(&big_q, q);
                bsk_moduli.iter().map(|&b| bigint::rem_u64(&hat, b)).collect()
            })
            .collect();
        let q_hat_mod_mtilde = q_moduli
            .iter()
            .map(|&q| bigint::rem_u64(&bigint::div_u64(&big_q, q), MTILDE))
            .collect();
        let q_inv_mod_bsk = q_moduli
            .iter()
            .map(|&q| bsk_moduli.iter().map(|&b| inverse(q, b)).collect::<RingResult<Vec<_>>>())
            .collect::<RingResult<Vec<_>>>()?;

        let q_mod_mtilde = bigint::rem_u64(&big_q, MTILDE);
        let q_inv_mod_mtilde = inverse(q_mod_mtilde, MTILDE)?;
        let neg_q_inv_mod_mtilde = (MTILDE - q_inv_mod_mtilde) % MTILDE;

        let q_mod_bsk = bsk_moduli.iter().map(|&b| bigint::rem_u64(&big_q, b)).collect::<Vec<_>>();
        let mtilde_inv_mod_bsk = bsk_moduli
            .iter()
            .map(|&b| inverse(MTILDE, b))
            .collect::<RingResult<Vec<_>>>()?;
        let t_q_inv_mod_bsk = bsk_moduli
            .iter()
            .zip(&q_mod_bsk)
            .map(|(&b, &qb)| inverse(qb, b).map(|inv| mul_mod(inv, t % b, b)))
            .collect::<RingResult<Vec<_>>>()?;

        let b_hat_inv_mod_b = bigint::hat_inverses(&b_moduli).ok_or(RingError::NotInvertible {
            value: 0,
            modulus: b_moduli[0],
        })?;
        let b_hat_mod_q = b_moduli
            .iter()
            .map(|&b| {
                let hat = bigint::div_u64(&big_b, b);
                q_moduli.iter().map(|&q| bigint::rem_u64(&hat, q)).collect()
            })
            .collect();
        let b_hat_mod_msk = bigint::hat_residues(&b_moduli, msk);
        let b_inv_mod_msk = inverse(bigint::rem_u64(&big_b, msk), msk)?;
        let b_mod_q = q_moduli.iter().map(|&q| bigint::rem_u64(&big_b, q)).collect();

        let neg_inv_q_mod_tgamma = q_moduli
            .iter()
            .map(|&q| inverse(q, tgamma).map(|inv| tgamma - inv))
            .collect::<RingResult<Vec<_>>>()?;

        Ok(Self {
            plaintext_modulus,
            q_barrett: barretts(&q_moduli)?,
            bsk_barrett: barretts(&bsk_moduli)?,
            q_params,
            bsk_params,
            q_bsk_params,
            mtilde_q_hat_inv_mod_q,
            q_hat_mod_bsk,
            q_hat_mod_mtilde,
            neg_q_inv_mod_mtilde,
            q_mod_bsk,
            mtilde_inv_mod_bsk,
            t_q_hat_inv_mod_q,
            q_inv_mod_bsk,
            t_q_inv_mod_bsk,
            b_hat_inv_mod_b,
            b_hat_mod_q,
            b_hat_mod_msk,
            b_inv_mod_msk,
            b_mod_q,
            tgamma,
            tgamma_q_hat_inv_mod_q,
            neg_inv_q_mod_tgamma,
        })
    }

    pub fn plaintext_modulus(&self) -> u64 {
        self.plaintext_modulus
    }

    pub fn q_params(&self) -> &Arc<DcrtParams> {
        &self.q_params
    }

    /// `B U {msk}`
    pub fn bsk_params(&self) -> &Arc<DcrtParams> {
        &self.bsk_params
    }

    pub fn q_bsk_params(&self) -> &Arc<DcrtParams> {
        &self.q_bsk_params
    }

    pub fn msk(&self) -> u64 {
        self.bsk_params.tower(self.bsk_params.len() - 1).modulus()
    }
}

fn ensure_basis(x: &DcrtPoly, expected: &DcrtParams, operation: &'static str) -> RingResult<()> {
    if x.len() != expected.len() {
        return Err(RingError::TowerCountMismatch {
            expected: expected.len(),
            actual: x.len(),
        });
    }
    if x.params().moduli() != expected.moduli() {
        return Err(RingError::ParamsMismatch { operation });
    }
    Ok(())
}

fn column(x: &DcrtPoly, k: usize, range: std::ops::Range<usize>, out: &mut [u64]) {
    for (slot, i) in out.iter_mut().zip(range) {
        *slot = x.tower(i).values()[k];
    }
}

impl DcrtPoly {
    /// Extends an element over `Q` to `Q U Bsk`, returned in evaluation
    /// format. The extension equals `x + k Q` for a small `k`.
    #[instrument(skip_all)]
    pub fn fast_base_conv_q_to_bsk_montgomery(&self, tables: &BehzTables) -> RingResult<DcrtPoly> {
        ensure_basis(self, tables.q_params(), "fast_base_conv_q_to_bsk_montgomery")?;
        let coeff = self.clone().with_format(Format::Coefficient);
        let size_q = coeff.len();
        let bsk = tables.bsk_params();
        let n = self.ring_dim();
        let mut values = vec![vec![0u64; n]; bsk.len()];
        let mut y = vec![0u64; size_q];
        for k in 0..n {
            column(&coeff, k, 0..size_q, &mut y);
            for (i, yi) in y.iter_mut().enumerate() {
                *yi = tables.q_barrett[i].mul(*yi, tables.mtilde_q_hat_inv_mod_q[i]);
            }
            let r_mtilde = y
                .iter()
                .zip(&tables.q_hat_mod_mtilde)
                .fold(0u64, |acc, (&yi, &h)| acc.wrapping_add(yi.wrapping_mul(h)))
                .wrapping_mul(tables.neg_q_inv_mod_mtilde)
                & (MTILDE - 1);
            let r_centered = if r_mtilde >= MTILDE >> 1 {
                r_mtilde as i64 - MTILDE as i64
            } else {
                r_mtilde as i64
            };
            for (j, out) in values.iter_mut().enumerate() {
                let barrett = &tables.bsk_barrett[j];
                let b = barrett.modulus();
                let sum: u128 = y
                    .iter()
                    .enumerate()
                    .map(|(i, &yi)| yi as u128 * tables.q_hat_mod_bsk[i][j] as u128)
                    .sum();
                let c = barrett.reduce(sum);
                let r_q = barrett.mul(reduce_signed(r_centered, b), tables.q_mod_bsk[j]);
                out[k] = barrett.mul(add_mod(c, r_q, b), tables.mtilde_inv_mod_bsk[j]);
            }
        }
        let ext = DcrtPoly::from_tower_values(bsk.clone(), values, Format::Coefficient)?
            .with_format(Format::Evaluation);
        let mut towers = self.clone().with_format(Format::Evaluation).into_towers();
        towers.extend(ext.into_towers());
        DcrtPoly::from_towers(tables.q_bsk_params().clone(), towers)
    }

    /// Approximate `floor(t/Q * x)` for `x` over `Q U Bsk`; the result lives
    /// over `Bsk` in coefficient format and may undershoot by less than `|Q|`.
    #[instrument(skip_all)]
    pub fn fast_rns_floor_q(&self, tables: &BehzTables) -> RingResult<DcrtPoly> {
        ensure_basis(self, tables.q_bsk_params(), "fast_rns_floor_q")?;
        self.require_coefficient("fast_rns_floor_q")?;
        let size_q = tables.q_params().len();
        let bsk = tables.bsk_params();
        let n = self.ring_dim();
        let mut values = vec![vec![0u64; n]; bsk.len()];
        let mut y = vec![0u64; size_q];
        for k in 0..n {
            column(self, k, 0..size_q, &mut y);
            for (i, yi) in y.iter_mut().enumerate() {
                *yi = tables.q_barrett[i].mul(*yi, tables.t_q_hat_inv_mod_q[i]);
            }
            for (j, out) in values.iter_mut().enumerate() {
                let barrett = &tables.bsk_barrett[j];
                let sum: u128 = y
                    .iter()
                    .enumerate()
                    .map(|(i, &yi)| yi as u128 * tables.q_inv_mod_bsk[i][j] as u128)
                    .sum();
                let conv = barrett.reduce(sum);
                let scaled = barrett.mul(self.tower(size_q + j).values()[k], tables.t_q_inv_mod_bsk[j]);
                out[k] = sub_mod(scaled, conv, barrett.modulus());
            }
        }
        DcrtPoly::from_tower_values(bsk.clone(), values, Format::Coefficient)
    }

    /// Exact conversion `Bsk -> Q` of the centred value, in coefficient format.
    #[instrument(skip_all)]
    pub fn fast_base_conv_sk(&self, tables: &BehzTables) -> RingResult<DcrtPoly> {
        ensure_basis(self, tables.bsk_params(), "fast_base_conv_sk")?;
        self.require_coefficient("fast_base_conv_sk")?;
        let size_b = tables.bsk_params().len() - 1;
        let msk_barrett = &tables.bsk_barrett[size_b];
        let msk = msk_barrett.modulus();
        let q_params = tables.q_params();
        let n = self.ring_dim();
        let mut values = vec![vec![0u64; n]; q_params.len()];
        let mut z = vec![0u64; size_b];
        for k in 0..n {
            column(self, k, 0..size_b, &mut z);
            for (i, zi) in z.iter_mut().enumerate() {
                *zi = tables.bsk_barrett[i].mul(*zi, tables.b_hat_inv_mod_b[i]);
            }
            let sum: u128 = z
                .iter()
                .zip(&tables.b_hat_mod_msk)
                .map(|(&zi, &h)| zi as u128 * h as u128)
                .sum();
            let x_msk = self.tower(size_b).values()[k];
            let alpha = msk_barrett.mul(
                sub_mod(msk_barrett.reduce(sum), x_msk, msk),
                tables.b_inv_mod_msk,
            );
            let alpha_signed = if alpha > msk >> 1 {
                alpha as i64 - msk as i64
            } else {
                alpha as i64
            };
            for (j, out) in values.iter_mut().enumerate() {
                let barrett = &tables.q_barrett[j];
                let q = barrett.modulus();
                let conv: u128 = z
                    .iter()
                    .enumerate()
                    .map(|(i, &zi)| zi as u128 * tables.b_hat_mod_q[i][j] as u128)
                    .sum();
                let correction = barrett.mul(reduce_signed(alpha_signed, q), tables.b_mod_q[j]);
                out[k] = sub_mod(barrett.reduce(conv), correction, q);
            }
        }
        DcrtPoly::from_tower_values(q_params.clone(), values, Format::Coefficient)
    }

    /// BEHZ decryption rounding with the `gamma = 2^26` correction:
    /// `round(t/Q * x) mod t` for `x` over `Q` in coefficient format.
    #[instrument(skip_all)]
    pub fn scale_and_round_tgamma(&self, tables: &BehzTables) -> RingResult<Vec<u64>> {
        ensure_basis(self, tables.q_params(), "scale_and_round_tgamma")?;
        self.require_coefficient("scale_and_round_tgamma")?;
        let t = tables.plaintext_modulus();
        let tgamma = tables.tgamma;
        Ok((0..self.ring_dim())
            .map(|k| {
                let mut s = 0u64;
                for (i, tower) in self.towers().iter().enumerate() {
                    let x = tables.q_barrett[i].mul(tower.values()[k], tables.tgamma_q_hat_inv_mod_q[i]);
                    s = add_mod(s, mul_mod(x % tgamma, tables.neg_inv_q_mod_tgamma[i], tgamma), tgamma);
                }
                s += s & (GAMMA - 1);
                (s >> GAMMA_BITS) % t
            })
            .collect())
    }
}
