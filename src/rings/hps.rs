//! HPS-style RNS conversions for BFVrns.
//!
//! An auxiliary basis `P = {p_0 .. p_k}` (one prime more than `Q`) holds the
//! tensor product of two ciphertexts without overflow. Everything below
//! stays in native words: the integer part of every CRT coefficient is
//! precomputed modulo the target primes, while the fractional parts are
//! summed in `f64` and rounded once per coefficient.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::{
    Format,
    dcrt::DcrtPoly,
    errors::{RingError, RingResult},
    ntt::NttEngine,
    params::DcrtParams,
};
use crate::math::{
    bigint,
    modular::{Barrett, add_mod, inv_mod, mul_mod, sub_mod},
    primes::previous_prime,
};

/// Bits of precision an `f64` accumulation may consume before the rounding
/// in decryption becomes unreliable.
const FLOAT_SAFE_BITS: u32 = 52;

fn msb(x: u64) -> u32 {
    64 - x.leading_zeros()
}

fn inverse(value: u64, modulus: u64) -> RingResult<u64> {
    inv_mod(value % modulus, modulus).ok_or(RingError::NotInvertible { value, modulus })
}

pub(crate) fn barretts(moduli: &[u64]) -> RingResult<Vec<Barrett>> {
    moduli
        .iter()
        .map(|&modulus| Barrett::new(modulus).ok_or(RingError::InvalidModulus { modulus }))
        .collect()
}

/// Tables for `x mod {source} -> x mod {target}` with exact rounding of the
/// overflow count `alpha`.
#[derive(Debug, Clone)]
pub struct BasisSwitch {
    source: Arc<DcrtParams>,
    target: Arc<DcrtParams>,
    /// `[(S/s_i)^{-1}]_{s_i}`
    hat_inv_mod_source: Vec<u64>,
    /// `1 / s_i`
    source_inv: Vec<f64>,
    /// `[S/s_i]_{t_j}`, indexed `[j][i]`
    hat_mod_target: Vec<Vec<u64>>,
    /// `[alpha * S]_{t_j}` for `alpha in 0..=|source|`, indexed `[alpha][j]`
    alpha_mod_target: Vec<Vec<u64>>,
    target_barrett: Vec<Barrett>,
}

impl BasisSwitch {
    pub fn new(source: Arc<DcrtParams>, target: Arc<DcrtParams>) -> RingResult<Self> {
        let src = source.moduli();
        let dst = target.moduli();
        let hat_inv_mod_source = bigint::hat_inverses(&src).ok_or(RingError::NotInvertible {
            value: 0,
            modulus: src[0],
        })?;
        let big_s = bigint::product(&src);
        let hat_mod_target = dst.iter().map(|&p| bigint::hat_residues(&src, p)).collect();
        let alpha_mod_target = (0..=src.len() as u64)
            .map(|alpha| {
                dst.iter()
                    .map(|&p| mul_mod(alpha % p, bigint::rem_u64(&big_s, p), p))
                    .collect()
            })
            .collect();
        Ok(Self {
            source_inv: src.iter().map(|&q| 1.0 / q as f64).collect(),
            target_barrett: barretts(&dst)?,
            source,
            target,
            hat_inv_mod_source,
            hat_mod_target,
            alpha_mod_target,
        })
    }

    pub fn source(&self) -> &Arc<DcrtParams> {
        &self.source
    }

    pub fn target(&self) -> &Arc<DcrtParams> {
        &self.target
    }

    /// Converts one coefficient given its source residues.
    fn convert(&self, residues: &[u64], scratch: &mut [u64], out: &mut [u64]) {
        let mut nu = 0.5f64;
        for (i, (&x, y)) in residues.iter().zip(scratch.iter_mut()).enumerate() {
            let q = self.source.tower(i).modulus();
            *y = mul_mod(x, self.hat_inv_mod_source[i], q);
            nu += *y as f64 * self.source_inv[i];
        }
        // 0 <= alpha <= |source|
        let alpha = (nu as usize).min(self.alpha_mod_target.len() - 1);
        let correction = &self.alpha_mod_target[alpha];
        for (j, value) in out.iter_mut().enumerate() {
            let sum: u128 = scratch
                .iter()
                .zip(&self.hat_mod_target[j])
                .map(|(&y, &h)| y as u128 * h as u128)
                .sum();
            let barrett = &self.target_barrett[j];
            *value = sub_mod(barrett.reduce(sum), correction[j], barrett.modulus());
        }
    }
}

/// Decryption tables for `round(t/Q * x) mod t`.
#[derive(Debug, Clone)]
struct DecryptTables {
    /// `floor(t * QHatInv_i / q_i) mod t`
    div_q_mod_t: Vec<u64>,
    /// `frac(t * QHatInv_i / q_i)`
    div_q_frac: Vec<f64>,
    /// Same quantities for the high half `x_i >> split`.
    b_div_q_mod_t: Vec<u64>,
    b_div_q_frac: Vec<f64>,
    /// Set when a residue must be split to keep the float sum exact.
    split: Option<u32>,
}

/// All HPS precomputations for one ciphertext chain `Q` and plaintext
/// modulus `t`.
#[derive(Debug, Clone)]
pub struct HpsTables {
    plaintext_modulus: u64,
    q_params: Arc<DcrtParams>,
    p_params: Arc<DcrtParams>,
    qp_params: Arc<DcrtParams>,
    q_to_p: BasisSwitch,
    p_to_q: BasisSwitch,
    /// `frac(t * P * [(QP/q_i)^{-1}]_{q_i} / q_i)`
    tps_hat_inv_div_s_frac: Vec<f64>,
    /// `floor(t * P * [(QP/s_i)^{-1}]_{s_i} / s_i) mod p_j`; column `|Q|`
    /// holds the contribution of `p_j` itself. Indexed `[j][i]`.
    tps_hat_inv_div_s_mod_p: Vec<Vec<u64>>,
    decrypt: DecryptTables,
}

impl HpsTables {
    /// Picks `|Q| + 1` NTT-friendly primes below the smallest `q_i` and
    /// derives every table.
    #[instrument(skip_all, fields(towers = q_params.len(), t = plaintext_modulus))]
    pub fn new(q_params: Arc<DcrtParams>, plaintext_modulus: u64, engine: &NttEngine) -> RingResult<Self> {
        let m = q_params.cyclotomic_order();
        let q_moduli = q_params.moduli();
        let p_moduli = auxiliary_moduli(&q_moduli, q_moduli.len() + 1, m as u64)?;
        let mut all = q_moduli.clone();
        all.extend(&p_moduli);
        if !bigint::check_capacity(&all, 2 * msb(plaintext_modulus)) {
            return Err(RingError::WideIntegerOverflow {
                bits: q_params.modulus_bits() + msb(plaintext_modulus),
            });
        }
        debug!(?p_moduli, "auxiliary basis P");

        let p_params = Arc::new(DcrtParams::from_moduli(m, &p_moduli, engine)?);
        let qp_params = Arc::new(q_params.extended(&p_params)?);
        let q_to_p = BasisSwitch::new(q_params.clone(), p_params.clone())?;
        let p_to_q = BasisSwitch::new(p_params.clone(), q_params.clone())?;

        let t = plaintext_modulus;
        let big_p = bigint::product(&p_moduli);
        let big_s = bigint::product(&all);
        let tp = bigint::mul_u64(&big_p, t);

        let mut tps_hat_inv_div_s_frac = Vec::with_capacity(q_moduli.len());
        let mut floors = Vec::with_capacity(q_moduli.len());
        for &q in &q_moduli {
            let hat_inv = inverse(bigint::rem_u64(&bigint::div_u64(&big_s, q), q), q)?;
            let num = bigint::mul_u64(&tp, hat_inv);
            tps_hat_inv_div_s_frac.push(bigint::rem_u64(&num, q) as f64 / q as f64);
            floors.push(bigint::div_u64(&num, q));
        }
        let tps_hat_inv_div_s_mod_p = p_moduli
            .iter()
            .map(|&p| {
                let mut row: Vec<u64> = floors.iter().map(|f| bigint::rem_u64(f, p)).collect();
                let hat_inv = inverse(bigint::rem_u64(&bigint::div_u64(&big_s, p), p), p)?;
                let p_hat = bigint::rem_u64(&bigint::div_u64(&big_p, p), p);
                row.push(mul_mod(mul_mod(t % p, p_hat, p), hat_inv, p));
                Ok(row)
            })
            .collect::<RingResult<Vec<_>>>()?;

        let decrypt = DecryptTables::new(&q_moduli, &q_to_p.hat_inv_mod_source, t);

        Ok(Self {
            plaintext_modulus,
            q_params,
            p_params,
            qp_params,
            q_to_p,
            p_to_q,
            tps_hat_inv_div_s_frac,
            tps_hat_inv_div_s_mod_p,
            decrypt,
        })
    }

    pub fn plaintext_modulus(&self) -> u64 {
        self.plaintext_modulus
    }

    pub fn q_params(&self) -> &Arc<DcrtParams> {
        &self.q_params
    }

    pub fn p_params(&self) -> &Arc<DcrtParams> {
        &self.p_params
    }

    pub fn qp_params(&self) -> &Arc<DcrtParams> {
        &self.qp_params
    }

    pub fn q_to_p(&self) -> &BasisSwitch {
        &self.q_to_p
    }

    pub fn p_to_q(&self) -> &BasisSwitch {
        &self.p_to_q
    }
}

impl DecryptTables {
    fn new(q_moduli: &[u64], q_hat_inv: &[u64], t: u64) -> Self {
        let q_msb = msb(q_moduli[0]);
        let size_msb = msb(q_moduli.len() as u64);
        let split = (q_msb + size_msb >= FLOAT_SAFE_BITS).then_some(q_msb >> 1);
        let base = 1u64 << split.unwrap_or(0);

        let mut div_q_mod_t = Vec::with_capacity(q_moduli.len());
        let mut div_q_frac = Vec::with_capacity(q_moduli.len());
        let mut b_div_q_mod_t = Vec::with_capacity(q_moduli.len());
        let mut b_div_q_frac = Vec::with_capacity(q_moduli.len());
        for (&q, &hat_inv) in q_moduli.iter().zip(q_hat_inv) {
            let num = bigint::mul_u64(&bigint::from_u64(t), hat_inv);
            div_q_mod_t.push(bigint::rem_u64(&bigint::div_u64(&num, q), t));
            div_q_frac.push(bigint::rem_u64(&num, q) as f64 / q as f64);
            let num_b = bigint::mul_u64(&num, base);
            b_div_q_mod_t.push(bigint::rem_u64(&bigint::div_u64(&num_b, q), t));
            b_div_q_frac.push(bigint::rem_u64(&num_b, q) as f64 / q as f64);
        }
        Self {
            div_q_mod_t,
            div_q_frac,
            b_div_q_mod_t,
            b_div_q_frac,
            split,
        }
    }

    fn round(&self, residues: &[u64], t: u64) -> u64 {
        let mut float_sum = 0.5f64;
        let mut int_sum = 0u128;
        match self.split {
            None => {
                for (i, &x) in residues.iter().enumerate() {
                    float_sum += x as f64 * self.div_q_frac[i];
                    int_sum += x as u128 * self.div_q_mod_t[i] as u128;
                }
            }
            Some(bits) => {
                let mask = (1u64 << bits) - 1;
                for (i, &x) in residues.iter().enumerate() {
                    let (lo, hi) = (x & mask, x >> bits);
                    float_sum += lo as f64 * self.div_q_frac[i] + hi as f64 * self.b_div_q_frac[i];
                    int_sum += lo as u128 * self.div_q_mod_t[i] as u128
                        + hi as u128 * self.b_div_q_mod_t[i] as u128;
                }
            }
        }
        let total = int_sum + float_sum.floor() as u128;
        if t.is_power_of_two() {
            (total as u64) & (t - 1)
        } else {
            (total % t as u128) as u64
        }
    }
}

/// `count` NTT-friendly primes strictly below every modulus of `moduli`,
/// walking downward.
pub fn auxiliary_moduli(moduli: &[u64], count: usize, cyclotomic_order: u64) -> RingResult<Vec<u64>> {
    let mut below = moduli.iter().copied().min().ok_or(RingError::EmptyBasis)?;
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let p = previous_prime(below, cyclotomic_order)
            .ok_or(RingError::AuxiliaryBasisExhausted { below })?;
        out.push(p);
        below = p;
    }
    Ok(out)
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

impl DcrtPoly {
    /// Exact (up to the bounded `alpha` rounding) conversion of the centred
    /// value into the target basis of `switch`. The result is in coefficient
    /// format.
    #[instrument(skip_all)]
    pub fn switch_crt_basis(&self, switch: &BasisSwitch) -> RingResult<DcrtPoly> {
        ensure_basis(self, switch.source(), "switch_crt_basis")?;
        let coeff;
        let input = if self.format() == Format::Coefficient {
            self
        } else {
            coeff = self.clone().with_format(Format::Coefficient);
            &coeff
        };
        let n = self.ring_dim();
        let target = switch.target();
        let mut values = vec![vec![0u64; n]; target.len()];
        let mut residues = vec![0u64; input.len()];
        let mut scratch = vec![0u64; input.len()];
        let mut out = vec![0u64; target.len()];
        for k in 0..n {
            for (r, tower) in residues.iter_mut().zip(input.towers()) {
                *r = tower.values()[k];
            }
            switch.convert(&residues, &mut scratch, &mut out);
            for (column, &v) in values.iter_mut().zip(&out) {
                column[k] = v;
            }
        }
        DcrtPoly::from_tower_values(target.clone(), values, Format::Coefficient)
    }

    /// Extends an element over `Q` to `Q U P`, returned in evaluation format.
    #[instrument(skip_all)]
    pub fn expand_crt_basis(&self, tables: &HpsTables) -> RingResult<DcrtPoly> {
        let part_p = self.switch_crt_basis(tables.q_to_p())?;
        let part_q = self.clone().with_format(Format::Evaluation);
        let mut towers = part_q.into_towers();
        towers.extend(part_p.with_format(Format::Evaluation).into_towers());
        DcrtPoly::from_towers(tables.qp_params().clone(), towers)
    }

    /// `round(t/Q * x)` for `x` over `Q U P`, returned over `P` in
    /// coefficient format.
    #[instrument(skip_all)]
    pub fn scale_and_round_to_p(&self, tables: &HpsTables) -> RingResult<DcrtPoly> {
        ensure_basis(self, tables.qp_params(), "scale_and_round_to_p")?;
        self.require_coefficient("scale_and_round_to_p")?;
        let size_q = tables.q_params().len();
        let p_params = tables.p_params();
        let n = self.ring_dim();
        let mut values = vec![vec![0u64; n]; p_params.len()];
        for k in 0..n {
            let mut nu = 0.5f64;
            for i in 0..size_q {
                nu += tables.tps_hat_inv_div_s_frac[i] * self.tower(i).values()[k] as f64;
            }
            let alpha = nu.floor() as u128;
            for (j, column) in values.iter_mut().enumerate() {
                let p = p_params.tower(j).modulus();
                let row = &tables.tps_hat_inv_div_s_mod_p[j];
                let mut sum: u128 = (0..size_q)
                    .map(|i| self.tower(i).values()[k] as u128 * row[i] as u128)
                    .sum();
                sum += self.tower(size_q + j).values()[k] as u128 * row[size_q] as u128;
                let reduced = tables.q_to_p.target_barrett[j].reduce(sum);
                column[k] = add_mod(reduced, (alpha % p as u128) as u64, p);
            }
        }
        DcrtPoly::from_tower_values(p_params.clone(), values, Format::Coefficient)
    }

    /// `round(t/Q * x) mod t` for every coefficient of `x` over `Q`.
    #[instrument(skip_all)]
    pub fn scale_and_round_to_t(&self, tables: &HpsTables) -> RingResult<Vec<u64>> {
        ensure_basis(self, tables.q_params(), "scale_and_round_to_t")?;
        self.require_coefficient("scale_and_round_to_t")?;
        let t = tables.plaintext_modulus();
        let mut residues = vec![0u64; self.len()];
        Ok((0..self.ring_dim())
            .map(|k| {
                for (r, tower) in residues.iter_mut().zip(self.towers()) {
                    *r = tower.values()[k];
                }
                tables.decrypt.round(&residues, t)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::math::{modular::centered, primes::first_prime};

    const M: u32 = 16;

    fn q_params(bits: u32, towers: usize, engine: &NttEngine) -> Arc<DcrtParams> {
        let start = first_prime(bits, M as u64).unwrap();
        let mut moduli = vec![previous_prime(start, M as u64).unwrap()];
        while moduli.len() < towers {
            let last = *moduli.last().unwrap();
            moduli.push(previous_prime(last, M as u64).unwrap());
        }
        Arc::new(DcrtParams::from_moduli(M, &moduli, engine).unwrap())
    }

    fn random_poly(params: &Arc<DcrtParams>, rng: &mut ChaCha20Rng) -> DcrtPoly {
        let values = params
            .moduli()
            .iter()
            .map(|&q| (0..params.ring_dim()).map(|_| rng.random_range(0..q)).collect())
            .collect();
        DcrtPoly::from_tower_values(params.clone(), values, Format::Coefficient).unwrap()
    }

    #[test]
    fn expand_then_switch_back_is_identity() {
        let engine = NttEngine::new();
        let q = q_params(30, 2, &engine);
        let tables = HpsTables::new(q.clone(), 65537, &engine).unwrap();
        assert_eq!(tables.p_params().len(), 3);
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..4 {
            let x = random_poly(&q, &mut rng);
            let expanded = x.expand_crt_basis(&tables).unwrap();
            assert_eq!(expanded.len(), 5);
            let part_p = DcrtPoly::from_towers(
                tables.p_params().clone(),
                expanded.with_format(Format::Coefficient).into_towers().split_off(2),
            )
            .unwrap();
            let back = part_p.switch_crt_basis(tables.p_to_q()).unwrap();
            assert_eq!(back, x);
        }
    }

    #[test]
    fn decrypt_rounding_recovers_message() {
        let engine = NttEngine::new();
        for (bits, towers) in [(30u32, 2usize), (58, 3)] {
            let q = q_params(bits, towers, &engine);
            let t = 65537u64;
            let tables = HpsTables::new(q.clone(), t, &engine).unwrap();
            let big_q = bigint::product(&q.moduli());
            let delta = bigint::div_u64(&big_q, t);
            let delta_mod_q: Vec<u64> = q.moduli().iter().map(|&qi| bigint::rem_u64(&delta, qi)).collect();
            let message: Vec<i64> = vec![1, 0, 65536, 12345, 3, 0, 7, 40000];
            let noise: Vec<i64> = vec![5, -3, 0, 11, -20, 1, 0, -7];
            let mut x = DcrtPoly::from_signed(q.clone(), &message, Format::Coefficient).unwrap();
            x.times_scalars_assign(&delta_mod_q).unwrap();
            x.plus_assign(&DcrtPoly::from_signed(q.clone(), &noise, Format::Coefficient).unwrap())
                .unwrap();
            let decoded = x.scale_and_round_to_t(&tables).unwrap();
            let expected: Vec<u64> = message.iter().map(|&m| m as u64).collect();
            assert_eq!(decoded, expected, "bits {bits}");
        }
    }

    #[test]
    fn tensor_rounding_divides_by_q() {
        let engine = NttEngine::new();
        let q = q_params(30, 2, &engine);
        let t = 257u64;
        let tables = HpsTables::new(q.clone(), t, &engine).unwrap();
        let qp = tables.qp_params().clone();
        let big_q = bigint::product(&q.moduli());
        // x = u*Q + w with |t*w/Q| < 1/2 rounds to t*u.
        let u = 12_345u64;
        let mut x = DcrtPoly::from_signed(qp.clone(), &[1_000, -77], Format::Coefficient).unwrap();
        let shift: Vec<u64> = qp
            .moduli()
            .iter()
            .map(|&s| mul_mod(u % s, bigint::rem_u64(&big_q, s), s))
            .collect();
        x.plus_scalars_assign(&shift).unwrap();
        let rounded = x.scale_and_round_to_p(&tables).unwrap();
        let p0 = rounded.tower(0);
        assert_eq!(centered(p0.values()[0], p0.modulus()), (t * u) as i64);
        assert_eq!(centered(p0.values()[1], p0.modulus()), 0);
        let lifted = rounded.switch_crt_basis(tables.p_to_q()).unwrap();
        assert_eq!(lifted.tower(1).values()[0], (t * u) % q.tower(1).modulus());
    }

    #[test]
    fn basis_mismatch_is_rejected() {
        let engine = NttEngine::new();
        let q = q_params(30, 2, &engine);
        let tables = HpsTables::new(q.clone(), 17, &engine).unwrap();
        let x = DcrtPoly::zero(tables.p_params().clone(), Format::Coefficient);
        assert!(matches!(
            x.scale_and_round_to_t(&tables),
            Err(RingError::TowerCountMismatch { .. })
        ));
        assert!(matches!(
            auxiliary_moduli(&[], 2, 16),
            Err(RingError::EmptyBasis)
        ));
    }

    #[test]
    fn degenerate_moduli_have_no_barrett_constant() {
        assert_eq!(barretts(&[97, 193]).unwrap().len(), 2);
        assert!(matches!(
            barretts(&[97, 1]),
            Err(RingError::InvalidModulus { modulus: 1 })
        ));
    }
}
