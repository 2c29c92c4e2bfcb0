//! Negacyclic number-theoretic transform over `Z_q[X] / (X^n + 1)`.
//!
//! The forward transform is the Cooley-Tukey merged variant that folds the
//! `psi` twist into the butterflies and leaves its output in bit-reversed
//! order; the inverse is the matching Gentleman-Sande variant consuming
//! bit-reversed input. After a forward transform, slot `brv(k)` holds the
//! evaluation `a(psi^(2k+1))` where `psi` is the primitive `2n`-th root of
//! unity the table was built from.
//!
//! Tables are cached by [`NttEngine`], keyed by `(modulus, cyclotomic order)`.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use super::errors::{RingError, RingResult};
use crate::math::{
    modular::{add_mod, inv_mod, mul_mod, pow_mod, sub_mod},
    primes::is_primitive_root_of_unity,
};

/// Precomputed powers of `psi` (and `psi^{-1}`) in bit-reversed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NttTable {
    modulus: u64,
    cyclotomic_order: u32,
    root_of_unity: u64,
    psi_rev: Vec<u64>,
    psi_inv_rev: Vec<u64>,
    n_inv: u64,
}

impl NttTable {
    pub fn new(root_of_unity: u64, cyclotomic_order: u32, modulus: u64) -> RingResult<Self> {
        let ring_dim = (cyclotomic_order / 2) as usize;
        if ring_dim < 2 || !ring_dim.is_power_of_two() {
            return Err(RingError::InvalidRingDimension { ring_dim });
        }
        if modulus % cyclotomic_order as u64 != 1 {
            return Err(RingError::NonNttFriendlyModulus {
                modulus,
                cyclotomic_order,
            });
        }
        if !is_primitive_root_of_unity(root_of_unity, cyclotomic_order as u64, modulus) {
            return Err(RingError::MissingRootOfUnity {
                modulus,
                cyclotomic_order,
            });
        }

        let root_inv = inv_mod(root_of_unity, modulus).ok_or(RingError::NotInvertible {
            value: root_of_unity,
            modulus,
        })?;
        let n_inv = inv_mod(ring_dim as u64, modulus).ok_or(RingError::NotInvertible {
            value: ring_dim as u64,
            modulus,
        })?;

        let bits = ring_dim.trailing_zeros();
        let mut psi_rev = vec![0u64; ring_dim];
        let mut psi_inv_rev = vec![0u64; ring_dim];
        let (mut power, mut power_inv) = (1u64, 1u64);
        for i in 0..ring_dim {
            let slot = reverse_bits(i, bits);
            psi_rev[slot] = power;
            psi_inv_rev[slot] = power_inv;
            power = mul_mod(power, root_of_unity, modulus);
            power_inv = mul_mod(power_inv, root_inv, modulus);
        }

        Ok(Self {
            modulus,
            cyclotomic_order,
            root_of_unity,
            psi_rev,
            psi_inv_rev,
            n_inv,
        })
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn cyclotomic_order(&self) -> u32 {
        self.cyclotomic_order
    }

    pub fn root_of_unity(&self) -> u64 {
        self.root_of_unity
    }

    pub fn ring_dim(&self) -> usize {
        self.psi_rev.len()
    }

    /// Forward transform in place; output is in bit-reversed order.
    pub fn forward_in_place(&self, values: &mut [u64]) {
        let n = self.ring_dim();
        debug_assert_eq!(values.len(), n, "forward_in_place: length mismatch");
        let q = self.modulus;
        let mut t = n;
        let mut m = 1;
        while m < n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let s = self.psi_rev[m + i];
                for j in j1..j1 + t {
                    let u = values[j];
                    let v = mul_mod(values[j + t], s, q);
                    values[j] = add_mod(u, v, q);
                    values[j + t] = sub_mod(u, v, q);
                }
            }
            m <<= 1;
        }
    }

    /// Inverse transform in place, consuming bit-reversed input and applying
    /// the final `n^{-1}` scaling.
    pub fn inverse_in_place(&self, values: &mut [u64]) {
        let n = self.ring_dim();
        debug_assert_eq!(values.len(), n, "inverse_in_place: length mismatch");
        let q = self.modulus;
        let mut t = 1;
        let mut m = n;
        while m > 1 {
            let h = m >> 1;
            let mut j1 = 0;
            for i in 0..h {
                let s = self.psi_inv_rev[h + i];
                for j in j1..j1 + t {
                    let u = values[j];
                    let v = values[j + t];
                    values[j] = add_mod(u, v, q);
                    values[j + t] = mul_mod(sub_mod(u, v, q), s, q);
                }
                j1 += 2 * t;
            }
            t <<= 1;
            m = h;
        }
        for value in values.iter_mut() {
            *value = mul_mod(*value, self.n_inv, q);
        }
    }

    pub fn forward(&self, values: &[u64]) -> Vec<u64> {
        let mut out = values.to_vec();
        self.forward_in_place(&mut out);
        out
    }

    pub fn inverse(&self, values: &[u64]) -> Vec<u64> {
        let mut out = values.to_vec();
        self.inverse_in_place(&mut out);
        out
    }

    /// Evaluation point of bit-reversed slot `slot`: `psi^(2*brv(slot)+1)`.
    pub fn evaluation_point(&self, slot: usize) -> u64 {
        let bits = self.ring_dim().trailing_zeros();
        let k = reverse_bits(slot, bits) as u64;
        pow_mod(self.root_of_unity, 2 * k + 1, self.modulus)
    }
}

/// Cache of NTT tables shared by every element parameter set of a context.
///
/// Precomputation is idempotent; a transform requested for a pair that was
/// never precomputed is a configuration error.
#[derive(Debug, Default)]
pub struct NttEngine {
    tables: RwLock<HashMap<(u64, u32), Arc<NttTable>>>,
}

impl NttEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds (or returns the cached) table for `(modulus, cyclotomic_order)`.
    pub fn precompute(
        &self,
        root_of_unity: u64,
        cyclotomic_order: u32,
        modulus: u64,
    ) -> RingResult<Arc<NttTable>> {
        let key = (modulus, cyclotomic_order);
        if let Some(table) = self.lookup(key) {
            return Ok(table);
        }
        let table = Arc::new(NttTable::new(root_of_unity, cyclotomic_order, modulus)?);
        let mut tables = self.tables.write().unwrap_or_else(|poison| poison.into_inner());
        Ok(tables.entry(key).or_insert(table).clone())
    }

    pub fn table(&self, modulus: u64, cyclotomic_order: u32) -> RingResult<Arc<NttTable>> {
        self.lookup((modulus, cyclotomic_order))
            .ok_or(RingError::NttNotPrecomputed {
                modulus,
                cyclotomic_order,
            })
    }

    pub fn is_precomputed(&self, modulus: u64, cyclotomic_order: u32) -> bool {
        self.lookup((modulus, cyclotomic_order)).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn forward_transform_to_bit_reverse(
        &self,
        input: &[u64],
        cyclotomic_order: u32,
        modulus: u64,
    ) -> RingResult<Vec<u64>> {
        let table = self.checked_table(input.len(), modulus, cyclotomic_order)?;
        Ok(table.forward(input))
    }

    pub fn forward_transform_to_bit_reverse_in_place(
        &self,
        values: &mut [u64],
        cyclotomic_order: u32,
        modulus: u64,
    ) -> RingResult<()> {
        let table = self.checked_table(values.len(), modulus, cyclotomic_order)?;
        table.forward_in_place(values);
        Ok(())
    }

    pub fn inverse_transform_from_bit_reverse(
        &self,
        input: &[u64],
        cyclotomic_order: u32,
        modulus: u64,
    ) -> RingResult<Vec<u64>> {
        let table = self.checked_table(input.len(), modulus, cyclotomic_order)?;
        Ok(table.inverse(input))
    }

    pub fn inverse_transform_from_bit_reverse_in_place(
        &self,
        values: &mut [u64],
        cyclotomic_order: u32,
        modulus: u64,
    ) -> RingResult<()> {
        let table = self.checked_table(values.len(), modulus, cyclotomic_order)?;
        table.inverse_in_place(values);
        Ok(())
    }

    fn lookup(&self, key: (u64, u32)) -> Option<Arc<NttTable>> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(&key).cloned())
    }

    fn checked_table(
        &self,
        len: usize,
        modulus: u64,
        cyclotomic_order: u32,
    ) -> RingResult<Arc<NttTable>> {
        let table = self.table(modulus, cyclotomic_order)?;
        if len != table.ring_dim() {
            return Err(RingError::LengthMismatch {
                expected: table.ring_dim(),
                actual: len,
            });
        }
        Ok(table)
    }
}

/// Reverses the lowest `bits` bits of `index`.
#[inline]
pub fn reverse_bits(index: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    index.reverse_bits() >> (usize::BITS - bits)
}
