//! BV key-switching key from an old secret `s'` to a target secret `s`.
//!
//! Component `i` encrypts the gadget element `g_i(s')` under `s`:
//! `b_i = g_i(s') - a_i*s + k*e_i`. The gadget is tower-major: tower `j` of
//! `s'` (split into base-`2^w` powers when `w > 0`) sitting in tower `j`.

use rand::Rng;
use tracing::{debug, instrument};

use super::{KeyTag, SecretKey};
use crate::crypto::errors::{HeError, HeResult};
use crate::crypto::params::RlweParams;
use crate::rings::DcrtPoly;

#[derive(Debug, Clone)]
pub struct EvalKey {
    pub b: Vec<DcrtPoly>,
    pub a: Vec<DcrtPoly>,
    key_tag: KeyTag,
    window: u32,
}

impl EvalKey {
    /// Key switching `old` (in evaluation format over the full chain) to
    /// `target`.
    #[instrument(skip_all, fields(window = params.relin_window()))]
    pub fn generate<R: Rng + ?Sized>(
        old: &DcrtPoly,
        target: &SecretKey,
        params: &RlweParams,
        noise_scale: u64,
        rng: &mut R,
    ) -> HeResult<Self> {
        let window = params.relin_window();
        let element_params = params.element_params();
        let gadget = old.powers_of_base(window)?;
        let mut b = Vec::with_capacity(gadget.len());
        let mut a = Vec::with_capacity(gadget.len());
        for g in gadget {
            let a_i = params.sample_uniform(element_params, rng)?;
            let mut b_i = params.sample_error(element_params, rng)?;
            b_i.times_scalar_assign(noise_scale);
            b_i.plus_assign(&g)?;
            b_i.minus_assign(&a_i.times(&target.s)?)?;
            b.push(b_i);
            a.push(a_i);
        }
        debug!(components = b.len(), "key switching key");
        Ok(Self {
            b,
            a,
            key_tag: target.key_tag(),
            window,
        })
    }

    pub fn from_parts(b: Vec<DcrtPoly>, a: Vec<DcrtPoly>, key_tag: KeyTag, window: u32) -> HeResult<Self> {
        if b.len() != a.len() || b.is_empty() {
            return Err(HeError::Malformed {
                message: format!("eval key has {} b and {} a components", b.len(), a.len()),
            });
        }
        Ok(Self { b, a, key_tag, window })
    }

    /// Tag of the secret the key switches into.
    pub fn key_tag(&self) -> KeyTag {
        self.key_tag
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Number of leading components that cover the first `towers` towers.
    pub fn components_for(&self, towers: usize) -> HeResult<usize> {
        let available = self.b.first().map_or(0, DcrtPoly::len);
        if towers > available {
            return Err(HeError::OutOfLevels {
                requested: towers,
                available,
            });
        }
        if self.window == 0 {
            return Ok(towers);
        }
        let mut count = 0;
        for tower in &self.b[0].towers()[..towers] {
            count += tower.window_count(self.window)?;
        }
        Ok(count)
    }
}
