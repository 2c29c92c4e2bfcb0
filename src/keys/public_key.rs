//! Public key: an RLWE sample `(b, a)` with `b = -a*s + k*e`, where `k` is the
//! scheme's noise scale (1, or `t` for BGV).

use rand::Rng;

use super::{KeyTag, SecretKey};
use crate::crypto::errors::HeResult;
use crate::crypto::params::RlweParams;
use crate::rings::DcrtPoly;

#[derive(Debug, Clone)]
pub struct PublicKey {
    pub b: DcrtPoly,
    pub a: DcrtPoly,
    key_tag: KeyTag,
}

impl PublicKey {
    pub fn generate<R: Rng + ?Sized>(
        secret_key: &SecretKey,
        params: &RlweParams,
        noise_scale: u64,
        rng: &mut R,
    ) -> HeResult<Self> {
        let element_params = params.element_params();
        let a = params.sample_uniform(element_params, rng)?;
        let mut b = params.sample_error(element_params, rng)?;
        b.times_scalar_assign(noise_scale);
        b.minus_assign(&a.times(&secret_key.s)?)?;
        Ok(Self {
            b,
            a,
            key_tag: secret_key.key_tag(),
        })
    }

    pub fn from_parts(b: DcrtPoly, a: DcrtPoly, key_tag: KeyTag) -> Self {
        Self { b, a, key_tag }
    }

    pub fn key_tag(&self) -> KeyTag {
        self.key_tag
    }

    /// `(b, a)` restricted to the first `towers` towers.
    pub fn at_level(&self, towers: usize) -> HeResult<(DcrtPoly, DcrtPoly)> {
        if towers == self.b.len() {
            return Ok((self.b.clone(), self.a.clone()));
        }
        Ok((self.b.truncated(towers)?, self.a.truncated(towers)?))
    }
}
