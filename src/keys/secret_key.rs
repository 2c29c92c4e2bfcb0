//! Secret key: a small polynomial `s` (ternary or Gaussian) kept in
//! evaluation format over the full chain.

use rand::Rng;

use super::KeyTag;
use crate::crypto::errors::HeResult;
use crate::crypto::params::RlweParams;
use crate::rings::DcrtPoly;

#[derive(Debug, Clone)]
pub struct SecretKey {
    pub s: DcrtPoly,
    key_tag: KeyTag,
}

impl SecretKey {
    pub fn generate<R: Rng + ?Sized>(params: &RlweParams, rng: &mut R) -> HeResult<Self> {
        let s = params.sample_secret(rng)?;
        Ok(Self {
            s,
            key_tag: rng.random(),
        })
    }

    pub fn from_parts(s: DcrtPoly, key_tag: KeyTag) -> Self {
        Self { s, key_tag }
    }

    pub fn key_tag(&self) -> KeyTag {
        self.key_tag
    }

    /// `s` restricted to the first `towers` towers.
    pub fn at_level(&self, towers: usize) -> HeResult<DcrtPoly> {
        if towers == self.s.len() {
            return Ok(self.s.clone());
        }
        Ok(self.s.truncated(towers)?)
    }

    /// `s^k` over the full chain, `k >= 1`.
    pub fn power(&self, k: usize) -> HeResult<DcrtPoly> {
        let mut acc = self.s.clone();
        for _ in 1..k {
            acc.times_assign(&self.s)?;
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::crypto::params::{BgvRnsParams, RlweSettings, SecurityLevel};
    use crate::rings::Format;

    fn params() -> RlweParams {
        let settings = RlweSettings {
            security_level: SecurityLevel::NotSet,
            ..RlweSettings::default()
        };
        BgvRnsParams::from_chain(settings, 17, 32, &[97, 193, 257])
            .unwrap()
            .rlwe()
            .clone()
    }

    #[test]
    fn secret_is_ternary_and_in_evaluation_format() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let sk = SecretKey::generate(&params(), &mut rng).unwrap();
        assert_eq!(sk.s.format(), Format::Evaluation);
        let coeff = sk.s.clone().with_format(Format::Coefficient);
        for tower in coeff.towers() {
            for i in 0..tower.ring_dim() {
                assert!(tower.centered_value(i).abs() <= 1);
            }
        }
        let other = SecretKey::generate(&params(), &mut rng).unwrap();
        assert_ne!(sk.key_tag(), other.key_tag());
    }

    #[test]
    fn powers_and_levels() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let sk = SecretKey::generate(&params(), &mut rng).unwrap();
        let square = sk.power(2).unwrap();
        assert_eq!(square, sk.s.times(&sk.s).unwrap());
        assert_eq!(sk.power(1).unwrap(), sk.s);
        let low = sk.at_level(2).unwrap();
        assert_eq!(low.len(), 2);
        assert_eq!(low.tower(1), sk.s.tower(1));
    }
}
