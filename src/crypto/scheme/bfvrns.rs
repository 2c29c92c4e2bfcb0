//! BFVrns with HPS rounding: the message sits in the high bits as
//! `Delta * m`, products are scaled by `t/Q` in the extended basis `Q U P`.

use tracing::instrument;

use super::{Decrypted, SchemeOps, inner_product, tensor_product};
use crate::crypto::errors::HeResult;
use crate::crypto::params::{BfvRnsParams, RlweParams, SchemeKind};
use crate::crypto::types::Ciphertext;
use crate::keys::SecretKey;
use crate::rings::{DcrtPoly, Format};

impl SchemeOps for BfvRnsParams {
    fn kind(&self) -> SchemeKind {
        SchemeKind::BfvRns
    }

    fn rlwe(&self) -> &RlweParams {
        BfvRnsParams::rlwe(self)
    }

    fn scale_message(&self, m: &DcrtPoly) -> HeResult<DcrtPoly> {
        let mut scaled = m.clone();
        scaled.times_scalars_assign(self.tables()?.delta())?;
        Ok(scaled)
    }

    fn decrypt_raw(&self, secret_key: &SecretKey, ciphertext: &Ciphertext) -> HeResult<Decrypted> {
        let b = inner_product(secret_key, ciphertext)?;
        Ok(Decrypted::Integer(b.scale_and_round_to_t(self.tables()?.hps())?))
    }

    #[instrument(skip_all)]
    fn tensor(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Vec<DcrtPoly>> {
        let hps = self.tables()?.hps();
        let expand = |ct: &Ciphertext| {
            ct.elements()
                .iter()
                .map(|c| c.expand_crt_basis(hps))
                .collect::<Result<Vec<_>, _>>()
        };
        let product = tensor_product(&expand(a)?, &expand(b)?)?;
        product
            .into_iter()
            .map(|c| {
                let scaled = c.with_format(Format::Coefficient).scale_and_round_to_p(hps)?;
                Ok(scaled.switch_crt_basis(hps.p_to_q())?.with_format(Format::Evaluation))
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::crypto::params::{BfvWorkload, RlweSettings, SecurityLevel};
    use crate::crypto::types::Plaintext;
    use crate::encoding::PlaintextValue;
    use crate::math::modular::reduce_signed;

    pub(crate) const T: u64 = 65537;

    pub(crate) fn settings() -> RlweSettings {
        RlweSettings {
            sigma: crate::crypto::params::DEFAULT_BFV_SIGMA,
            security_level: SecurityLevel::NotSet,
            ..RlweSettings::default()
        }
    }

    pub(crate) fn one_mult() -> BfvWorkload {
        BfvWorkload {
            eval_mults: 1,
            ..BfvWorkload::default()
        }
    }

    pub(crate) fn plaintext(rlwe: &RlweParams, values: &[i64]) -> Plaintext {
        let element = DcrtPoly::from_signed(rlwe.element_params().clone(), values, Format::Evaluation).unwrap();
        Plaintext::new(PlaintextValue::CoefPacked(values.to_vec()), element, 1)
    }

    /// Negacyclic product modulo `t`.
    pub(crate) fn negacyclic(a: &[i64], b: &[i64], n: usize, t: u64) -> Vec<u64> {
        let mut out = vec![0i128; n];
        for (i, &x) in a.iter().enumerate() {
            for (j, &y) in b.iter().enumerate() {
                let k = i + j;
                let term = x as i128 * y as i128;
                if k < n {
                    out[k] += term;
                } else {
                    out[k - n] -= term;
                }
            }
        }
        out.into_iter()
            .map(|v| reduce_signed((v % t as i128) as i64, t))
            .collect()
    }

    pub(crate) fn integers(d: Decrypted) -> Vec<u64> {
        match d {
            Decrypted::Integer(v) => v,
            Decrypted::Real(_) => panic!("expected integer coefficients"),
        }
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let params = BfvRnsParams::generate(settings(), T, BfvWorkload::default(), 60, 64).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let keys = params.key_gen(&mut rng).unwrap();
        let values: Vec<i64> = (0..64).map(|i| i * 1000 - 30000).collect();
        let pt = plaintext(params.rlwe(), &values);

        let ct = params.encrypt(&keys.public, &pt, &mut rng).unwrap();
        let out = integers(params.decrypt_raw(&keys.secret, &ct).unwrap());
        let expected: Vec<u64> = values.iter().map(|&v| reduce_signed(v, T)).collect();
        assert_eq!(out, expected);

        let ct = params.encrypt_with_secret_key(&keys.secret, &pt, &mut rng).unwrap();
        assert_eq!(integers(params.decrypt_raw(&keys.secret, &ct).unwrap()), expected);
    }

    #[test]
    fn tensor_decrypts_under_the_squared_secret() {
        let params = BfvRnsParams::generate(settings(), T, one_mult(), 60, 64).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let keys = params.key_gen(&mut rng).unwrap();
        let a: Vec<i64> = (0..64).map(|i| (i % 7) - 3).collect();
        let b: Vec<i64> = (0..64).map(|i| (i % 5) - 2).collect();
        let ca = params.encrypt(&keys.public, &plaintext(params.rlwe(), &a), &mut rng).unwrap();
        let cb = params.encrypt(&keys.public, &plaintext(params.rlwe(), &b), &mut rng).unwrap();

        let product = params.tensor(&ca, &cb).unwrap();
        assert_eq!(product.len(), 3);
        let ct = Ciphertext::new(product, 2, ca.encoding(), SchemeKind::BfvRns, ca.key_tag()).unwrap();
        let out = integers(params.decrypt_raw(&keys.secret, &ct).unwrap());
        assert_eq!(out, negacyclic(&a, &b, 64, T));
    }

    #[test]
    fn mod_reduce_is_not_offered() {
        let params = BfvRnsParams::generate(settings(), T, BfvWorkload::default(), 60, 64).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let keys = params.key_gen(&mut rng).unwrap();
        let mut ct = params
            .encrypt(&keys.public, &plaintext(params.rlwe(), &[1, 2, 3]), &mut rng)
            .unwrap();
        let err = params.mod_reduce_in_place(&mut ct).unwrap_err();
        assert_eq!(err.kind(), crate::crypto::errors::ErrorKind::NotImplemented);
    }
}
