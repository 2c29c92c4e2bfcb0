//! CKKS: approximate arithmetic on `Delta`-scaled messages. A product has
//! scale `Delta^2` and is brought back by rescaling, which divides by the
//! last tower and drops it.

use tracing::{debug, instrument};

use super::{Decrypted, SchemeOps, inner_product, tensor_product};
use crate::crypto::errors::{HeError, HeResult};
use crate::crypto::params::{CkksParams, RlweParams, SchemeKind};
use crate::crypto::types::Ciphertext;
use crate::keys::SecretKey;
use crate::math::bigint::CrtReconstruction;
use crate::rings::{DcrtPoly, Format, RingError};

impl CkksParams {
    /// `Delta^depth` as a float.
    pub fn scale_at(&self, depth: usize) -> f64 {
        (self.scale_bits() as f64 * depth as f64).exp2()
    }

    /// Rejects a scale degree whose message would not fit the remaining
    /// modulus.
    pub(crate) fn check_depth(&self, depth: usize, towers: usize) -> HeResult<()> {
        let bits = self.rlwe().params_at(towers)?.modulus_bits() as usize;
        let scale_bits = self.scale_bits() as usize;
        if depth * scale_bits > bits {
            return Err(HeError::DepthExceeded {
                depth,
                max: bits / scale_bits,
            });
        }
        Ok(())
    }
}

impl SchemeOps for CkksParams {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Ckks
    }

    fn rlwe(&self) -> &RlweParams {
        CkksParams::rlwe(self)
    }

    fn decrypt_raw(&self, secret_key: &SecretKey, ciphertext: &Ciphertext) -> HeResult<Decrypted> {
        let b = inner_product(secret_key, ciphertext)?;
        let crt = CrtReconstruction::new(&b.params().moduli()).ok_or(RingError::EmptyBasis)?;
        let scale = self.scale_at(ciphertext.depth());
        let coefficients = b
            .crt_interpolate_f64(&crt)?
            .into_iter()
            .map(|c| c / scale)
            .collect();
        Ok(Decrypted::Real(coefficients))
    }

    fn tensor(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Vec<DcrtPoly>> {
        self.check_depth(a.depth() + b.depth(), a.level())?;
        let evaluation = |ct: &Ciphertext| -> Vec<DcrtPoly> {
            ct.elements()
                .iter()
                .map(|c| c.clone().with_format(Format::Evaluation))
                .collect()
        };
        tensor_product(&evaluation(a), &evaluation(b))
    }

    /// Rescales: divides by the last tower `q_l ~ Delta` and lowers the depth.
    #[instrument(skip_all, fields(level = ciphertext.level(), depth = ciphertext.depth()))]
    fn mod_reduce_in_place(&self, ciphertext: &mut Ciphertext) -> HeResult<()> {
        if ciphertext.depth() <= 1 {
            return Err(HeError::ScaleExhausted {
                depth: ciphertext.depth(),
            });
        }
        let ql_inv = self.tables()?.ql_inv_mod_q(ciphertext.level())?;
        for element in ciphertext.elements_mut() {
            element.drop_last_element_and_scale(ql_inv)?;
        }
        let depth = ciphertext.depth() - 1;
        ciphertext.set_depth(depth);
        debug!(level = ciphertext.level(), depth, "rescaled");
        Ok(())
    }

    fn aligns_levels(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::crypto::errors::ErrorKind;
    use crate::crypto::params::ckks::CkksChainRequest;
    use crate::crypto::params::{RlweSettings, SecurityLevel};
    use crate::crypto::types::Plaintext;
    use crate::encoding::{CkksEncoder, PlaintextValue, ckks_packed::scaled_element};

    pub(crate) fn params(towers: usize) -> CkksParams {
        let settings = RlweSettings {
            security_level: SecurityLevel::NotSet,
            ..RlweSettings::default()
        };
        let request = CkksChainRequest {
            towers,
            scale_bits: 40,
            first_mod_bits: 60,
            ring_dim: 64,
        };
        CkksParams::generate(settings, &request).unwrap()
    }

    fn plaintext(params: &CkksParams, encoder: &CkksEncoder, values: &[f64]) -> Plaintext {
        let slots: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        let coeffs = encoder.encode(&slots).unwrap();
        let element = scaled_element(&coeffs, params.scale_bits(), 1, params.rlwe().element_params().clone()).unwrap();
        Plaintext::new(PlaintextValue::CkksPacked(slots), element, 1)
    }

    fn slots(params: &CkksParams, encoder: &CkksEncoder, sk: &SecretKey, ct: &Ciphertext) -> Vec<f64> {
        match params.decrypt_raw(sk, ct).unwrap() {
            Decrypted::Real(c) => encoder.decode(&c).unwrap().iter().map(|z| z.re).collect(),
            Decrypted::Integer(_) => panic!("expected real coefficients"),
        }
    }

    #[test]
    fn product_survives_rescaling() {
        let params = params(3);
        let encoder = CkksEncoder::new(64, 8).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let keys = params.key_gen(&mut rng).unwrap();
        let a = [0.5, -1.25, 2.0, 3.5, 0.0, -0.75, 1.0, 4.0];
        let b = [2.0, 0.5, -1.5, 1.0, 9.0, 2.0, -3.0, 0.25];
        let ca = params.encrypt(&keys.public, &plaintext(&params, &encoder, &a), &mut rng).unwrap();
        let cb = params.encrypt(&keys.public, &plaintext(&params, &encoder, &b), &mut rng).unwrap();
        for (got, want) in slots(&params, &encoder, &keys.secret, &ca).iter().zip(&a) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-6);
        }

        let mut ct = Ciphertext::new(params.tensor(&ca, &cb).unwrap(), 2, ca.encoding(), SchemeKind::Ckks, ca.key_tag())
            .unwrap();
        params.mod_reduce_in_place(&mut ct).unwrap();
        assert_eq!((ct.level(), ct.depth()), (2, 1));
        for (got, (x, y)) in slots(&params, &encoder, &keys.secret, &ct).iter().zip(a.iter().zip(&b)) {
            assert_abs_diff_eq!(*got, x * y, epsilon = 1e-3);
        }
    }

    #[test]
    fn depth_and_levels_are_bounded() {
        let params = params(2);
        assert!(params.check_depth(2, 2).is_ok());
        let err = params.check_depth(3, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);

        let encoder = CkksEncoder::new(64, 8).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let keys = params.key_gen(&mut rng).unwrap();
        let a = [1.0, 2.0, -3.0, 4.0, 0.5, 0.25, -1.0, 8.0];
        let b = [0.5, -1.0, 2.0, 0.25, 4.0, -2.0, 3.0, 0.125];
        let mut ca = params.encrypt(&keys.public, &plaintext(&params, &encoder, &a), &mut rng).unwrap();
        let cb = params.encrypt(&keys.public, &plaintext(&params, &encoder, &b), &mut rng).unwrap();

        // A fresh ciphertext carries a single Delta and stays untouched.
        let err = params.mod_reduce_in_place(&mut ca).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert_eq!((ca.level(), ca.depth()), (2, 1));
        for (got, want) in slots(&params, &encoder, &keys.secret, &ca).iter().zip(&a) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-6);
        }

        let mut ct = Ciphertext::new(params.tensor(&ca, &cb).unwrap(), 2, ca.encoding(), SchemeKind::Ckks, ca.key_tag())
            .unwrap();
        params.mod_reduce_in_place(&mut ct).unwrap();
        assert_eq!((ct.level(), ct.depth()), (1, 1));
        for (got, (x, y)) in slots(&params, &encoder, &keys.secret, &ct).iter().zip(a.iter().zip(&b)) {
            assert_abs_diff_eq!(*got, x * y, epsilon = 1e-3);
        }
        assert_eq!(params.mod_reduce_in_place(&mut ct).unwrap_err().kind(), ErrorKind::Capacity);

        let mut last = Ciphertext::new(params.tensor(&ca, &cb).unwrap(), 2, ca.encoding(), SchemeKind::Ckks, ca.key_tag())
            .unwrap();
        for element in last.elements_mut() {
            element.drop_last_elements(1).unwrap();
        }
        assert_eq!(params.mod_reduce_in_place(&mut last).unwrap_err().kind(), ErrorKind::Capacity);
    }
}
