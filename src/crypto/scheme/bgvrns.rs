//! BGVrns: the message lives in the low bits, `c_0 + c_1 s = m + t e`.
//! Noise is scaled by `t` everywhere and modulus switching keeps `m mod t`
//! because every tower is `1 mod t`.

use tracing::{debug, instrument};

use super::{Decrypted, SchemeOps, inner_product, tensor_product};
use crate::crypto::errors::HeResult;
use crate::crypto::params::{BgvRnsParams, RlweParams, SchemeKind};
use crate::crypto::types::Ciphertext;
use crate::keys::SecretKey;
use crate::math::modular::reduce_signed;
use crate::rings::{DcrtPoly, Format};

impl BgvRnsParams {
    /// Switches one element from `towers` to `towers - 1` moduli.
    fn switch_down(&self, element: &mut DcrtPoly) -> HeResult<()> {
        let tables = self.tables()?;
        let towers = element.len();
        element.mod_reduce(
            self.rlwe().plaintext_modulus(),
            tables.neg_t_inv_mod_ql(towers)?,
            tables.rescale().ql_inv_mod_q(towers)?,
        )?;
        Ok(())
    }
}

impl SchemeOps for BgvRnsParams {
    fn kind(&self) -> SchemeKind {
        SchemeKind::BgvRns
    }

    fn rlwe(&self) -> &RlweParams {
        BgvRnsParams::rlwe(self)
    }

    fn noise_scale(&self) -> u64 {
        self.rlwe().plaintext_modulus()
    }

    /// Reduces `m + t e` to a single tower, where it is small enough to be
    /// read off directly.
    fn decrypt_raw(&self, secret_key: &SecretKey, ciphertext: &Ciphertext) -> HeResult<Decrypted> {
        let mut b = inner_product(secret_key, ciphertext)?;
        while b.len() > 1 {
            self.switch_down(&mut b)?;
        }
        let t = self.rlwe().plaintext_modulus();
        let tower = b.tower(0);
        Ok(Decrypted::Integer(
            (0..tower.ring_dim())
                .map(|k| reduce_signed(tower.centered_value(k) % t as i64, t))
                .collect(),
        ))
    }

    fn tensor(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Vec<DcrtPoly>> {
        let evaluation = |ct: &Ciphertext| -> Vec<DcrtPoly> {
            ct.elements()
                .iter()
                .map(|c| c.clone().with_format(Format::Evaluation))
                .collect()
        };
        tensor_product(&evaluation(a), &evaluation(b))
    }

    #[instrument(skip_all, fields(level = ciphertext.level()))]
    fn mod_reduce_in_place(&self, ciphertext: &mut Ciphertext) -> HeResult<()> {
        for element in ciphertext.elements_mut() {
            self.switch_down(element)?;
        }
        debug!(level = ciphertext.level(), "modulus switched");
        Ok(())
    }

    fn aligns_levels(&self) -> bool {
        true
    }
}
