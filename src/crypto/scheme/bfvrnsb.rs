//! BFVrnsB: BFV with BEHZ base conversions. Products are formed over
//! `Q U Bsk` after a Montgomery-corrected extension and brought back with a
//! fast floor followed by the Shenoy-Kumaresan conversion.

use tracing::instrument;

use super::{Decrypted, SchemeOps, inner_product, tensor_product};
use crate::crypto::errors::HeResult;
use crate::crypto::params::{BfvRnsBParams, RlweParams, SchemeKind};
use crate::crypto::types::Ciphertext;
use crate::keys::SecretKey;
use crate::rings::{DcrtPoly, Format};

impl SchemeOps for BfvRnsBParams {
    fn kind(&self) -> SchemeKind {
        SchemeKind::BfvRnsB
    }

    fn rlwe(&self) -> &RlweParams {
        BfvRnsBParams::rlwe(self)
    }

    fn scale_message(&self, m: &DcrtPoly) -> HeResult<DcrtPoly> {
        let mut scaled = m.clone();
        scaled.times_scalars_assign(self.tables()?.delta())?;
        Ok(scaled)
    }

    fn decrypt_raw(&self, secret_key: &SecretKey, ciphertext: &Ciphertext) -> HeResult<Decrypted> {
        let b = inner_product(secret_key, ciphertext)?;
        Ok(Decrypted::Integer(b.scale_and_round_tgamma(self.tables()?.behz())?))
    }

    #[instrument(skip_all)]
    fn tensor(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Vec<DcrtPoly>> {
        let behz = self.tables()?.behz();
        let extend = |ct: &Ciphertext| {
            ct.elements()
                .iter()
                .map(|c| c.fast_base_conv_q_to_bsk_montgomery(behz))
                .collect::<Result<Vec<_>, _>>()
        };
        let product = tensor_product(&extend(a)?, &extend(b)?)?;
        product
            .into_iter()
            .map(|c| {
                let floored = c.with_format(Format::Coefficient).fast_rns_floor_q(behz)?;
                Ok(floored.fast_base_conv_sk(behz)?.with_format(Format::Evaluation))
            })
            .collect()
    }
}
