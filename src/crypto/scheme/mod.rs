//! Scheme algorithms. Every scheme shares RLWE key generation and
//! encryption; they differ in how the message is scaled, how a product is
//! tensored and how decryption rounds.

pub mod bfvrns;
pub mod bfvrnsb;
pub mod bgvrns;
pub mod ckks;
pub mod keyswitch;

use rand::Rng;

use super::errors::{HeError, HeResult};
use super::params::{RlweParams, SchemeKind, SchemeParams};
use super::types::{Ciphertext, Plaintext};
use crate::keys::{KeyPair, PublicKey, SecretKey};
use crate::rings::{DcrtPoly, Format};

/// Raw decryption output before decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Decrypted {
    /// Coefficients modulo the plaintext modulus.
    Integer(Vec<u64>),
    /// Coefficients divided by the ciphertext scale.
    Real(Vec<f64>),
}

pub trait SchemeOps {
    fn kind(&self) -> SchemeKind;

    fn rlwe(&self) -> &RlweParams;

    /// Factor on every error term: 1, or `t` when the message sits in the
    /// low bits.
    fn noise_scale(&self) -> u64 {
        1
    }

    /// The term an encryption adds to `c_0` for plaintext element `m`.
    fn scale_message(&self, m: &DcrtPoly) -> HeResult<DcrtPoly> {
        Ok(m.clone())
    }

    fn key_gen<R: Rng + ?Sized>(&self, rng: &mut R) -> HeResult<KeyPair> {
        let secret = SecretKey::generate(self.rlwe(), rng)?;
        let public = PublicKey::generate(&secret, self.rlwe(), self.noise_scale(), rng)?;
        Ok(KeyPair { public, secret })
    }

    /// `c_0 = p_0*u + k*e_1 + M`, `c_1 = p_1*u + k*e_2` at the plaintext's
    /// level.
    fn encrypt<R: Rng + ?Sized>(
        &self,
        public_key: &PublicKey,
        plaintext: &Plaintext,
        rng: &mut R,
    ) -> HeResult<Ciphertext> {
        let rlwe = self.rlwe();
        let message = self.scale_message(plaintext.element())?;
        let params = message.params().clone();
        let (p0, p1) = public_key.at_level(message.len())?;
        let u = rlwe.sample_ephemeral(&params, rng)?;
        let ns = self.noise_scale();

        let mut c0 = rlwe.sample_error(&params, rng)?;
        c0.times_scalar_assign(ns);
        c0.plus_assign(&p0.times(&u)?)?;
        c0.plus_assign(&message)?;
        let mut c1 = rlwe.sample_error(&params, rng)?;
        c1.times_scalar_assign(ns);
        c1.plus_assign(&p1.times(&u)?)?;
        Ciphertext::new(
            vec![c0, c1],
            plaintext.depth(),
            plaintext.encoding(),
            self.kind(),
            public_key.key_tag(),
        )
    }

    /// `c_0 = a*s + k*e + M`, `c_1 = -a`.
    fn encrypt_with_secret_key<R: Rng + ?Sized>(
        &self,
        secret_key: &SecretKey,
        plaintext: &Plaintext,
        rng: &mut R,
    ) -> HeResult<Ciphertext> {
        let rlwe = self.rlwe();
        let message = self.scale_message(plaintext.element())?;
        let params = message.params().clone();
        let s = secret_key.at_level(message.len())?;
        let a = rlwe.sample_uniform(&params, rng)?;
        let mut c0 = rlwe.sample_error(&params, rng)?;
        c0.times_scalar_assign(self.noise_scale());
        c0.plus_assign(&a.times(&s)?)?;
        c0.plus_assign(&message)?;
        Ciphertext::new(
            vec![c0, a.negate()],
            plaintext.depth(),
            plaintext.encoding(),
            self.kind(),
            secret_key.key_tag(),
        )
    }

    fn decrypt_raw(&self, secret_key: &SecretKey, ciphertext: &Ciphertext) -> HeResult<Decrypted>;

    /// Components of the product of two ciphertexts at the same level, before
    /// relinearization.
    fn tensor(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Vec<DcrtPoly>>;

    /// Drops the last tower, dividing the encrypted value accordingly.
    fn mod_reduce_in_place(&self, ciphertext: &mut Ciphertext) -> HeResult<()> {
        let _ = ciphertext;
        Err(HeError::NotImplemented {
            operation: "mod_reduce",
            scheme: self.kind(),
        })
    }

    /// Whether binary operations first bring operands to a common level.
    fn aligns_levels(&self) -> bool {
        false
    }
}

/// `sum_i c_i s^i` over the ciphertext's towers, in coefficient format.
pub(crate) fn inner_product(secret_key: &SecretKey, ciphertext: &Ciphertext) -> HeResult<DcrtPoly> {
    if ciphertext.key_tag() != secret_key.key_tag() {
        return Err(HeError::ContextMismatch { operation: "decrypt" });
    }
    let s = secret_key.at_level(ciphertext.level())?;
    let mut elements = ciphertext.elements().iter().rev();
    let mut acc = elements
        .next()
        .cloned()
        .ok_or(HeError::ComponentCount {
            operation: "decrypt",
            expected: 2,
            actual: 0,
        })?
        .with_format(Format::Evaluation);
    for c in elements {
        acc.times_assign(&s)?;
        acc.plus_assign(&c.clone().with_format(Format::Evaluation))?;
    }
    Ok(acc.with_format(Format::Coefficient))
}

/// Schoolbook product of component vectors in evaluation format:
/// `out_k = sum_{i+j=k} a_i * b_j`.
pub(crate) fn tensor_product(a: &[DcrtPoly], b: &[DcrtPoly]) -> HeResult<Vec<DcrtPoly>> {
    let (Some(a0), Some(_)) = (a.first(), b.first()) else {
        return Err(HeError::ComponentCount {
            operation: "eval_mult",
            expected: 2,
            actual: 0,
        });
    };
    let mut out = vec![DcrtPoly::zero(a0.params().clone(), Format::Evaluation); a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j].plus_assign(&x.times(y)?)?;
        }
    }
    Ok(out)
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $body:expr) => {
        match $self {
            SchemeParams::BfvRns($p) => $body,
            SchemeParams::BfvRnsB($p) => $body,
            SchemeParams::BgvRns($p) => $body,
            SchemeParams::Ckks($p) => $body,
        }
    };
}

impl SchemeOps for SchemeParams {
    fn kind(&self) -> SchemeKind {
        SchemeParams::kind(self)
    }

    fn rlwe(&self) -> &RlweParams {
        SchemeParams::rlwe(self)
    }

    fn noise_scale(&self) -> u64 {
        dispatch!(self, p => p.noise_scale())
    }

    fn scale_message(&self, m: &DcrtPoly) -> HeResult<DcrtPoly> {
        dispatch!(self, p => p.scale_message(m))
    }

    fn key_gen<R: Rng + ?Sized>(&self, rng: &mut R) -> HeResult<KeyPair> {
        dispatch!(self, p => p.key_gen(rng))
    }

    fn encrypt<R: Rng + ?Sized>(
        &self,
        public_key: &PublicKey,
        plaintext: &Plaintext,
        rng: &mut R,
    ) -> HeResult<Ciphertext> {
        dispatch!(self, p => p.encrypt(public_key, plaintext, rng))
    }

    fn encrypt_with_secret_key<R: Rng + ?Sized>(
        &self,
        secret_key: &SecretKey,
        plaintext: &Plaintext,
        rng: &mut R,
    ) -> HeResult<Ciphertext> {
        dispatch!(self, p => p.encrypt_with_secret_key(secret_key, plaintext, rng))
    }

    fn decrypt_raw(&self, secret_key: &SecretKey, ciphertext: &Ciphertext) -> HeResult<Decrypted> {
        dispatch!(self, p => p.decrypt_raw(secret_key, ciphertext))
    }

    fn tensor(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Vec<DcrtPoly>> {
        dispatch!(self, p => p.tensor(a, b))
    }

    fn mod_reduce_in_place(&self, ciphertext: &mut Ciphertext) -> HeResult<()> {
        dispatch!(self, p => p.mod_reduce_in_place(ciphertext))
    }

    fn aligns_levels(&self) -> bool {
        dispatch!(self, p => p.aligns_levels())
    }
}
