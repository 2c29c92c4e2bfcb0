//! Residue-number-system lattice homomorphic encryption: BFV (with HPS or
//! BEHZ rounding), BGV and CKKS over double-CRT polynomial rings.
//!
//! ```no_run
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//! use toy_rns_he::{BfvRnsBuilder, HeResult};
//!
//! fn main() -> HeResult<()> {
//!     let mut rng = ChaCha20Rng::seed_from_u64(7);
//!     let mut cc = BfvRnsBuilder::new().plaintext_modulus(65537).eval_mults(1).build()?;
//!     let keys = cc.key_gen(&mut rng)?;
//!     cc.eval_mult_key_gen(&keys.secret, &mut rng)?;
//!     let a = cc.encrypt(&keys.public, &cc.make_packed_plaintext(&[1, 2, 3])?, &mut rng)?;
//!     let b = cc.encrypt(&keys.public, &cc.make_packed_plaintext(&[4, 5, 6])?, &mut rng)?;
//!     let mut out = cc.decrypt(&keys.secret, &cc.eval_mult_and_relinearize(&a, &b)?)?;
//!     out.set_length(3);
//!     assert_eq!(out.packed_value()?, &[4, 10, 18]);
//!     Ok(())
//! }
//! ```

pub mod crypto;
pub mod encoding;
pub mod keys;
pub mod math;
pub mod rings;
pub mod sampling;

pub use crypto::{
    BfvRnsBBuilder, BfvRnsBuilder, BgvRnsBuilder, Ciphertext, CkksBuilder, CryptoContext, ErrorKind, HeError,
    HeResult, Plaintext, SchemeKind, SecurityLevel,
};
pub use encoding::EncodingKind;
pub use keys::{EvalKey, KeyPair, PublicKey, SecretKey};
pub use rings::{DcrtParams, DcrtPoly, Format};
