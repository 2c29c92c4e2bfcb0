//! Key material. Every key carries the tag of the secret it is bound to so
//! that operands from unrelated key sets are rejected instead of silently
//! producing garbage.

pub mod eval_key;
pub mod public_key;
pub mod secret_key;

pub use eval_key::EvalKey;
pub use public_key::PublicKey;
pub use secret_key::SecretKey;

/// Random identifier of a secret key.
pub type KeyTag = u64;

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl KeyPair {
    pub fn key_tag(&self) -> KeyTag {
        self.secret.key_tag()
    }
}
