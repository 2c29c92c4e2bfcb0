//! The scheme layer: parameters, key-dependent operations of BFVrns,
//! BFVrnsB, BGVrns and CKKS, and the [`CryptoContext`] façade over them.

pub mod builder;
pub mod context;
pub mod errors;
pub mod params;
pub mod scheme;
pub mod serialize;
pub mod types;

pub use builder::{BfvRnsBBuilder, BfvRnsBuilder, BgvRnsBuilder, CkksBuilder};
pub use context::CryptoContext;
pub use errors::{ErrorKind, HeError, HeResult};
pub use params::{Mode, SchemeKind, SchemeParams, SecurityLevel};
pub use scheme::SchemeOps;
pub use serialize::{LoadOptions, Versioned};
pub use types::{Ciphertext, Plaintext};
