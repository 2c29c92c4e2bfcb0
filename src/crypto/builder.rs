//! Chained builders producing a ready [`CryptoContext`] for each scheme.
//!
//! Unset knobs fall back to the library defaults: 128-bit classical
//! security with the ring dimension chosen from the security tables, ternary
//! secrets, no digit decomposition and relinearization keys up to `s^2`.

use tracing::debug;

use super::context::CryptoContext;
use super::errors::HeResult;
use super::params::bgvrns::{BgvChainRequest, default_dcrt_bits};
use super::params::ckks::{CkksChainRequest, DEFAULT_FIRST_MOD_BITS, DEFAULT_SCALE_BITS};
use super::params::{
    BfvRnsBParams, BfvRnsParams, BfvWorkload, BgvRnsParams, CkksParams, DEFAULT_BFV_SIGMA, DEFAULT_SIGMA, Mode,
    RlweSettings, SchemeParams, SecurityLevel,
};

pub const DEFAULT_PLAINTEXT_MODULUS: u64 = 65537;
pub const DEFAULT_BFV_DCRT_BITS: u32 = 60;

/// Knobs every RLWE scheme shares.
#[derive(Debug, Clone, Default)]
struct CommonKnobs {
    sigma: Option<f64>,
    security_level: Option<SecurityLevel>,
    relin_window: Option<u32>,
    mode: Option<Mode>,
    max_depth: Option<usize>,
    batch_size: Option<usize>,
    ring_dim: Option<usize>,
}

impl CommonKnobs {
    fn settings(&self, default_sigma: f64) -> RlweSettings {
        let defaults = RlweSettings::default();
        RlweSettings {
            sigma: self.sigma.unwrap_or(default_sigma),
            security_level: self.security_level.unwrap_or(defaults.security_level),
            relin_window: self.relin_window.unwrap_or(defaults.relin_window),
            mode: self.mode.unwrap_or(defaults.mode),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            ..defaults
        }
    }
}

macro_rules! common_setters {
    () => {
        /// Standard deviation of the error distribution.
        pub fn sigma(mut self, sigma: f64) -> Self {
            self.common.sigma = Some(sigma);
            self
        }

        pub fn security_level(mut self, level: SecurityLevel) -> Self {
            self.common.security_level = Some(level);
            self
        }

        /// Digit width in bits for key switching; 0 disables digit
        /// decomposition.
        pub fn relin_window(mut self, bits: u32) -> Self {
            self.common.relin_window = Some(bits);
            self
        }

        pub fn mode(mut self, mode: Mode) -> Self {
            self.common.mode = Some(mode);
            self
        }

        /// Highest secret power the relinearization keys cover.
        pub fn max_depth(mut self, depth: usize) -> Self {
            self.common.max_depth = Some(depth);
            self
        }

        pub fn batch_size(mut self, slots: usize) -> Self {
            self.common.batch_size = Some(slots);
            self
        }

        /// Requested ring dimension; must meet the minimum of the security level.
        pub fn ring_dim(mut self, n: usize) -> Self {
            self.common.ring_dim = Some(n);
            self
        }
    };
}

macro_rules! bfv_builder {
    ($(#[$doc:meta])* $name:ident, $params:ident, $variant:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            common: CommonKnobs,
            plaintext_modulus: Option<u64>,
            workload: BfvWorkload,
            dcrt_bits: Option<u32>,
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    common: CommonKnobs::default(),
                    plaintext_modulus: None,
                    workload: BfvWorkload::default(),
                    dcrt_bits: None,
                }
            }

            common_setters!();

            pub fn plaintext_modulus(mut self, t: u64) -> Self {
                self.plaintext_modulus = Some(t);
                self
            }

            pub fn eval_adds(mut self, count: usize) -> Self {
                self.workload.eval_adds = count;
                self
            }

            pub fn eval_mults(mut self, depth: usize) -> Self {
                self.workload.eval_mults = depth;
                self
            }

            pub fn key_switches(mut self, count: usize) -> Self {
                self.workload.key_switches = count;
                self
            }

            /// Bit size of each CRT modulus.
            pub fn dcrt_bits(mut self, bits: u32) -> Self {
                self.dcrt_bits = Some(bits);
                self
            }

            pub fn build(self) -> HeResult<CryptoContext> {
                let t = self.plaintext_modulus.unwrap_or(DEFAULT_PLAINTEXT_MODULUS);
                let dcrt_bits = self.dcrt_bits.unwrap_or(DEFAULT_BFV_DCRT_BITS);
                debug!(t, dcrt_bits, workload = ?self.workload, scheme = stringify!($variant), "building context");
                let params = $params::generate(
                    self.common.settings(DEFAULT_BFV_SIGMA),
                    t,
                    self.workload,
                    dcrt_bits,
                    self.common.ring_dim.unwrap_or(0),
                )?;
                CryptoContext::new(SchemeParams::$variant(params))
            }
        }
    };
}

bfv_builder!(
    /// BFVrns (HPS rounding) sized for a workload of additions,
    /// multiplications and key switches.
    BfvRnsBuilder,
    BfvRnsParams,
    BfvRns
);

bfv_builder!(
    /// BFVrnsB: the same parameter search with BEHZ base conversions.
    BfvRnsBBuilder,
    BfvRnsBParams,
    BfvRnsB
);

/// BGV over a chain of `depth + 1` moduli, each `1 mod t`.
#[derive(Debug, Clone)]
pub struct BgvRnsBuilder {
    common: CommonKnobs,
    plaintext_modulus: Option<u64>,
    towers: Option<usize>,
    first_mod_bits: Option<u32>,
    dcrt_bits: Option<u32>,
}

impl Default for BgvRnsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BgvRnsBuilder {
    pub fn new() -> Self {
        Self {
            common: CommonKnobs::default(),
            plaintext_modulus: None,
            towers: None,
            first_mod_bits: None,
            dcrt_bits: None,
        }
    }

    common_setters!();

    pub fn plaintext_modulus(mut self, t: u64) -> Self {
        self.plaintext_modulus = Some(t);
        self
    }

    /// Number of multiplications to support; the chain has one more tower.
    pub fn multiplicative_depth(mut self, depth: usize) -> Self {
        self.towers = Some(depth + 1);
        self
    }

    pub fn first_mod_bits(mut self, bits: u32) -> Self {
        self.first_mod_bits = Some(bits);
        self
    }

    pub fn dcrt_bits(mut self, bits: u32) -> Self {
        self.dcrt_bits = Some(bits);
        self
    }

    pub fn build(self) -> HeResult<CryptoContext> {
        let plaintext_modulus = self.plaintext_modulus.unwrap_or(DEFAULT_PLAINTEXT_MODULUS);
        let request = BgvChainRequest {
            plaintext_modulus,
            towers: self.towers.unwrap_or(DEFAULT_TOWERS),
            first_mod_bits: self.first_mod_bits.unwrap_or(DEFAULT_FIRST_MOD_BITS),
            dcrt_bits: self.dcrt_bits.unwrap_or_else(|| default_dcrt_bits(plaintext_modulus)),
            ring_dim: self.common.ring_dim.unwrap_or(0),
        };
        debug!(?request, scheme = "BgvRns", "building context");
        let params = BgvRnsParams::generate(self.common.settings(DEFAULT_SIGMA), &request)?;
        CryptoContext::new(SchemeParams::BgvRns(params))
    }
}

/// Chain length used when no depth is requested: one multiplication.
const DEFAULT_TOWERS: usize = 2;

/// CKKS over a first modulus plus `depth` scaling primes near
/// `2^scale_bits`.
#[derive(Debug, Clone)]
pub struct CkksBuilder {
    common: CommonKnobs,
    towers: Option<usize>,
    scale_bits: Option<u32>,
    first_mod_bits: Option<u32>,
}

impl Default for CkksBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CkksBuilder {
    pub fn new() -> Self {
        Self {
            common: CommonKnobs::default(),
            towers: None,
            scale_bits: None,
            first_mod_bits: None,
        }
    }

    common_setters!();

    pub fn multiplicative_depth(mut self, depth: usize) -> Self {
        self.towers = Some(depth + 1);
        self
    }

    pub fn scale_bits(mut self, bits: u32) -> Self {
        self.scale_bits = Some(bits);
        self
    }

    pub fn first_mod_bits(mut self, bits: u32) -> Self {
        self.first_mod_bits = Some(bits);
        self
    }

    pub fn build(self) -> HeResult<CryptoContext> {
        let request = CkksChainRequest {
            towers: self.towers.unwrap_or(DEFAULT_TOWERS),
            scale_bits: self.scale_bits.unwrap_or(DEFAULT_SCALE_BITS),
            first_mod_bits: self.first_mod_bits.unwrap_or(DEFAULT_FIRST_MOD_BITS),
            ring_dim: self.common.ring_dim.unwrap_or(0),
        };
        debug!(?request, scheme = "Ckks", "building context");
        let params = CkksParams::generate(self.common.settings(DEFAULT_SIGMA), &request)?;
        CryptoContext::new(SchemeParams::Ckks(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::errors::ErrorKind;
    use crate::crypto::params::SchemeKind;

    #[test]
    fn defaults_fill_unset_knobs() {
        let cc = CkksBuilder::new()
            .security_level(SecurityLevel::NotSet)
            .ring_dim(64)
            .multiplicative_depth(2)
            .scale_bits(40)
            .build()
            .unwrap();
        assert_eq!(cc.scheme(), SchemeKind::Ckks);
        assert_eq!(cc.max_level(), 3);
        assert_eq!(cc.batch_size(), 32);
        assert_eq!(cc.rlwe().settings().sigma, DEFAULT_SIGMA);

        let cc = BfvRnsBuilder::new()
            .security_level(SecurityLevel::NotSet)
            .ring_dim(64)
            .build()
            .unwrap();
        assert_eq!(cc.plaintext_modulus(), DEFAULT_PLAINTEXT_MODULUS);
        assert_eq!(cc.rlwe().settings().sigma, DEFAULT_BFV_SIGMA);
    }

    #[test]
    fn bfv_workload_sizes_the_chain() {
        let additive = BfvRnsBuilder::new()
            .security_level(SecurityLevel::NotSet)
            .ring_dim(64)
            .build()
            .unwrap();
        let workload = BfvWorkload {
            eval_mults: 2,
            ..BfvWorkload::default()
        };
        let deeper = BfvRnsParams::generate(
            RlweSettings {
                security_level: SecurityLevel::NotSet,
                ..RlweSettings::default()
            },
            DEFAULT_PLAINTEXT_MODULUS,
            workload,
            DEFAULT_BFV_DCRT_BITS,
            64,
        )
        .unwrap();
        assert!(deeper.rlwe().element_params().len() > additive.max_level());
    }

    #[test]
    fn unsecured_builds_need_a_ring_dimension() {
        let err = BgvRnsBuilder::new()
            .security_level(SecurityLevel::NotSet)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
