//! Word-sized modular arithmetic shared by the ring and scheme layers.
//!
//! Every residue handled by the crate is a `u64` reduced into `[0, q)` for an
//! odd modulus `q < 2^62`. Products are formed in `u128` before reduction.
//! [`Barrett`] keeps the 128-bit Barrett constant `floor(2^128 / q)` used by
//! the CRT basis-extension loops, where a sum of many 128-bit products has to
//! be reduced once per coefficient.

#[inline]
pub fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let s = a + b;
    if s >= q { s - q } else { s }
}

#[inline]
pub fn sub_mod(a: u64, b: u64, q: u64) -> u64 {
    if a >= b { a - b } else { a + q - b }
}

#[inline]
pub fn neg_mod(a: u64, q: u64) -> u64 {
    if a == 0 { 0 } else { q - a }
}

#[inline]
pub fn mul_mod(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

/// Computes `base^exp mod q` via binary exponentiation.
pub fn pow_mod(mut base: u64, mut exp: u64, q: u64) -> u64 {
    if q == 1 {
        return 0;
    }
    let mut acc = 1u64;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, q);
        }
        base = mul_mod(base, base, q);
        exp >>= 1;
    }
    acc
}

/// Modular inverse through the extended Euclidean algorithm.
///
/// Returns `None` when `gcd(a, q) != 1`.
pub fn inv_mod(a: u64, q: u64) -> Option<u64> {
    if q <= 1 {
        return None;
    }
    let (mut old_r, mut r) = ((a % q) as i128, q as i128);
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let quotient = old_r / r;
        (old_r, r) = (r, old_r - quotient * r);
        (old_s, s) = (s, old_s - quotient * s);
    }
    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(q as i128) as u64)
}

/// Reduces a signed value into `[0, q)`.
#[inline]
pub fn reduce_signed(value: i64, q: u64) -> u64 {
    (value as i128).rem_euclid(q as i128) as u64
}

/// Maps a residue in `[0, q)` to its centred representative in `(-q/2, q/2]`.
#[inline]
pub fn centered(value: u64, q: u64) -> i64 {
    if value > q >> 1 {
        -((q - value) as i64)
    } else {
        value as i64
    }
}

/// Barrett reduction of 128-bit accumulators modulo a word-sized prime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrett {
    modulus: u64,
    mu: u128,
}

impl Barrett {
    /// `None` for moduli below 2.
    pub fn new(modulus: u64) -> Option<Self> {
        if modulus < 2 {
            return None;
        }
        // floor((2^128 - 1) / q) equals floor(2^128 / q) for every q that is
        // not a power of two.
        Some(Self {
            modulus,
            mu: u128::MAX / modulus as u128,
        })
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn mu(&self) -> u128 {
        self.mu
    }

    /// Reduces `x` modulo `q` using the precomputed constant.
    #[inline]
    pub fn reduce(&self, x: u128) -> u64 {
        let estimate = mul_high_u128(x, self.mu);
        let q = self.modulus as u128;
        let mut r = x.wrapping_sub(estimate.wrapping_mul(q));
        while r >= q {
            r -= q;
        }
        r as u64
    }

    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        self.reduce(a as u128 * b as u128)
    }
}

// High 128 bits of a 128 x 128 bit product.
#[inline]
fn mul_high_u128(a: u128, b: u128) -> u128 {
    const MASK: u128 = u64::MAX as u128;
    let (a_lo, a_hi) = (a & MASK, a >> 64);
    let (b_lo, b_hi) = (b & MASK, b >> 64);

    let lo_lo = a_lo * b_lo;
    let lo_hi = a_lo * b_hi;
    let hi_lo = a_hi * b_lo;
    let hi_hi = a_hi * b_hi;

    let middle = (lo_lo >> 64) + (lo_hi & MASK) + (hi_lo & MASK);
    hi_hi + (lo_hi >> 64) + (hi_lo >> 64) + (middle >> 64)
}
