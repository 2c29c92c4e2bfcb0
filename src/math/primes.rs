//! Prime search for NTT-friendly CRT moduli.
//!
//! Primality uses deterministic Miller-Rabin: `n - 1` is written as `d * 2^r`
//! and each fixed base must either hit `1` / `n - 1` directly or reach
//! `n - 1` by repeated squaring. With the twelve bases below this is exact
//! for every `u64`.
//!
//! The searches step in multiples of the cyclotomic order `m`, so every
//! candidate already satisfies `q = 1 (mod m)` and `Z_q` contains a primitive
//! `m`-th root of unity.
//! Reference:
//! https://en.wikipedia.org/wiki/Miller%E2%80%93Rabin_primality_test

use super::modular::{mul_mod, pow_mod};

// Deterministic for all n < 318,665,857,834,031,151,167,461.
// Source: https://miller-rabin.appspot.com/
const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Returns `(odd_part, power_of_two)` such that `n = odd_part * 2^power_of_two`.
fn decompose(n: u64) -> (u64, u32) {
    assert!(n > 0, "decompose: n must be positive");
    (n >> n.trailing_zeros(), n.trailing_zeros())
}

/// Returns `true` if `n` is prime using deterministic Miller-Rabin on `u64`.
pub fn is_prime(n: u64) -> bool {
    match n {
        0 | 1 => return false,
        2 | 3 => return true,
        _ if n & 1 == 0 => return false,
        _ => {}
    }

    let (d, r) = decompose(n - 1);
    'bases: for &a in MILLER_RABIN_BASES.iter() {
        if a >= n {
            continue;
        }
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'bases;
            }
        }
        return false;
    }
    true
}

/// Slow-but-clear reference test using `6k +/- 1` trial division.
pub fn is_prime_reference(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 || n == 3 {
        return true;
    }
    if n.is_multiple_of(2) || n.is_multiple_of(3) {
        return false;
    }
    let mut i = 5u64;
    while i.saturating_mul(i) <= n {
        if n.is_multiple_of(i) || n.is_multiple_of(i + 2) {
            return false;
        }
        i += 6;
    }
    true
}

/// `true` when `q` is prime and `q = 1 (mod m)`.
#[inline]
pub fn is_ntt_friendly_prime(q: u64, m: u64) -> bool {
    m > 0 && is_prime(q) && q % m == 1
}

/// Smallest prime `q > 2^bits` with `q = 1 (mod m)`.
///
/// Returns `None` when `bits >= 63` or the search leaves the `u64` range.
pub fn first_prime(bits: u32, m: u64) -> Option<u64> {
    if bits >= 63 || m == 0 {
        return None;
    }
    let r = 1u64 << bits;
    let candidate = r.checked_add(m - r % m)?.checked_add(1)?;
    if is_prime(candidate) {
        Some(candidate)
    } else {
        next_prime(candidate, m)
    }
}

/// Next prime above `q` in the progression `q + k*m`.
pub fn next_prime(q: u64, m: u64) -> Option<u64> {
    let mut candidate = q.checked_add(m)?;
    while !is_prime(candidate) {
        candidate = candidate.checked_add(m)?;
    }
    Some(candidate)
}

/// Previous prime below `q` in the progression `q - k*m`.
pub fn previous_prime(q: u64, m: u64) -> Option<u64> {
    let mut candidate = q.checked_sub(m)?;
    while !is_prime(candidate) {
        candidate = candidate.checked_sub(m)?;
        if candidate < 2 {
            return None;
        }
    }
    Some(candidate)
}

/// Distinct prime factors by trial division.
pub fn distinct_prime_factors(mut n: u64) -> Vec<u64> {
    let mut factors = Vec::new();
    let mut p = 2u64;
    while p.saturating_mul(p) <= n {
        if n.is_multiple_of(p) {
            factors.push(p);
            while n.is_multiple_of(p) {
                n /= p;
            }
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Smallest generator of the multiplicative group `Z_q^*`.
pub fn find_generator(q: u64) -> Option<u64> {
    if !is_prime(q) {
        return None;
    }
    if q == 2 {
        return Some(1);
    }
    let factors = distinct_prime_factors(q - 1);
    (2..q).find(|&g| factors.iter().all(|&f| pow_mod(g, (q - 1) / f, q) != 1))
}

/// Primitive `m`-th root of unity modulo the prime `q`.
///
/// Among all primitive roots the smallest one is returned so the choice is
/// reproducible across runs.
pub fn root_of_unity(m: u64, q: u64) -> Option<u64> {
    if m == 0 || q < 2 || (q - 1) % m != 0 {
        return None;
    }
    let generator = find_generator(q)?;
    let root = pow_mod(generator, (q - 1) / m, q);
    if m.is_power_of_two() {
        // The primitive m-th roots are exactly the odd powers of `root`.
        let square = mul_mod(root, root, q);
        let mut current = root;
        let mut best = root;
        for _ in 0..m / 2 {
            best = best.min(current);
            current = mul_mod(current, square, q);
        }
        Some(best)
    } else {
        Some(root)
    }
}

/// `true` when `root` has exact multiplicative order `m` modulo `q`.
pub fn is_primitive_root_of_unity(root: u64, m: u64, q: u64) -> bool {
    if pow_mod(root, m, q) != 1 {
        return false;
    }
    distinct_prime_factors(m)
        .iter()
        .all(|&f| pow_mod(root, m / f, q) != 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_SMALL_PRIMES: [u64; 8] = [2, 3, 5, 7, 11, 13, 17, 19];
    const KNOWN_SMALL_COMPOSITES: [u64; 10] = [0, 1, 4, 6, 8, 9, 10, 12, 15, 16];

    #[test]
    fn test_is_prime_basic() {
        for &prime in &KNOWN_SMALL_PRIMES {
            assert!(is_prime(prime));
            assert!(is_prime_reference(prime));
        }
        for &composite in &KNOWN_SMALL_COMPOSITES {
            assert!(!is_prime(composite));
            assert!(!is_prime_reference(composite));
        }
    }

    #[test]
    fn decompose_splits_power_of_two_factor() {
        assert_eq!(decompose(24), (3, 3));
        assert_eq!(decompose(40), (5, 3));
        assert_eq!(decompose(1), (1, 0));
    }

    #[test]
    #[should_panic(expected = "decompose: n must be positive")]
    fn decompose_panics_on_zero() {
        let _ = decompose(0);
    }

    #[test]
    fn test_is_prime_tricky_composites() {
        // Carmichael numbers and strong pseudoprimes for small base sets.
        let tricky = [561u64, 1_105, 1_729, 3_215_031_751];
        for &n in &tricky {
            assert!(!is_prime(n), "expected composite: {n}");
        }
    }

    #[test]
    fn test_is_prime_near_u64_limit() {
        assert!(!is_prime(u64::MAX));
        assert!(is_prime(18_446_744_073_709_551_557));
    }

    #[test]
    fn miller_rabin_matches_reference_on_selected_ranges() {
        let ranges: [(u64, u64); 4] = [
            (2, 14),
            (90, 114),
            (10_000, 10_024),
            (1_000_000, 1_000_024),
        ];
        for (start, end) in ranges {
            for n in start..=end {
                assert_eq!(is_prime(n), is_prime_reference(n), "mismatch at {n}");
            }
        }
    }

    #[test]
    fn first_prime_is_ntt_friendly_and_above_bound() {
        let q = first_prime(30, 2048).unwrap();
        assert_eq!(q, 1_073_750_017);
        assert!(is_ntt_friendly_prime(q, 2048));
        assert!(first_prime(63, 2048).is_none());
    }

    #[test]
    fn prime_walk_stays_in_progression() {
        let m = 2048;
        let q = first_prime(40, m).unwrap();
        let below = previous_prime(q, m).unwrap();
        let above = next_prime(q, m).unwrap();
        assert!(below < q && q < above);
        assert!(is_ntt_friendly_prime(below, m));
        assert!(is_ntt_friendly_prime(above, m));
        assert_eq!(previous_prime(m + 1, m), None);
    }

    #[test]
    fn root_of_unity_has_exact_order() {
        for &(m, q) in &[(16u64, 17u64), (2048, 12289), (8, 65537)] {
            let root = root_of_unity(m, q).unwrap();
            assert!(is_primitive_root_of_unity(root, m, q));
        }
        assert_eq!(root_of_unity(16, 19), None);
        assert_eq!(find_generator(65537), Some(3));
    }
}
