use rand::Rng;

use super::{SamplerResult, SignedSampler};

/// Coefficients in `{-1, 0, 1}`.
///
/// With `hamming_weight == 0` every coefficient is uniform over the three
/// values. Otherwise exactly `hamming_weight` coefficients are non-zero and the
/// number of `+1` entries is within one of half of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TernaryUniform {
    hamming_weight: usize,
}

impl TernaryUniform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hamming_weight(hamming_weight: usize) -> Self {
        Self { hamming_weight }
    }

    pub fn hamming_weight(&self) -> usize {
        self.hamming_weight
    }

    fn sparse<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<i64> {
        let h = self.hamming_weight.min(n);
        let half = h / 2;
        loop {
            let mut out = vec![0i64; n];
            let mut plus = 0usize;
            let mut placed = 0usize;
            while placed < h {
                let idx = rng.random_range(0..n);
                if out[idx] == 0 {
                    if rng.random_bool(0.5) {
                        out[idx] = 1;
                        plus += 1;
                    } else {
                        out[idx] = -1;
                    }
                    placed += 1;
                }
            }
            if plus + 1 >= half && plus <= half + 1 {
                return out;
            }
        }
    }
}

impl SignedSampler for TernaryUniform {
    fn sample_signed<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> SamplerResult<Vec<i64>> {
        if self.hamming_weight == 0 {
            return Ok((0..n).map(|_| rng.random_range(-1i64..=1)).collect());
        }
        Ok(self.sparse(n, rng))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn dense_ternary_hits_all_three_values() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let v = TernaryUniform::new().sample_signed(3000, &mut rng).unwrap();
        for target in [-1i64, 0, 1] {
            let count = v.iter().filter(|&&x| x == target).count();
            assert!((800..1200).contains(&count), "{target}: {count}");
        }
    }

    #[test]
    fn sparse_ternary_has_exact_weight_and_balanced_signs() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let sampler = TernaryUniform::with_hamming_weight(64);
        for _ in 0..8 {
            let v = sampler.sample_signed(1024, &mut rng).unwrap();
            assert_eq!(v.iter().filter(|&&x| x != 0).count(), 64);
            let plus = v.iter().filter(|&&x| x == 1).count();
            assert!((31..=33).contains(&plus));
        }
    }

    #[test]
    fn weight_is_capped_by_length() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let v = TernaryUniform::with_hamming_weight(50)
            .sample_signed(8, &mut rng)
            .unwrap();
        assert!(v.iter().all(|&x| x != 0));
    }
}
