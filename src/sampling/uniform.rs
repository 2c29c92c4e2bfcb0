use std::sync::Arc;

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use super::{SamplerError, SamplerResult};
use crate::rings::{DcrtParams, DcrtPoly, Format};

/// Uniform residues in `[0, q)`.
///
/// Drawing every tower independently gives a uniform element of `Z_Q` by the
/// CRT, and a uniform element stays uniform under the NTT, so the format is
/// only a tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscreteUniform;

impl DiscreteUniform {
    pub fn sample_vector<R: Rng + ?Sized>(
        &self,
        n: usize,
        modulus: u64,
        rng: &mut R,
    ) -> SamplerResult<Vec<u64>> {
        let distribution = Uniform::new(0, modulus).map_err(|_| SamplerError::InvalidParameter {
            name: "modulus",
            value: modulus as f64,
        })?;
        Ok((0..n).map(|_| distribution.sample(rng)).collect())
    }

    pub fn sample_poly<R: Rng + ?Sized>(
        &self,
        params: &Arc<DcrtParams>,
        format: Format,
        rng: &mut R,
    ) -> SamplerResult<DcrtPoly> {
        let values = params
            .moduli()
            .into_iter()
            .map(|q| self.sample_vector(params.ring_dim(), q, rng))
            .collect::<SamplerResult<Vec<_>>>()?;
        Ok(DcrtPoly::from_tower_values(params.clone(), values, format)?)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::rings::NttEngine;

    #[test]
    fn residues_stay_in_range_and_cover_buckets() {
        const MODULUS: u64 = 8;
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let values = DiscreteUniform.sample_vector(8192, MODULUS, &mut rng).unwrap();
        let mut buckets = [0usize; MODULUS as usize];
        for &v in &values {
            buckets[v as usize] += 1;
        }
        let expected = 8192.0 / MODULUS as f64;
        for &count in &buckets {
            assert!((count as f64 - expected).abs() <= expected * 0.3);
        }
    }

    #[test]
    fn zero_modulus_is_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        assert!(matches!(
            DiscreteUniform.sample_vector(4, 0, &mut rng),
            Err(SamplerError::InvalidParameter { name: "modulus", .. })
        ));
    }

    #[test]
    fn poly_towers_use_their_own_modulus() {
        let engine = NttEngine::new();
        let params = Arc::new(DcrtParams::from_moduli(16, &[17, 97], &engine).unwrap());
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let poly = DiscreteUniform
            .sample_poly(&params, Format::Evaluation, &mut rng)
            .unwrap();
        assert_eq!(poly.format(), Format::Evaluation);
        assert!(poly.tower(0).values().iter().all(|&v| v < 17));
        assert!(poly.tower(1).values().iter().all(|&v| v < 97));
    }
}
