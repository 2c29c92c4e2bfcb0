//! Discrete Gaussian over the integers centred at zero.
//!
//! Small deviations use Peikert's inversion over a one-sided cumulative table:
//! a uniform draw in `(-1/2, 1/2)` picks the sign, and its magnitude (minus the
//! half-mass at zero) is located in the table by binary search.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use super::{SamplerError, SamplerResult, SignedSampler};

/// Above this deviation the cumulative table is not built and samples come
/// from a rounded continuous normal.
pub const LARGE_STD_THRESHOLD: f64 = 300.0;

/// Tail cut-off: `sqrt(-2 ln(5e-32))`, about `2^-100` of mass outside.
fn tail_factor() -> f64 {
    (-2.0 * 5e-32f64.ln()).sqrt()
}

const REJECTION_LIMIT: usize = 10_000;

#[derive(Debug, Clone)]
pub struct DiscreteGaussian {
    std: f64,
    /// `cdf[x - 1] = a * sum_{1 <= y <= x} exp(-y^2 / 2 sigma^2)`
    cdf: Vec<f64>,
    /// Probability mass at zero.
    a: f64,
}

impl DiscreteGaussian {
    pub fn new(std: f64) -> SamplerResult<Self> {
        if !std.is_finite() || std <= 0.0 {
            return Err(SamplerError::InvalidParameter { name: "std", value: std });
        }
        if std.log2() > 59.0 {
            return Err(SamplerError::StdTooLarge { std });
        }
        if std >= LARGE_STD_THRESHOLD {
            debug!(std, "deviation above CDT threshold, using rounded normal");
            return Ok(Self {
                std,
                cdf: Vec::new(),
                a: 0.0,
            });
        }
        let fin = (std * tail_factor()).ceil() as usize;
        let variance = 2.0 * std * std;
        let mut cusum = 0.0;
        let mut cdf = Vec::with_capacity(fin);
        for x in 1..=fin {
            cusum += (-((x * x) as f64) / variance).exp();
            cdf.push(cusum);
        }
        let a = 1.0 / (2.0 * cusum + 1.0);
        for v in cdf.iter_mut() {
            *v *= a;
        }
        Ok(Self { std, cdf, a })
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    pub fn uses_table(&self) -> bool {
        !self.cdf.is_empty()
    }

    /// One-sided inversion; position `i` in the table is magnitude `i + 1`.
    fn find_in_table(&self, search: f64) -> SamplerResult<i64> {
        let idx = self.cdf.partition_point(|&v| v < search);
        if idx == self.cdf.len() {
            return Err(SamplerError::CdfLookup { draw: search });
        }
        Ok(idx as i64 + 1)
    }

    pub fn generate_int<R: Rng + ?Sized>(&self, rng: &mut R) -> SamplerResult<i64> {
        if !self.uses_table() {
            let normal = Normal::new(0.0, self.std).map_err(|_| SamplerError::InvalidParameter {
                name: "std",
                value: self.std,
            })?;
            return Ok(normal.sample(rng).round() as i64);
        }
        let seed = rng.random::<f64>() - 0.5;
        let tmp = seed.abs() - self.a / 2.0;
        if tmp <= 0.0 {
            return Ok(0);
        }
        let magnitude = self.find_in_table(tmp)?;
        Ok(if seed > 0.0 { magnitude } else { -magnitude })
    }

    /// Rejection sampling for an arbitrary centre over
    /// `[mean - log2(n) std, mean + log2(n) std]`, giving up after a fixed
    /// number of attempts.
    pub fn generate_integer_rejection<R: Rng + ?Sized>(
        mean: f64,
        std: f64,
        n: usize,
        rng: &mut R,
    ) -> SamplerResult<i64> {
        if !mean.is_finite() {
            return Err(SamplerError::InvalidParameter { name: "mean", value: mean });
        }
        if !std.is_finite() || std <= 0.0 {
            return Err(SamplerError::InvalidParameter { name: "std", value: std });
        }
        let spread = (n.max(2) as f64).log2() * std;
        let low = (mean - spread).floor() as i64;
        let high = (mean + spread).ceil() as i64;
        let sigma_factor = -1.0 / (2.0 * std * std);
        for _ in 0..REJECTION_LIMIT {
            let x = rng.random_range(low..=high);
            let dice = rng.random::<f64>();
            let dx = x as f64 - mean;
            if dice <= (sigma_factor * dx * dx).exp() {
                return Ok(x);
            }
        }
        Err(SamplerError::RetriesExhausted {
            attempts: REJECTION_LIMIT,
        })
    }
}

impl SignedSampler for DiscreteGaussian {
    fn sample_signed<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> SamplerResult<Vec<i64>> {
        (0..n).map(|_| self.generate_int(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn moments(samples: &[i64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
        let var = samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn cdt_sampler_matches_moments() {
        let sigma = 3.19;
        let dgg = DiscreteGaussian::new(sigma).unwrap();
        assert!(dgg.uses_table());
        let mut rng = ChaCha20Rng::seed_from_u64(2024);
        let samples = dgg.sample_signed(200_000, &mut rng).unwrap();
        let (mean, var) = moments(&samples);
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - sigma * sigma).abs() < 0.05 * sigma * sigma, "var {var}");
        assert!(samples.iter().all(|x| x.abs() < 60));
    }

    #[test]
    fn large_deviation_uses_rounded_normal() {
        let dgg = DiscreteGaussian::new(1000.0).unwrap();
        assert!(!dgg.uses_table());
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (mean, var) = moments(&dgg.sample_signed(50_000, &mut rng).unwrap());
        assert!(mean.abs() < 20.0);
        assert!((var.sqrt() - 1000.0).abs() < 30.0);
    }

    #[test]
    fn rejection_sampler_respects_centre() {
        let mut rng = ChaCha20Rng::seed_from_u64(77);
        let samples: Vec<i64> = (0..20_000)
            .map(|_| DiscreteGaussian::generate_integer_rejection(10.5, 4.0, 1024, &mut rng).unwrap())
            .collect();
        let (mean, var) = moments(&samples);
        assert!((mean - 10.5).abs() < 0.15, "mean {mean}");
        assert!((var - 16.0).abs() < 1.5, "var {var}");
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(
            DiscreteGaussian::new(0.0),
            Err(SamplerError::InvalidParameter { name: "std", .. })
        ));
        assert!(matches!(
            DiscreteGaussian::new(f64::NAN),
            Err(SamplerError::InvalidParameter { .. })
        ));
        assert!(matches!(
            DiscreteGaussian::new(2f64.powi(60)),
            Err(SamplerError::StdTooLarge { .. })
        ));
    }
}
