//! Generic discrete Gaussian sampler for arbitrary centres and large
//! deviations.
//!
//! A family of `2^log_base` base samplers with a fixed small deviation and
//! centres `i / 2^log_base` is built once. Wide samples come from a tree of
//! [`SamplerCombiner`]s that add integer multiples of two base draws, and the
//! final centred rounding walks the base-`2^log_base` digits of the centre
//! (`SampleC`) after a Bernoulli coin-flip rounding of its low bits.

use rand::Rng;
use tracing::{debug, instrument};

use super::{SamplerError, SamplerResult};

const MAX_TREE_DEPTH: usize = 64;
const PRECISION: u32 = 53;
const BERNOULLI_FLIPS: u32 = 23;
const MAX_LEVELS: usize = 4;
/// Knuth-Yao restarts allowed before a draw is abandoned.
const MAX_RESTARTS: usize = 1_000;
/// Bounds the DDG tree width to `2^21` nodes.
const MAX_LEADING_ZEROS: usize = 20;

/// Buffered stream of uniform bits over a caller-owned generator.
#[derive(Debug)]
pub struct BitGenerator<R> {
    rng: R,
    word: u32,
    remaining: u32,
}

impl<R: Rng> BitGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            word: 0,
            remaining: 0,
        }
    }

    pub fn next_bit(&mut self) -> bool {
        if self.remaining == 0 {
            self.word = self.rng.random();
            self.remaining = 32;
        }
        self.remaining -= 1;
        (self.word >> self.remaining) & 1 == 1
    }

    pub fn uniform_f64(&mut self) -> f64 {
        self.rng.random()
    }

    pub fn into_inner(self) -> R {
        self.rng
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSamplerKind {
    KnuthYao,
    Peikert,
}

/// A discrete Gaussian with fixed mean and deviation, immutable after
/// construction.
#[derive(Debug, Clone)]
pub struct BaseSampler {
    kind: BaseSamplerKind,
    /// Integer part of the mean; the table is built for the fractional part.
    integer_mean: i64,
    std: f64,
    fin: i64,
    /// Peikert: cumulative probabilities over `[-fin, fin]`.
    cdf: Vec<f64>,
    /// Knuth-Yao: `ddg[node][level - first_non_zero]`, `-1` internal node,
    /// `-2` unused, otherwise the row index of a terminal.
    ddg: Vec<Vec<i32>>,
    first_non_zero: usize,
    end_index: usize,
}

impl BaseSampler {
    pub fn new(mean: f64, std: f64, kind: BaseSamplerKind) -> SamplerResult<Self> {
        if !mean.is_finite() {
            return Err(SamplerError::InvalidParameter { name: "mean", value: mean });
        }
        if !std.is_finite() || std <= 0.0 {
            return Err(SamplerError::InvalidParameter { name: "std", value: std });
        }
        let fin = (std * (-2.0 * 1e-17f64.ln()).sqrt()).ceil() as i64;
        let integer_mean = if mean >= 0.0 { mean.floor() } else { mean.ceil() };
        let frac = mean - integer_mean;
        let mut sampler = Self {
            kind,
            integer_mean: integer_mean as i64,
            std,
            fin,
            cdf: Vec::new(),
            ddg: Vec::new(),
            first_non_zero: 0,
            end_index: 0,
        };
        let probs = sampler.probabilities(frac);
        match kind {
            BaseSamplerKind::Peikert => {
                let mut acc = 0.0;
                sampler.cdf = probs
                    .iter()
                    .map(|p| {
                        acc += p;
                        acc
                    })
                    .collect();
            }
            BaseSamplerKind::KnuthYao => sampler.build_ddg_tree(&probs)?,
        }
        Ok(sampler)
    }

    pub fn kind(&self) -> BaseSamplerKind {
        self.kind
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    /// Normalised probabilities of `-fin ..= fin` around `frac`.
    fn probabilities(&self, frac: f64) -> Vec<f64> {
        let two_var = 2.0 * self.std * self.std;
        let raw: Vec<f64> = (-self.fin..=self.fin)
            .map(|i| {
                let d = i as f64 - frac;
                (-d * d / two_var).exp()
            })
            .collect();
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|p| p / total).collect()
    }

    fn build_ddg_tree(&mut self, probs: &[f64]) -> SamplerResult<()> {
        let scale = 2f64.powi(64);
        let matrix: Vec<u64> = probs.iter().map(|&p| (p * scale) as u64).collect();
        let mut weights = [0i64; MAX_TREE_DEPTH];
        for &row in &matrix {
            for (j, w) in weights.iter_mut().enumerate() {
                *w += ((row >> (63 - j)) & 1) as i64;
            }
        }
        let Some(first) = weights.iter().position(|&w| w != 0) else {
            return Ok(());
        };
        if first > MAX_LEADING_ZEROS {
            return Err(SamplerError::InvalidParameter {
                name: "std",
                value: self.std,
            });
        }

        // Size the tree: internal node counts per level until they run out.
        let mut internal: i64 = 1 << first;
        let mut widest = internal;
        let mut end = first;
        for &w in &weights[first..] {
            internal *= 2;
            widest = widest.max(internal);
            end += 1;
            internal -= w;
            if internal <= 0 {
                break;
            }
        }

        let mut ddg = vec![vec![-2i32; end - first]; widest as usize];
        let mut internal: i64 = 1 << first;
        for level in first..end {
            let available = internal * 2;
            let terminals = weights[level].min(available);
            internal = available - terminals;
            for node in ddg.iter_mut().take(internal as usize) {
                node[level - first] = -1;
            }
            let rows = matrix
                .iter()
                .enumerate()
                .filter(|&(_, &row)| (row >> (63 - level)) & 1 == 1)
                .map(|(idx, _)| idx as i32)
                .take(terminals as usize);
            for (offset, row) in rows.enumerate() {
                ddg[internal as usize + offset][level - first] = row;
            }
        }
        self.ddg = ddg;
        self.first_non_zero = first;
        self.end_index = end;
        Ok(())
    }

    pub fn generate_integer<R: Rng>(&self, bits: &mut BitGenerator<R>) -> SamplerResult<i64> {
        match self.kind {
            BaseSamplerKind::Peikert => self.generate_peikert(bits),
            BaseSamplerKind::KnuthYao => self.generate_knuth_yao(bits),
        }
    }

    fn generate_peikert<R: Rng>(&self, bits: &mut BitGenerator<R>) -> SamplerResult<i64> {
        let draw = bits.uniform_f64();
        let idx = self.cdf.partition_point(|&v| v < draw);
        if idx == self.cdf.len() {
            return Err(SamplerError::CdfLookup { draw });
        }
        Ok(idx as i64 - self.fin + self.integer_mean)
    }

    fn generate_knuth_yao<R: Rng>(&self, bits: &mut BitGenerator<R>) -> SamplerResult<i64> {
        for _ in 0..MAX_RESTARTS {
            let mut node = 0usize;
            for level in 0..self.end_index {
                node = 2 * node + usize::from(bits.next_bit());
                if level < self.first_non_zero {
                    continue;
                }
                match self.ddg.get(node).map(|col| col[level - self.first_non_zero]) {
                    Some(-1) => continue,
                    Some(row) if row >= 0 => {
                        return Ok(row as i64 - self.fin + self.integer_mean);
                    }
                    _ => break,
                }
            }
        }
        Err(SamplerError::RetriesExhausted {
            attempts: MAX_RESTARTS,
        })
    }

    pub fn random_bit<R: Rng>(&self, bits: &mut BitGenerator<R>) -> bool {
        bits.next_bit()
    }
}

/// `x1 * s + x2 * s'` for two independent draws of the inner sampler.
#[derive(Debug, Clone)]
pub struct SamplerCombiner {
    inner: Box<Sampler>,
    x1: i64,
    x2: i64,
}

impl SamplerCombiner {
    pub fn new(inner: Sampler, x1: i64, x2: i64) -> Self {
        Self {
            inner: Box::new(inner),
            x1,
            x2,
        }
    }

    pub fn coefficients(&self) -> (i64, i64) {
        (self.x1, self.x2)
    }
}

#[derive(Debug, Clone)]
pub enum Sampler {
    Base(BaseSampler),
    Combiner(SamplerCombiner),
}

impl Sampler {
    pub fn generate_integer<R: Rng>(&self, bits: &mut BitGenerator<R>) -> SamplerResult<i64> {
        match self {
            Self::Base(base) => base.generate_integer(bits),
            Self::Combiner(c) => {
                let a = c.inner.generate_integer(bits)?;
                let b = c.inner.generate_integer(bits)?;
                Ok(c.x1 * a + c.x2 * b)
            }
        }
    }
}

/// Arbitrary-centre sampler assembled from `2^log_base` base samplers.
#[derive(Debug, Clone)]
pub struct GenericGaussian {
    base: Vec<BaseSampler>,
    wide: Sampler,
    wide_variance: f64,
    sampler_variance: f64,
    log_base: u32,
    k: u32,
    mask: u64,
}

impl GenericGaussian {
    /// `base[i]` must have centre `i / 2^log_base` and deviation `std`;
    /// `smoothing` is the smoothing parameter `eta` used to pick the combiner
    /// coefficients.
    #[instrument(skip(base), fields(samplers = base.len()))]
    pub fn new(base: Vec<BaseSampler>, std: f64, log_base: u32, smoothing: f64) -> SamplerResult<Self> {
        if log_base == 0 || log_base > 8 {
            return Err(SamplerError::InvalidParameter {
                name: "log_base",
                value: log_base as f64,
            });
        }
        if base.len() != 1 << log_base {
            return Err(SamplerError::InvalidParameter {
                name: "base samplers",
                value: base.len() as f64,
            });
        }
        if !smoothing.is_finite() || smoothing <= 0.0 {
            return Err(SamplerError::InvalidParameter {
                name: "smoothing",
                value: smoothing,
            });
        }
        let base_variance = std * std;
        let mut wide = Sampler::Base(base[0].clone());
        let mut wide_variance = base_variance;
        for _ in 1..MAX_LEVELS {
            let x1 = (wide_variance / (2.0 * smoothing * smoothing)).sqrt().floor() as i64;
            let x2 = (x1 - 1).max(1);
            wide = Sampler::Combiner(SamplerCombiner::new(wide, x1, x2));
            wide_variance *= (x1 * x1 + x2 * x2) as f64;
        }

        let k = (PRECISION - BERNOULLI_FLIPS).div_ceil(log_base);
        let ratio = 1.0 / (1u64 << (2 * log_base)) as f64;
        let mut sampler_variance = 1.0;
        let mut s = 1.0;
        for _ in 1..k {
            s *= ratio;
            sampler_variance += s;
        }
        sampler_variance *= base_variance;
        debug!(wide_variance, sampler_variance, k, "generic sampler ready");

        Ok(Self {
            base,
            wide,
            wide_variance,
            sampler_variance,
            log_base,
            k,
            mask: (1u64 << log_base) - 1,
        })
    }

    /// Builds the base family with Knuth-Yao or Peikert tables.
    pub fn with_base_std(
        std: f64,
        log_base: u32,
        smoothing: f64,
        kind: BaseSamplerKind,
    ) -> SamplerResult<Self> {
        let count = 1usize << log_base.min(8);
        let base = (0..count)
            .map(|i| BaseSampler::new(i as f64 / count as f64, std, kind))
            .collect::<SamplerResult<Vec<_>>>()?;
        Self::new(base, std, log_base, smoothing)
    }

    /// Smallest deviation the sampler can target.
    pub fn min_std(&self) -> f64 {
        self.sampler_variance.sqrt()
    }

    /// A draw from the base sampler centred at zero.
    pub fn generate_base<R: Rng>(&self, bits: &mut BitGenerator<R>) -> SamplerResult<i64> {
        self.base[0].generate_integer(bits)
    }

    /// `SampleZ`: a discrete Gaussian sample with the given centre and
    /// deviation.
    pub fn generate_integer<R: Rng>(
        &self,
        center: f64,
        std: f64,
        bits: &mut BitGenerator<R>,
    ) -> SamplerResult<i64> {
        if !center.is_finite() {
            return Err(SamplerError::InvalidParameter { name: "center", value: center });
        }
        let variance = std * std;
        if !variance.is_finite() || variance <= self.sampler_variance {
            return Err(SamplerError::InvalidParameter { name: "std", value: std });
        }
        let x = self.wide.generate_integer(bits)? as f64;
        let c = center + x * ((variance - self.sampler_variance) / self.wide_variance).sqrt();
        let ci = c.floor();
        Ok(ci as i64 + self.flip_and_round(c - ci, bits)?)
    }

    fn flip_and_round<R: Rng>(&self, center: f64, bits: &mut BitGenerator<R>) -> SamplerResult<i64> {
        let c = (center * (1u64 << PRECISION) as f64) as i64;
        let base_c = c >> BERNOULLI_FLIPS;
        for i in (0..BERNOULLI_FLIPS).rev() {
            let coin = i64::from(bits.next_bit());
            let bit = (c >> i) & 1;
            if coin > bit {
                return self.sample_c(base_c, bits);
            }
            if coin < bit {
                return self.sample_c(base_c + 1, bits);
            }
        }
        self.sample_c(base_c + 1, bits)
    }

    fn sample_c<R: Rng>(&self, center: i64, bits: &mut BitGenerator<R>) -> SamplerResult<i64> {
        let mut c = center;
        for _ in 0..self.k {
            let digit = (c as u64 & self.mask) as usize;
            let mut sample = self.base[digit].generate_integer(bits)?;
            if digit > 0 && c < 0 {
                sample -= 1;
            }
            for _ in 0..self.log_base {
                c /= 2;
            }
            c += sample;
        }
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn bits(seed: u64) -> BitGenerator<ChaCha20Rng> {
        BitGenerator::new(ChaCha20Rng::seed_from_u64(seed))
    }

    fn moments(samples: &[i64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
        let var = samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn knuth_yao_and_peikert_base_samplers_agree_on_moments() {
        for kind in [BaseSamplerKind::KnuthYao, BaseSamplerKind::Peikert] {
            let sampler = BaseSampler::new(0.0, 4.0, kind).unwrap();
            let mut bg = bits(11);
            let samples: Vec<i64> = (0..50_000)
                .map(|_| sampler.generate_integer(&mut bg).unwrap())
                .collect();
            let (mean, var) = moments(&samples);
            assert!(mean.abs() < 0.1, "{kind:?} mean {mean}");
            assert!((var - 16.0).abs() < 0.8, "{kind:?} var {var}");
        }
    }

    #[test]
    fn base_sampler_keeps_integer_part_of_mean() {
        let sampler = BaseSampler::new(-7.25, 2.0, BaseSamplerKind::KnuthYao).unwrap();
        let mut bg = bits(3);
        let samples: Vec<i64> = (0..20_000)
            .map(|_| sampler.generate_integer(&mut bg).unwrap())
            .collect();
        let (mean, _) = moments(&samples);
        assert!((mean - (-7.0 - 0.25)).abs() < 0.1, "mean {mean}");
    }

    #[test]
    fn combiner_scales_variance() {
        let base = BaseSampler::new(0.0, 3.0, BaseSamplerKind::Peikert).unwrap();
        let combined = Sampler::Combiner(SamplerCombiner::new(Sampler::Base(base), 3, 2));
        let mut bg = bits(5);
        let samples: Vec<i64> = (0..40_000)
            .map(|_| combined.generate_integer(&mut bg).unwrap())
            .collect();
        let (_, var) = moments(&samples);
        let expected = 13.0 * 9.0;
        assert!((var - expected).abs() < 0.06 * expected, "var {var}");
    }

    #[test]
    fn generic_sampler_hits_target_distribution() {
        let generic = GenericGaussian::with_base_std(34.0, 1, 6.0, BaseSamplerKind::KnuthYao).unwrap();
        let target = 1000.0;
        let center = 12.3;
        let mut bg = bits(2024);
        let samples: Vec<i64> = (0..10_000)
            .map(|_| generic.generate_integer(center, target, &mut bg).unwrap())
            .collect();
        let (mean, var) = moments(&samples);
        assert!((mean - center).abs() < 40.0, "mean {mean}");
        assert!((var.sqrt() - target).abs() < 0.05 * target, "std {}", var.sqrt());
    }

    #[test]
    fn generic_sampler_rejects_too_small_deviation() {
        let generic = GenericGaussian::with_base_std(34.0, 1, 6.0, BaseSamplerKind::Peikert).unwrap();
        let mut bg = bits(1);
        assert!(generic.min_std() > 34.0);
        assert!(matches!(
            generic.generate_integer(0.0, 10.0, &mut bg),
            Err(SamplerError::InvalidParameter { name: "std", .. })
        ));
    }

    #[test]
    fn base_family_size_is_checked() {
        let one = vec![BaseSampler::new(0.0, 4.0, BaseSamplerKind::Peikert).unwrap()];
        assert!(matches!(
            GenericGaussian::new(one, 4.0, 2, 6.0),
            Err(SamplerError::InvalidParameter { name: "base samplers", .. })
        ));
    }
}
