use ndarray_rand::rand_distr::{Distribution, Normal, Uniform};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;

use super::{derive_seed, selected_features, FeatureScan, Split, SplitFinder, PARALLEL_MIN_CELLS};
use crate::data::{midpoint, DatasetView, FeatureSelection};
use crate::params::{RandomizedConfig, ThresholdSampling};

/// Split search over a random sample of features and thresholds.
///
/// The feature sample is drawn from `seed`; each sampled feature draws its
/// thresholds from a seed derived from `(seed, feature)`. Evaluation order
/// therefore has no effect on the outcome, and equal seeds on equal data
/// always pick the same split.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomizedSplitFinder {
    config: RandomizedConfig,
}

impl RandomizedSplitFinder {
    pub fn new(config: RandomizedConfig) -> Self {
        RandomizedSplitFinder { config }
    }

    pub fn config(&self) -> &RandomizedConfig {
        &self.config
    }

    /// Features considered for `seed`, ascending.
    pub fn sample_features(&self, candidates: &[usize], seed: u64) -> Vec<usize> {
        let k = self.config.max_features.resolve(candidates.len());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked: Vec<usize> = index::sample(&mut rng, candidates.len(), k)
            .into_iter()
            .map(|i| candidates[i])
            .collect();
        picked.sort_unstable();
        picked
    }

    fn sample_thresholds(&self, scan: &FeatureScan, rng: &mut StdRng) -> Vec<f64> {
        let Some((min, max)) = scan.range() else {
            return Vec::new();
        };
        if !(min < max) {
            return Vec::new();
        }
        // Draw in a halved space when `max - min` overflows; doubling back is exact.
        let scale = if (max - min).is_finite() { 1.0 } else { 0.5 };
        let (lo, hi) = (min * scale, max * scale);
        let n = self.config.n_thresholds;
        match self.config.thresholds {
            ThresholdSampling::Uniform => match Uniform::new(lo, hi) {
                Ok(uniform) => uniform
                    .sample_iter(rng)
                    .take(n)
                    .map(|t| t / scale)
                    .collect(),
                Err(_) => Vec::new(),
            },
            ThresholdSampling::TruncatedNormal => {
                let Ok(normal) = Normal::new(lo + (hi - lo) / 2.0, (hi - lo) / 3.0) else {
                    return Vec::new();
                };
                (0..n)
                    .map(|_| loop {
                        let t = normal.sample(&mut *rng);
                        if t >= lo && t < hi {
                            break t / scale;
                        }
                    })
                    .collect()
            }
            ThresholdSampling::Candidates => {
                let candidates: Vec<f64> = scan.boundaries().map(|(_, t)| t).collect();
                let amount = n.min(candidates.len());
                index::sample(rng, candidates.len(), amount)
                    .into_iter()
                    .map(|i| candidates[i])
                    .collect()
            }
            ThresholdSampling::Mean => vec![midpoint(min, max)],
            ThresholdSampling::Median => vec![scan.median()],
        }
    }

    /// Best of the sampled thresholds of one feature.
    pub fn best_for_feature(
        &self,
        data: &DatasetView<'_>,
        rows: &[usize],
        feature: usize,
        seed: u64,
    ) -> Option<Split> {
        let scan = FeatureScan::new(data, feature, rows);
        let mut rng = StdRng::seed_from_u64(derive_seed(seed, feature as u64));
        self.sample_thresholds(&scan, &mut rng)
            .into_iter()
            .filter_map(|threshold| {
                let gain = scan.gain_for_threshold(threshold)?;
                (gain > 0.0).then_some(Split {
                    feature,
                    threshold,
                    gain,
                })
            })
            .reduce(Split::prefer)
    }
}

impl SplitFinder for RandomizedSplitFinder {
    fn find_best_split(
        &self,
        data: &DatasetView<'_>,
        rows: &[usize],
        features: FeatureSelection<'_>,
        seed: u64,
    ) -> Option<Split> {
        if rows.len() < 2 {
            return None;
        }
        let candidates = selected_features(data, features);
        let picked = self.sample_features(&candidates, seed);
        if rows.len() * picked.len() >= PARALLEL_MIN_CELLS {
            picked
                .par_iter()
                .filter_map(|&f| self.best_for_feature(data, rows, f, seed))
                .reduce_with(Split::prefer)
        } else {
            picked
                .iter()
                .filter_map(|&f| self.best_for_feature(data, rows, f, seed))
                .reduce(Split::prefer)
        }
    }
}
