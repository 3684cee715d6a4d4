//! Best-split search over a row subset.
//!
//! Two strategies implement [`SplitFinder`]: [`GreedySplitFinder`] scans every
//! midpoint of every feature, [`RandomizedSplitFinder`] samples features and
//! thresholds from an explicit seed. Both score candidates with the same
//! variance-reduction gain and prefer, on equal gain, the smaller feature
//! index and then the smaller threshold, so the chosen split does not depend
//! on the order in which candidates are evaluated.

pub mod greedy;
pub mod random;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{midpoint, DatasetView, FeatureSelection};
use crate::params::SplitStrategy;

pub use greedy::GreedySplitFinder;
pub use random::RandomizedSplitFinder;

/// Below this many `rows × features` cells the split search stays on the
/// calling thread.
pub(crate) const PARALLEL_MIN_CELLS: usize = 16_384;

/// A chosen split: rows with `x[feature] <= threshold` go left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub feature: usize,
    pub threshold: f64,
    /// Reduction of the sum of squared deviations achieved on the training rows.
    pub gain: f64,
}

impl Split {
    #[inline]
    pub fn goes_left(&self, value: f64) -> bool {
        value <= self.threshold
    }

    /// Higher gain wins; ties go to the smaller feature, then the smaller threshold.
    pub fn is_better_than(&self, other: &Split) -> bool {
        if self.gain != other.gain {
            return self.gain > other.gain;
        }
        if self.feature != other.feature {
            return self.feature < other.feature;
        }
        self.threshold < other.threshold
    }

    pub(crate) fn prefer(a: Split, b: Split) -> Split {
        if b.is_better_than(&a) {
            b
        } else {
            a
        }
    }
}

/// Strategy capability: find the best split of `rows` over `features`.
///
/// Returns `None` when no candidate has a strictly positive gain; the caller
/// then emits a leaf. `seed` drives any randomness; implementations that do
/// not sample ignore it.
pub trait SplitFinder: Send + Sync {
    fn find_best_split(
        &self,
        data: &DatasetView<'_>,
        rows: &[usize],
        features: FeatureSelection<'_>,
        seed: u64,
    ) -> Option<Split>;
}

/// Instantiate the finder a strategy describes.
pub fn finder_for(strategy: &SplitStrategy) -> Box<dyn SplitFinder> {
    match strategy {
        SplitStrategy::Greedy => Box::new(GreedySplitFinder),
        SplitStrategy::Randomized(config) => Box::new(RandomizedSplitFinder::new(*config)),
    }
}

pub(crate) fn selected_features(data: &DatasetView<'_>, features: FeatureSelection<'_>) -> Vec<usize> {
    match features {
        FeatureSelection::All => (0..data.n_features()).collect(),
        FeatureSelection::Subset(list) => list.to_vec(),
    }
}

/// Independent seed for stream `stream` of `seed`.
pub(crate) fn derive_seed(seed: u64, stream: u64) -> u64 {
    StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)).random()
}

/// One feature of a row subset, sorted by value, with prefix sums of the
/// target so the gain of any left/right cut is O(1).
pub(crate) struct FeatureScan {
    values: Vec<f64>,
    prefix: Vec<f64>,
}

impl FeatureScan {
    pub(crate) fn new(data: &DatasetView<'_>, feature: usize, rows: &[usize]) -> Self {
        let mut pairs: Vec<(f64, f64)> = rows
            .iter()
            .map(|&r| (data.value(r, feature), data.target(r)))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut prefix = Vec::with_capacity(pairs.len() + 1);
        let mut acc = 0.0;
        prefix.push(acc);
        for &(_, y) in &pairs {
            acc += y;
            prefix.push(acc);
        }
        FeatureScan {
            values: pairs.into_iter().map(|(v, _)| v).collect(),
            prefix,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    /// `(min, max)` of the feature, `None` for an empty scan.
    pub(crate) fn range(&self) -> Option<(f64, f64)> {
        Some((*self.values.first()?, *self.values.last()?))
    }

    /// Median value; the midpoint of the two middle values for an even count.
    /// Only meaningful for a non-empty scan.
    pub(crate) fn median(&self) -> f64 {
        let n = self.len();
        let upper = self.values[n / 2];
        if n % 2 == 0 {
            let lower = self.values[n / 2 - 1];
            if lower < upper {
                return midpoint(lower, upper);
            }
        }
        upper
    }

    /// Gain of sending the first `n_left` sorted rows left:
    /// `SS_total - SS_left - SS_right`, written as
    /// `n_l * n_r / n * (mean_l - mean_r)^2`.
    pub(crate) fn gain_at(&self, n_left: usize) -> f64 {
        let n = self.len();
        let n_right = n - n_left;
        let sum_left = self.prefix[n_left];
        let sum_right = self.prefix[n] - sum_left;
        let diff = sum_left / n_left as f64 - sum_right / n_right as f64;
        (n_left as f64) * (n_right as f64) / n as f64 * diff * diff
    }

    /// Gain of an arbitrary threshold, `None` if one side would be empty.
    pub(crate) fn gain_for_threshold(&self, threshold: f64) -> Option<f64> {
        let n_left = self.values.partition_point(|&v| v <= threshold);
        if n_left == 0 || n_left == self.len() {
            return None;
        }
        Some(self.gain_at(n_left))
    }

    /// Cut positions between consecutive distinct values, with their
    /// midpoint thresholds, ascending.
    pub(crate) fn boundaries(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        (1..self.len()).filter_map(move |i| {
            let (lo, hi) = (self.values[i - 1], self.values[i]);
            (lo < hi).then(|| (i, midpoint(lo, hi)))
        })
    }
}
