use rayon::prelude::*;

use super::{selected_features, FeatureScan, Split, SplitFinder, PARALLEL_MIN_CELLS};
use crate::data::{DatasetView, FeatureSelection};

/// Exhaustive split search: every feature, every midpoint between
/// consecutive distinct values.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySplitFinder;

impl GreedySplitFinder {
    /// Best cut of a single feature. Scans ascending and only replaces on a
    /// strictly larger gain, so the smallest threshold wins ties.
    pub fn best_for_feature(
        &self,
        data: &DatasetView<'_>,
        rows: &[usize],
        feature: usize,
    ) -> Option<Split> {
        let scan = FeatureScan::new(data, feature, rows);
        let mut best: Option<Split> = None;
        for (n_left, threshold) in scan.boundaries() {
            let gain = scan.gain_at(n_left);
            if !(gain > 0.0) {
                continue;
            }
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(Split {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
        best
    }
}

impl SplitFinder for GreedySplitFinder {
    fn find_best_split(
        &self,
        data: &DatasetView<'_>,
        rows: &[usize],
        features: FeatureSelection<'_>,
        _seed: u64,
    ) -> Option<Split> {
        if rows.len() < 2 {
            return None;
        }
        let features = selected_features(data, features);
        if rows.len() * features.len() >= PARALLEL_MIN_CELLS {
            features
                .par_iter()
                .filter_map(|&f| self.best_for_feature(data, rows, f))
                .reduce_with(Split::prefer)
        } else {
            features
                .iter()
                .filter_map(|&f| self.best_for_feature(data, rows, f))
                .reduce(Split::prefer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    #[test]
    fn test_step_function_split() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let view = DatasetView::new(x.view(), y.view()).unwrap();
        let split = GreedySplitFinder
            .find_best_split(&view, &view.all_rows(), FeatureSelection::All, 0)
            .unwrap();
        assert_eq!(split.feature, 0);
        assert_eq!(split.threshold, 1.5);
        assert_eq!(split.gain, 1.0);
    }

    #[test]
    fn test_constant_target_has_no_split() {
        let x = array![[0.0, 4.0], [1.0, 3.0], [2.0, 2.0]];
        let y = array![5.0, 5.0, 5.0];
        let view = DatasetView::new(x.view(), y.view()).unwrap();
        assert!(GreedySplitFinder
            .find_best_split(&view, &view.all_rows(), FeatureSelection::All, 0)
            .is_none());
    }

    #[test]
    fn test_constant_feature_has_no_split() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = array![0.0, 1.0, 2.0];
        let view = DatasetView::new(x.view(), y.view()).unwrap();
        assert!(GreedySplitFinder
            .find_best_split(&view, &view.all_rows(), FeatureSelection::All, 0)
            .is_none());
    }

    #[test]
    fn test_ties_prefer_smallest_feature() {
        // features 0 and 2 are identical copies; feature 1 is noise-free but weaker
        let x = array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 0.0, 2.0], [3.0, 1.0, 3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let view = DatasetView::new(x.view(), y.view()).unwrap();
        let split = GreedySplitFinder
            .find_best_split(&view, &view.all_rows(), FeatureSelection::All, 0)
            .unwrap();
        assert_eq!(split.feature, 0);

        let split = GreedySplitFinder
            .find_best_split(&view, &view.all_rows(), FeatureSelection::Subset(&[2, 1]), 0)
            .unwrap();
        assert_eq!(split.feature, 2);
    }

    #[test]
    fn test_ties_prefer_smallest_threshold() {
        // symmetric target: cutting after row 0 or before row 2 gains the same
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![1.0, 0.0, 1.0];
        let view = DatasetView::new(x.view(), y.view()).unwrap();
        let split = GreedySplitFinder
            .find_best_split(&view, &view.all_rows(), FeatureSelection::All, 0)
            .unwrap();
        assert_eq!(split.threshold, 0.5);
    }

    #[test]
    fn test_parallel_and_serial_agree() {
        let n = 2_000;
        let m = 10;
        let x = Array2::from_shape_fn((n, m), |(i, j)| ((i * (j + 3)) % 97) as f64);
        let y = Array1::from_shape_fn(n, |i| ((i * 31) % 17) as f64);
        let view = DatasetView::new(x.view(), y.view()).unwrap();
        let rows = view.all_rows();
        let parallel = GreedySplitFinder
            .find_best_split(&view, &rows, FeatureSelection::All, 0)
            .unwrap();
        let serial = (0..m)
            .filter_map(|f| GreedySplitFinder.best_for_feature(&view, &rows, f))
            .reduce(Split::prefer)
            .unwrap();
        assert_eq!(parallel, serial);
    }
}
