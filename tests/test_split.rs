//! Split search through the public finder API.

use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use woods_rs::data::{DatasetView, FeatureSelection};
use woods_rs::{
    DecisionTree, GreedySplitFinder, MaxFeatures, RandomizedConfig, RandomizedSplitFinder,
    Regressor, SplitFinder, ThresholdSampling, TreeParams,
};

fn generate_data(n_samples: usize, n_features: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::random_using(
        (n_samples, n_features),
        Uniform::new(0.0, 10.0).unwrap(),
        &mut rng,
    );
    let noise = Array1::random_using(n_samples, Uniform::new(-0.5, 0.5).unwrap(), &mut rng);
    let y = x.column(1).mapv(|v| if v > 4.0 { 3.0 } else { -1.0 }) + noise;
    (x, y)
}

/// Sum-of-squares reduction of a split, computed the slow way.
fn brute_force_gain(view: &DatasetView<'_>, rows: &[usize], feature: usize, threshold: f64) -> f64 {
    let (left, right) = view.partition(rows, feature, threshold);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    view.sum_sq(rows).unwrap() - view.sum_sq(&left).unwrap() - view.sum_sq(&right).unwrap()
}

#[test]
fn test_greedy_matches_brute_force() {
    let (x, y) = generate_data(60, 4, 1);
    let view = DatasetView::new(x.view(), y.view()).unwrap();
    let rows = view.all_rows();

    let split = GreedySplitFinder
        .find_best_split(&view, &rows, FeatureSelection::All, 0)
        .unwrap();

    let mut best = 0.0_f64;
    for (feature, thresholds) in view.feature_thresholds(FeatureSelection::All, &rows) {
        for t in thresholds {
            best = best.max(brute_force_gain(&view, &rows, feature, t));
        }
    }
    assert_eq!(split.feature, 1);
    assert_relative_eq!(split.gain, best, max_relative = 1e-9);
    assert_relative_eq!(
        split.gain,
        brute_force_gain(&view, &rows, split.feature, split.threshold),
        max_relative = 1e-9
    );
}

#[test]
fn test_greedy_respects_feature_subset() {
    let (x, y) = generate_data(60, 4, 2);
    let view = DatasetView::new(x.view(), y.view()).unwrap();
    let rows = view.all_rows();
    let split = GreedySplitFinder
        .find_best_split(&view, &rows, FeatureSelection::Subset(&[0, 3]), 0)
        .unwrap();
    assert!(split.feature == 0 || split.feature == 3);
}

#[test]
fn test_greedy_on_row_subset() {
    let (x, y) = generate_data(80, 3, 3);
    let view = DatasetView::new(x.view(), y.view()).unwrap();
    let rows: Vec<usize> = (0..80).filter(|i| i % 3 == 0).collect();
    let split = GreedySplitFinder
        .find_best_split(&view, &rows, FeatureSelection::All, 0)
        .unwrap();
    let (left, right) = view.partition(&rows, split.feature, split.threshold);
    assert!(!left.is_empty() && !right.is_empty());
    assert_eq!(left.len() + right.len(), rows.len());
}

#[test]
fn test_parallel_search_is_deterministic() {
    // rows × features above the parallel cutoff
    let (x, y) = generate_data(4_000, 8, 4);
    let view = DatasetView::new(x.view(), y.view()).unwrap();
    let rows = view.all_rows();
    let first = GreedySplitFinder.find_best_split(&view, &rows, FeatureSelection::All, 0);
    for _ in 0..3 {
        assert_eq!(
            GreedySplitFinder.find_best_split(&view, &rows, FeatureSelection::All, 0),
            first
        );
    }

    let finder = RandomizedSplitFinder::new(
        RandomizedConfig::default()
            .with_max_features(MaxFeatures::All)
            .with_n_thresholds(8),
    );
    let a = finder.find_best_split(&view, &rows, FeatureSelection::All, 17);
    let b = finder.find_best_split(&view, &rows, FeatureSelection::All, 17);
    assert!(a.is_some());
    assert_eq!(a, b);
}

#[test]
fn test_randomized_never_beats_greedy() {
    let (x, y) = generate_data(100, 5, 5);
    let view = DatasetView::new(x.view(), y.view()).unwrap();
    let rows = view.all_rows();
    let greedy = GreedySplitFinder
        .find_best_split(&view, &rows, FeatureSelection::All, 0)
        .unwrap();
    for sampling in [
        ThresholdSampling::Uniform,
        ThresholdSampling::TruncatedNormal,
        ThresholdSampling::Candidates,
        ThresholdSampling::Mean,
        ThresholdSampling::Median,
    ] {
        let finder = RandomizedSplitFinder::new(
            RandomizedConfig::default()
                .with_thresholds(sampling)
                .with_n_thresholds(5),
        );
        for seed in 0..10 {
            if let Some(split) = finder.find_best_split(&view, &rows, FeatureSelection::All, seed)
            {
                assert!(split.gain <= greedy.gain * (1.0 + 1e-12));
                assert!(split.gain > 0.0);
            }
        }
    }
}

#[test]
fn test_tiny_subsets_yield_no_split() {
    let (x, y) = generate_data(10, 2, 6);
    let view = DatasetView::new(x.view(), y.view()).unwrap();
    assert!(GreedySplitFinder
        .find_best_split(&view, &[4], FeatureSelection::All, 0)
        .is_none());
    assert!(RandomizedSplitFinder::default()
        .find_best_split(&view, &[], FeatureSelection::All, 0)
        .is_none());
}

#[test]
fn test_randomized_tree_handles_extreme_outliers() {
    let x = Array2::from_shape_vec((4, 1), vec![-1e308, 1e308, -1e308, 1e308]).unwrap();
    let y = Array1::from_vec(vec![0.0, 1.0, 0.0, 1.0]);
    for sampling in [
        ThresholdSampling::Uniform,
        ThresholdSampling::TruncatedNormal,
        ThresholdSampling::Mean,
        ThresholdSampling::Median,
    ] {
        let params = TreeParams::new(2, 2).randomized(
            RandomizedConfig::default()
                .with_thresholds(sampling)
                .with_n_thresholds(2),
        );
        let mut tree = DecisionTree::new(params).unwrap();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y, "{sampling:?}");
    }
}
