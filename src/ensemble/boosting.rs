use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::mse;
use crate::data::DatasetView;
use crate::error::{Result, WoodsError};
use crate::estimator::{check_fit_input, check_predict_input, Regressor};
use crate::params::BoostingParams;
use crate::tree::{Tree, PARALLEL_MIN_ROWS};

/// Gradient boosting for squared error.
///
/// Starts from the target mean and adds `n_estimators` trees, each fitted on
/// the residual left by the ones before it and shrunk by `learning_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: BoostingParams,
    n_features: Option<usize>,
    base_value: f64,
    trees: Vec<Tree>,
}

impl GradientBoosting {
    pub fn new(params: BoostingParams) -> Result<Self> {
        params.validate()?;
        Ok(GradientBoosting {
            params,
            n_features: None,
            base_value: 0.0,
            trees: Vec::new(),
        })
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Replace the hyperparameters. Any fitted state is discarded.
    pub fn set_params(&mut self, params: BoostingParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        self.n_features = None;
        self.base_value = 0.0;
        self.trees.clear();
        Ok(())
    }

    /// Target mean at fit time; the prediction before any tree is added.
    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    /// Fitted trees in the order they were added.
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn learning_rate(&self) -> f64 {
        self.params.learning_rate
    }

    /// Predict one row at a time, walking every tree for a row before moving
    /// on. Gives the same bits as [`Regressor::predict`].
    pub fn predict_rowwise(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let view = self.checked_view(x)?;
        let row_value = |i: usize| {
            let row = view.row(i);
            let sum = self
                .trees
                .iter()
                .fold(0.0, |acc, tree| acc + tree.predict_row(row));
            self.base_value + self.params.learning_rate * sum
        };
        if view.nrows() >= PARALLEL_MIN_ROWS {
            let values: Vec<f64> = (0..view.nrows()).into_par_iter().map(row_value).collect();
            Ok(Array1::from(values))
        } else {
            Ok((0..view.nrows()).map(row_value).collect())
        }
    }

    fn checked_view<'x>(&self, x: &'x Array2<f64>) -> Result<ArrayView2<'x, f64>> {
        let n_features = self.n_features.ok_or(WoodsError::NotFitted)?;
        let view = x.view();
        check_predict_input(&view, n_features)?;
        Ok(view)
    }

    /// Batched prediction over an already checked view.
    pub(crate) fn predict_view(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        let mut sum = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            sum += &tree.predict_view(x);
        }
        sum.mapv(|s| self.base_value + self.params.learning_rate * s)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.params.validate()?;
        let n_features = self.n_features.ok_or_else(|| {
            WoodsError::Format("gradient boosting model has not been fitted".into())
        })?;
        if !self.base_value.is_finite() {
            return Err(WoodsError::Format(format!(
                "base value {} is not finite",
                self.base_value
            )));
        }
        if self.trees.len() != self.params.n_estimators {
            return Err(WoodsError::Format(format!(
                "expected {} trees, found {}",
                self.params.n_estimators,
                self.trees.len()
            )));
        }
        for tree in &self.trees {
            if tree.n_features() != n_features {
                return Err(WoodsError::Format(format!(
                    "tree expects {} features, ensemble expects {}",
                    tree.n_features(),
                    n_features
                )));
            }
            tree.validate(self.params.tree.max_depth)?;
        }
        Ok(())
    }
}

impl Regressor for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_with_seed(x, y, self.params.seed())
    }

    fn fit_with_seed(&mut self, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<()> {
        let data = check_fit_input(x, y)?;
        let base_value = data.mean(&data.all_rows())?;
        let lr = self.params.learning_rate;

        let mut prediction = Array1::from_elem(data.n_rows(), base_value);
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        let mut rng = StdRng::seed_from_u64(seed);

        for round in 0..self.params.n_estimators {
            let residual = y - &prediction;
            let residual_view = DatasetView::new(x.view(), residual.view())?;
            let tree = Tree::grow(&self.params.tree, &residual_view, rng.random())?;

            prediction.scaled_add(lr, &tree.predict_view(&data.features()));
            trees.push(tree);

            debug!(
                round,
                mse = mse(y.view(), prediction.view()),
                "boosting round"
            );
        }

        info!(
            trees = trees.len(),
            rows = data.n_rows(),
            features = data.n_features(),
            mse = mse(y.view(), prediction.view()),
            "fitted gradient boosting"
        );
        self.n_features = Some(data.n_features());
        self.base_value = base_value;
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let view = self.checked_view(x)?;
        Ok(self.predict_view(&view))
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::TreeParams;
    use crate::tree::DecisionTree;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn wave(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i as f64) / (n as f64) + j as f64 * 0.3);
        let y = Array1::from_shape_fn(n, |i| (x[[i, 0]] * 6.0).sin() + x[[i, 1]]);
        (x, y)
    }

    #[test]
    fn test_zero_estimators_predicts_mean() {
        let (x, y) = wave(20);
        let mut model =
            GradientBoosting::new(BoostingParams::default().with_n_estimators(0)).unwrap();
        model.fit(&x, &y).unwrap();
        let mean = model.base_value();
        assert!(model.trees().is_empty());
        assert!(model.predict(&x).unwrap().iter().all(|&p| p == mean));
    }

    #[test]
    fn test_constant_target() {
        let (x, _) = wave(15);
        let y = Array1::from_elem(15, 2.25);
        let mut model = GradientBoosting::new(BoostingParams::default()).unwrap();
        model.fit(&x, &y).unwrap();
        assert!(model.predict(&x).unwrap().iter().all(|&p| p == 2.25));
    }

    #[test]
    fn test_single_round_matches_tree() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let params = BoostingParams::new(TreeParams::new(1, 2), 1, 1.0);
        let mut model = GradientBoosting::new(params).unwrap();
        model.fit(&x, &y).unwrap();
        let mut tree = DecisionTree::new(TreeParams::new(1, 2)).unwrap();
        tree.fit(&x, &y).unwrap();

        let boosted = model.predict(&x).unwrap();
        let single = tree.predict(&x).unwrap();
        for (b, s) in boosted.iter().zip(single.iter()) {
            assert_abs_diff_eq!(b, s, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_training_error_decreases() {
        let (x, y) = wave(60);
        let mut short = GradientBoosting::new(BoostingParams::default().with_n_estimators(5))
            .unwrap();
        let mut long = GradientBoosting::new(BoostingParams::default().with_n_estimators(50))
            .unwrap();
        short.fit(&x, &y).unwrap();
        long.fit(&x, &y).unwrap();
        let short_mse = mse(y.view(), short.predict(&x).unwrap().view());
        let long_mse = mse(y.view(), long.predict(&x).unwrap().view());
        assert!(long_mse < short_mse);
    }

    #[test]
    fn test_rowwise_matches_batched() {
        let (x, y) = wave(40);
        let mut model = GradientBoosting::new(BoostingParams::default().with_n_estimators(25))
            .unwrap();
        model.fit(&x, &y).unwrap();
        let batched = model.predict(&x).unwrap();
        let rowwise = model.predict_rowwise(&x).unwrap();
        for (a, b) in batched.iter().zip(rowwise.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_failed_refit_keeps_model() {
        let (x, y) = wave(10);
        let mut model = GradientBoosting::new(BoostingParams::default().with_n_estimators(3))
            .unwrap();
        model.fit(&x, &y).unwrap();
        let before = model.predict(&x).unwrap();
        let bad_y = Array1::zeros(9);
        assert!(matches!(model.fit(&x, &bad_y), Err(WoodsError::Shape(_))));
        assert_eq!(model.predict(&x).unwrap(), before);
    }

    #[test]
    fn test_predict_errors() {
        let model = GradientBoosting::new(BoostingParams::default()).unwrap();
        assert!(matches!(
            model.predict(&Array2::zeros((2, 2))),
            Err(WoodsError::NotFitted)
        ));
        assert!(matches!(
            model.predict_rowwise(&Array2::zeros((2, 2))),
            Err(WoodsError::NotFitted)
        ));
    }
}
