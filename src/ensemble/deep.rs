use ndarray::{Array1, Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{mse, GradientBoosting};
use crate::error::{Result, WoodsError};
use crate::estimator::{check_fit_input, check_predict_input, Regressor};
use crate::params::{BoostingParams, DeepBoostingParams};
use crate::split::derive_seed;

/// One layer of a deep model: boosting ensembles fitted on the same target
/// with different seeds, predicting their mean.
///
/// Member 0 uses the layer seed itself, so a layer of width one is exactly
/// a [`GradientBoosting`] model with the layer's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedLayer {
    members: Vec<GradientBoosting>,
}

impl AveragedLayer {
    fn fit(
        x: &Array2<f64>,
        target: &Array1<f64>,
        params: BoostingParams,
        width: usize,
    ) -> Result<Self> {
        let seed = params.seed();
        let members = (0..width)
            .into_par_iter()
            .map(|member| {
                let member_seed = if member == 0 {
                    seed
                } else {
                    derive_seed(seed, member as u64)
                };
                let mut model = GradientBoosting::new(params.with_seed(member_seed))?;
                model.fit(x, target)?;
                Ok(model)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(AveragedLayer { members })
    }

    pub fn members(&self) -> &[GradientBoosting] {
        &self.members
    }

    pub fn width(&self) -> usize {
        self.members.len()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.members.first().and_then(GradientBoosting::n_features)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let n_features = self.n_features().ok_or(WoodsError::NotFitted)?;
        let view = x.view();
        check_predict_input(&view, n_features)?;
        Ok(self.predict_view(&view))
    }

    pub(crate) fn predict_view(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        let mut total = Array1::<f64>::zeros(x.nrows());
        for member in &self.members {
            total += &member.predict_view(x);
        }
        total /= self.members.len() as f64;
        total
    }
}

/// Layers of gradient boosting ensembles.
///
/// Layer `k` is fitted on the target minus the predictions of layers
/// `0..k`; the model predicts the sum of every layer. With no layers the
/// model predicts zero for every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepGradientBoosting {
    params: DeepBoostingParams,
    n_features: Option<usize>,
    layers: Vec<AveragedLayer>,
}

impl DeepGradientBoosting {
    pub fn new(params: DeepBoostingParams) -> Result<Self> {
        params.validate()?;
        Ok(DeepGradientBoosting {
            params,
            n_features: None,
            layers: Vec::new(),
        })
    }

    pub fn params(&self) -> &DeepBoostingParams {
        &self.params
    }

    pub fn set_params(&mut self, params: DeepBoostingParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        self.n_features = None;
        self.layers.clear();
        Ok(())
    }

    /// Fitted layers, first to last.
    pub fn layers(&self) -> &[AveragedLayer] {
        &self.layers
    }

    fn fit_layers(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &DeepBoostingParams,
    ) -> Result<()> {
        let data = check_fit_input(x, y)?;
        let mut running = y.clone();
        let mut layers = Vec::with_capacity(params.n_layers());

        for (index, layer_params) in params.layers.iter().enumerate() {
            let layer = AveragedLayer::fit(x, &running, *layer_params, params.layer_width)?;
            let prediction = layer.predict_view(&data.features());
            debug!(
                layer = index,
                width = layer.width(),
                mse = mse(running.view(), prediction.view()),
                "deep boosting layer"
            );
            running -= &prediction;
            layers.push(layer);
        }

        info!(
            layers = layers.len(),
            rows = data.n_rows(),
            mse = mse(y.view(), (y - &running).view()),
            "fitted deep gradient boosting"
        );
        self.n_features = Some(data.n_features());
        self.layers = layers;
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.params.validate()?;
        let Some(n_features) = self.n_features else {
            return Err(WoodsError::Format(
                "deep boosting model has no fitted feature count".into(),
            ));
        };
        if self.layers.len() != self.params.n_layers() {
            return Err(WoodsError::Format(format!(
                "expected {} layers, found {}",
                self.params.n_layers(),
                self.layers.len()
            )));
        }
        for layer in &self.layers {
            if layer.width() != self.params.layer_width {
                return Err(WoodsError::Format(format!(
                    "expected {} ensembles per layer, found {}",
                    self.params.layer_width,
                    layer.width()
                )));
            }
            for member in &layer.members {
                member.validate()?;
                if member.n_features() != Some(n_features) {
                    return Err(WoodsError::Format(
                        "layers disagree on the number of features".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Regressor for DeepGradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let params = self.params.clone();
        self.fit_layers(x, y, &params)
    }

    /// Layer `i` is seeded with `seed + i`.
    fn fit_with_seed(&mut self, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<()> {
        let params = self.params.clone().with_seed(seed);
        self.fit_layers(x, y, &params)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let n_features = self.n_features.ok_or(WoodsError::NotFitted)?;
        let view = x.view();
        check_predict_input(&view, n_features)?;
        let mut total = Array1::<f64>::zeros(x.nrows());
        for layer in &self.layers {
            total += &layer.predict_view(&view);
        }
        Ok(total)
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
    use crate::params::{BoostingParams, TreeParams};

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((50, 3), |(i, j)| ((i * 17 + j * 5) % 31) as f64 / 10.0);
        let y = Array1::from_shape_fn(50, |i| x[[i, 0]] * x[[i, 1]] - x[[i, 2]]);
        (x, y)
    }

    fn layer() -> BoostingParams {
        BoostingParams::new(TreeParams::new(2, 2), 10, 0.3)
    }

    #[test]
    fn test_single_layer_equals_boosting() {
        let (x, y) = data();
        let mut deep = DeepGradientBoosting::new(DeepBoostingParams::new(vec![layer()])).unwrap();
        let mut plain = GradientBoosting::new(layer()).unwrap();
        deep.fit(&x, &y).unwrap();
        plain.fit(&x, &y).unwrap();
        assert_eq!(deep.predict(&x).unwrap(), plain.predict(&x).unwrap());
    }

    #[test]
    fn test_layers_reduce_training_error() {
        let (x, y) = data();
        let mut one = DeepGradientBoosting::new(DeepBoostingParams::uniform(1, layer())).unwrap();
        let mut three = DeepGradientBoosting::new(DeepBoostingParams::uniform(3, layer())).unwrap();
        one.fit(&x, &y).unwrap();
        three.fit(&x, &y).unwrap();
        assert_eq!(three.layers().len(), 3);
        let err_one = mse(y.view(), one.predict(&x).unwrap().view());
        let err_three = mse(y.view(), three.predict(&x).unwrap().view());
        assert!(err_three < err_one);
    }

    #[test]
    fn test_second_layer_fits_residual() {
        let (x, y) = data();
        let mut deep = DeepGradientBoosting::new(DeepBoostingParams::uniform(2, layer())).unwrap();
        deep.fit(&x, &y).unwrap();
        let residual = &y - &deep.layers()[0].predict(&x).unwrap();
        let mut expected = GradientBoosting::new(layer().with_seed(1)).unwrap();
        expected.fit(&x, &residual).unwrap();
        assert_eq!(deep.layers()[1].members(), &[expected]);
    }

    #[test]
    fn test_fit_with_seed_reseeds_layers() {
        let (x, y) = data();
        let mut deep = DeepGradientBoosting::new(DeepBoostingParams::uniform(2, layer())).unwrap();
        deep.fit_with_seed(&x, &y, 40).unwrap();
        assert_eq!(deep.layers()[0].members()[0].params().seed(), 40);
        assert_eq!(deep.layers()[1].members()[0].params().seed(), 41);
        // stored parameters are untouched
        assert_eq!(deep.params().layers[1].seed(), 1);
    }

    #[test]
    fn test_wide_layer_averages_members() {
        let (x, y) = data();
        let randomized = layer().with_tree(
            TreeParams::new(2, 2).randomized(crate::params::RandomizedConfig::default()),
        );
        let params = DeepBoostingParams::new(vec![randomized]).with_layer_width(3);
        let mut deep = DeepGradientBoosting::new(params).unwrap();
        deep.fit(&x, &y).unwrap();

        let fitted = &deep.layers()[0];
        assert_eq!(fitted.width(), 3);
        let seeds: Vec<u64> = fitted.members().iter().map(|m| m.params().seed()).collect();
        assert_eq!(seeds[0], randomized.seed());
        assert!(seeds[1] != seeds[0] && seeds[2] != seeds[1] && seeds[2] != seeds[0]);

        let mut sum = Array1::<f64>::zeros(x.nrows());
        for member in fitted.members() {
            sum += &member.predict(&x).unwrap();
        }
        let mean = sum / 3.0;
        assert_eq!(deep.predict(&x).unwrap(), mean);
    }

    #[test]
    fn test_zero_layers_predict_zero() {
        let (x, y) = data();
        let mut deep = DeepGradientBoosting::new(DeepBoostingParams::new(Vec::new())).unwrap();
        assert!(!deep.is_fitted());
        deep.fit(&x, &y).unwrap();
        assert!(deep.is_fitted());
        assert_eq!(deep.n_features(), Some(3));
        assert!(deep.layers().is_empty());
        assert_eq!(deep.predict(&x).unwrap(), Array1::<f64>::zeros(x.nrows()));
        assert!(deep.validate().is_ok());
        assert!(matches!(
            deep.predict(&Array2::zeros((2, 4))),
            Err(WoodsError::Shape(_))
        ));
    }

    #[test]
    fn test_unfitted_predict() {
        let deep = DeepGradientBoosting::new(DeepBoostingParams::default()).unwrap();
        assert!(matches!(
            deep.predict(&Array2::zeros((1, 3))),
            Err(WoodsError::NotFitted)
        ));
    }
}
