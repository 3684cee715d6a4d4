//! The fit / predict contract shared by every model.

use ndarray::{Array1, Array2, ArrayView2};

use crate::data::DatasetView;
use crate::error::{Result, WoodsError};

/// A regression model over a dense `f64` matrix.
///
/// `fit` consumes the seed stored in the model's hyperparameters;
/// `fit_with_seed` overrides it for a single call. A failed fit leaves the
/// previously fitted state untouched.
pub trait Regressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn fit_with_seed(&mut self, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<()>;

    /// One prediction per row of `x`. Requires a fitted model and the
    /// column count seen at fit time.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn is_fitted(&self) -> bool;

    /// Column count seen at fit time.
    fn n_features(&self) -> Option<usize>;
}

/// Validate training input and wrap it in a view.
pub(crate) fn check_fit_input<'a>(
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
) -> Result<DatasetView<'a>> {
    let view = DatasetView::new(x.view(), y.view())?;
    if view.n_rows() == 0 {
        return Err(WoodsError::EmptyInput("cannot fit on zero rows".into()));
    }
    Ok(view)
}

/// Validate prediction input against the fit-time column count.
pub(crate) fn check_predict_input(x: &ArrayView2<'_, f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(WoodsError::Shape(format!(
            "model was fitted on {} features but x has {} columns",
            n_features,
            x.ncols()
        )));
    }
    Ok(())
}
