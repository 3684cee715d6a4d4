//! Sequential ensembles of regression trees.
//!
//! [`GradientBoosting`] fits trees one round at a time on the residual of
//! the current prediction. [`DeepGradientBoosting`] stacks whole boosting
//! ensembles, each layer fitted on what the previous layers left over; a
//! layer may average several differently seeded ensembles.

pub mod boosting;
pub mod deep;

pub use boosting::GradientBoosting;
pub use deep::{AveragedLayer, DeepGradientBoosting};

use ndarray::{ArrayView1, Zip};

/// Mean squared difference between `y` and `prediction`.
pub(crate) fn mse(y: ArrayView1<'_, f64>, prediction: ArrayView1<'_, f64>) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let total = Zip::from(&y)
        .and(&prediction)
        .fold(0.0, |acc, &t, &p| acc + (t - p) * (t - p));
    total / y.len() as f64
}
