//! Read-only windowed access to a dense matrix and its target.
//!
//! Everything here works through row-index indirection: a node of a tree
//! is a list of row indices into the caller's matrix, never a copy of it.

use ndarray::{ArrayView1, ArrayView2};

use crate::error::{Result, WoodsError};

/// Which features a threshold enumeration should cover.
#[derive(Debug, Clone, Copy)]
pub enum FeatureSelection<'a> {
    All,
    Subset(&'a [usize]),
}

/// Borrowed view over `x` (rows × features) and the target `y`.
#[derive(Debug, Clone, Copy)]
pub struct DatasetView<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
}

impl<'a> DatasetView<'a> {
    pub fn new(x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(WoodsError::Shape(format!(
                "x has {} rows but y has {} elements",
                x.nrows(),
                y.len()
            )));
        }
        Ok(DatasetView { x, y })
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// All row indices, in order.
    pub fn all_rows(&self) -> Vec<usize> {
        (0..self.n_rows()).collect()
    }

    #[inline]
    pub fn value(&self, row: usize, feature: usize) -> f64 {
        self.x[[row, feature]]
    }

    #[inline]
    pub fn target(&self, row: usize) -> f64 {
        self.y[row]
    }

    pub fn features(&self) -> ArrayView2<'a, f64> {
        self.x
    }

    pub fn targets(&self) -> ArrayView1<'a, f64> {
        self.y
    }

    /// Distinct values of `feature` among `rows`, ascending.
    pub fn sorted_distinct(&self, feature: usize, rows: &[usize]) -> Vec<f64> {
        let mut values: Vec<f64> = rows.iter().map(|&r| self.value(r, feature)).collect();
        values.sort_by(f64::total_cmp);
        values.dedup_by(|a, b| *a == *b);
        values
    }

    /// Candidate split thresholds for `feature` over `rows`: midpoints of
    /// consecutive distinct values, or the value itself when only one
    /// distinct value exists.
    pub fn candidate_thresholds(&self, feature: usize, rows: &[usize]) -> Vec<f64> {
        let distinct = self.sorted_distinct(feature, rows);
        match distinct.len() {
            0 => Vec::new(),
            1 => distinct,
            _ => distinct.windows(2).map(|w| midpoint(w[0], w[1])).collect(),
        }
    }

    /// Candidate thresholds for every selected feature, as `(feature, thresholds)`.
    pub fn feature_thresholds(
        &self,
        features: FeatureSelection<'_>,
        rows: &[usize],
    ) -> Vec<(usize, Vec<f64>)> {
        match features {
            FeatureSelection::All => (0..self.n_features())
                .map(|f| (f, self.candidate_thresholds(f, rows)))
                .collect(),
            FeatureSelection::Subset(list) => list
                .iter()
                .map(|&f| (f, self.candidate_thresholds(f, rows)))
                .collect(),
        }
    }

    /// Mean target over `rows`.
    pub fn mean(&self, rows: &[usize]) -> Result<f64> {
        if rows.is_empty() {
            return Err(WoodsError::EmptyInput("mean of an empty row subset".into()));
        }
        Ok(mean_of(rows.iter().map(|&r| self.y[r])))
    }

    /// Sum of squared deviations from the mean over `rows`.
    pub fn sum_sq(&self, rows: &[usize]) -> Result<f64> {
        let mean = self.mean(rows)?;
        Ok(rows
            .iter()
            .map(|&r| {
                let d = self.y[r] - mean;
                d * d
            })
            .sum())
    }

    /// Population variance of the target over `rows`.
    pub fn variance(&self, rows: &[usize]) -> Result<f64> {
        Ok(self.sum_sq(rows)? / rows.len() as f64)
    }

    /// True when every target in `rows` is the same value (vacuously for
    /// an empty subset).
    pub fn all_targets_equal(&self, rows: &[usize]) -> bool {
        match rows.split_first() {
            None => true,
            Some((&first, rest)) => {
                let v = self.y[first];
                rest.iter().all(|&r| self.y[r] == v)
            }
        }
    }

    /// Split `rows` by `x[feature] <= threshold`, keeping the input order
    /// on each side.
    pub fn partition(
        &self,
        rows: &[usize],
        feature: usize,
        threshold: f64,
    ) -> (Vec<usize>, Vec<usize>) {
        rows.iter()
            .copied()
            .partition(|&r| self.value(r, feature) <= threshold)
    }
}

/// Arithmetic mean of a non-empty sequence. A constant sequence returns
/// its value exactly, which `sum / n` alone does not guarantee.
pub(crate) fn mean_of(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut iter = values.into_iter();
    let Some(first) = iter.next() else {
        return f64::NAN;
    };
    let mut sum = first;
    let mut n = 1usize;
    let mut constant = true;
    for v in iter {
        constant &= v == first;
        sum += v;
        n += 1;
    }
    if constant {
        first
    } else {
        sum / n as f64
    }
}

/// Midpoint of `lo < hi` that still routes `lo` left and `hi` right.
#[inline]
pub(crate) fn midpoint(lo: f64, hi: f64) -> f64 {
    let span = hi - lo;
    let mid = if span.is_finite() {
        lo + span / 2.0
    } else {
        lo / 2.0 + hi / 2.0
    };
    if mid < hi {
        mid
    } else {
        lo
    }
}
