//! Single-split decision rule (a depth-one tree).

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Tree, TreeNode};
use crate::data::FeatureSelection;
use crate::error::{Result, WoodsError};
use crate::estimator::{check_fit_input, check_predict_input, Regressor};
use crate::params::{RandomizedConfig, RuleParams, SplitStrategy};
use crate::split::{finder_for, Split};

/// Decision stump: one threshold on one feature, a mean on each side.
///
/// When no split improves on the global mean the rule degenerates to a
/// single leaf predicting `mean(y)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRule {
    params: RuleParams,
    tree: Option<Tree>,
}

impl Default for DecisionRule {
    fn default() -> Self {
        DecisionRule::greedy()
    }
}

impl DecisionRule {
    pub fn new(params: RuleParams) -> Result<Self> {
        params.validate()?;
        Ok(DecisionRule { params, tree: None })
    }

    /// Exhaustive search over every feature and midpoint.
    pub fn greedy() -> Self {
        DecisionRule {
            params: RuleParams::default(),
            tree: None,
        }
    }

    pub fn randomized(config: RandomizedConfig, seed: u64) -> Result<Self> {
        DecisionRule::new(
            RuleParams::default()
                .with_splitter(SplitStrategy::Randomized(config))
                .with_seed(seed),
        )
    }

    pub fn params(&self) -> &RuleParams {
        &self.params
    }

    pub fn set_params(&mut self, params: RuleParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        self.tree = None;
        Ok(())
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// The fitted split, if the rule found one.
    pub fn split(&self) -> Option<&Split> {
        match self.tree.as_ref()?.root() {
            TreeNode::Internal { split, .. } => Some(split),
            TreeNode::Leaf { .. } => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.params.validate()?;
        match &self.tree {
            Some(tree) => tree.validate(1),
            None => Err(WoodsError::Format("decision rule has no fitted nodes".into())),
        }
    }
}

impl Regressor for DecisionRule {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_with_seed(x, y, self.params.seed)
    }

    fn fit_with_seed(&mut self, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<()> {
        let data = check_fit_input(x, y)?;
        let rows = data.all_rows();
        let finder = finder_for(&self.params.splitter);

        let mut root = TreeNode::Leaf {
            value: data.mean(&rows)?,
        };
        let found = if data.all_targets_equal(&rows) {
            None
        } else {
            finder.find_best_split(&data, &rows, FeatureSelection::All, seed)
        };
        if let Some(split) = found {
            let (left, right) = data.partition(&rows, split.feature, split.threshold);
            if !left.is_empty() && !right.is_empty() {
                root = TreeNode::Internal {
                    split,
                    left: Box::new(TreeNode::Leaf {
                        value: data.mean(&left)?,
                    }),
                    right: Box::new(TreeNode::Leaf {
                        value: data.mean(&right)?,
                    }),
                };
            }
        }

        let tree = Tree::from_root(root, data.n_features());
        debug!(split = tree.depth() == 1, rows = data.n_rows(), "fitted decision rule");
        self.tree = Some(tree);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let tree = self.tree.as_ref().ok_or(WoodsError::NotFitted)?;
        let view = x.view();
        check_predict_input(&view, tree.n_features())?;
        Ok(tree.predict_view(&view))
    }

    fn is_fitted(&self) -> bool {
        self.tree.is_some()
    }

    fn n_features(&self) -> Option<usize> {
        self.tree.as_ref().map(Tree::n_features)
    }
}
