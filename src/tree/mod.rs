//! Binary regression trees.
//!
//! A tree is grown top-down over row-index subsets. Each node either stops
//! (depth bound, too few rows, constant target, or no split with positive
//! gain) and becomes a leaf holding the mean target of its rows, or asks the
//! configured [`SplitFinder`](crate::split::SplitFinder) for a split and
//! recurses into both halves. Nodes own their children; there is no sharing
//! between subtrees.
//!
//! On disk a tree is a flat, pre-ordered node list where internal nodes name
//! their children by index, so stored depth is not limited by the nesting
//! depth a deserializer accepts.

pub mod rule;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, trace};

use crate::data::{DatasetView, FeatureSelection};
use crate::error::{Result, WoodsError};
use crate::estimator::{check_fit_input, check_predict_input, Regressor};
use crate::params::TreeParams;
use crate::split::{finder_for, Split, SplitFinder};

pub use rule::DecisionRule;

/// Below this many rows prediction stays on the calling thread.
pub(crate) const PARALLEL_MIN_ROWS: usize = 2_048;

/// A node of a fitted tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Internal {
        split: Split,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    /// Route one row to its leaf.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Internal { split, left, right } => {
                    node = if split.goes_left(row[split.feature]) {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 0)];
        while let Some((node, depth)) = pending.pop() {
            match node {
                TreeNode::Leaf { .. } => deepest = deepest.max(depth),
                TreeNode::Internal { left, right, .. } => {
                    pending.push((&**left, depth + 1));
                    pending.push((&**right, depth + 1));
                }
            }
        }
        deepest
    }

    pub fn n_leaves(&self) -> usize {
        let mut leaves = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                TreeNode::Leaf { .. } => leaves += 1,
                TreeNode::Internal { left, right, .. } => {
                    pending.push(&**left);
                    pending.push(&**right);
                }
            }
        }
        leaves
    }

    /// Structural checks for a node tree read back from storage.
    pub(crate) fn validate(&self, n_features: usize) -> Result<()> {
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(WoodsError::Format(format!(
                            "leaf value {value} is not finite"
                        )));
                    }
                }
                TreeNode::Internal { split, left, right } => {
                    if split.feature >= n_features {
                        return Err(WoodsError::Format(format!(
                            "split feature {} out of range for {} features",
                            split.feature, n_features
                        )));
                    }
                    if !split.threshold.is_finite() || !(split.gain >= 0.0) {
                        return Err(WoodsError::Format(format!(
                            "split on feature {} has threshold {} and gain {}",
                            split.feature, split.threshold, split.gain
                        )));
                    }
                    pending.push(&**left);
                    pending.push(&**right);
                }
            }
        }
        Ok(())
    }
}

/// Stored form of a node: children are indices into the node list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StoredNode {
    Leaf { value: f64 },
    Internal { split: Split, left: usize, right: usize },
}

/// Stored form of a [`Tree`]: nodes in pre-order, root first.
#[derive(Debug, Serialize, Deserialize)]
struct StoredTree {
    nodes: Vec<StoredNode>,
    n_features: usize,
}

impl From<&Tree> for StoredTree {
    fn from(tree: &Tree) -> Self {
        let mut nodes: Vec<StoredNode> = Vec::new();
        // (node, parent index, is left child)
        let mut pending: Vec<(&TreeNode, Option<(usize, bool)>)> = vec![(&tree.root, None)];
        while let Some((node, parent)) = pending.pop() {
            let index = nodes.len();
            if let Some((p, is_left)) = parent {
                if let StoredNode::Internal { left, right, .. } = &mut nodes[p] {
                    if is_left {
                        *left = index;
                    } else {
                        *right = index;
                    }
                }
            }
            match node {
                TreeNode::Leaf { value } => nodes.push(StoredNode::Leaf { value: *value }),
                TreeNode::Internal { split, left, right } => {
                    nodes.push(StoredNode::Internal {
                        split: *split,
                        left: 0,
                        right: 0,
                    });
                    pending.push((&**right, Some((index, false))));
                    pending.push((&**left, Some((index, true))));
                }
            }
        }
        StoredTree {
            nodes,
            n_features: tree.n_features,
        }
    }
}

impl TryFrom<StoredTree> for Tree {
    type Error = String;

    /// Rebuild the owned node tree bottom-up. Every node but the root must be
    /// the child of exactly one node that comes before it.
    fn try_from(stored: StoredTree) -> std::result::Result<Self, Self::Error> {
        let n = stored.nodes.len();
        if n == 0 {
            return Err("tree has no nodes".into());
        }
        let mut built: Vec<Option<TreeNode>> = Vec::with_capacity(n);
        built.resize_with(n, || None);
        for index in (0..n).rev() {
            let node = match stored.nodes[index] {
                StoredNode::Leaf { value } => TreeNode::Leaf { value },
                StoredNode::Internal { split, left, right } => {
                    if left <= index || right <= index || left >= n || right >= n {
                        return Err(format!(
                            "node {index} has children {left} and {right} outside {}..{n}",
                            index + 1
                        ));
                    }
                    let left = built[left]
                        .take()
                        .ok_or_else(|| format!("node {left} has more than one parent"))?;
                    let right = built[right]
                        .take()
                        .ok_or_else(|| format!("node {right} has more than one parent"))?;
                    TreeNode::Internal {
                        split,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
            };
            built[index] = Some(node);
        }
        if let Some(orphan) = built.iter().skip(1).position(Option::is_some) {
            return Err(format!("node {} is not reachable from the root", orphan + 1));
        }
        let root = built[0]
            .take()
            .ok_or_else(|| String::from("tree has no root"))?;
        Ok(Tree::from_root(root, stored.n_features))
    }
}

/// The fitted part of a tree: its nodes and the column count it expects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "StoredTree")]
pub struct Tree {
    root: TreeNode,
    n_features: usize,
}

impl Tree {
    pub(crate) fn from_root(root: TreeNode, n_features: usize) -> Self {
        Tree { root, n_features }
    }

    /// Grow a tree on `data` starting from every row.
    pub(crate) fn grow(params: &TreeParams, data: &DatasetView<'_>, seed: u64) -> Result<Self> {
        let grower = Grower {
            data,
            finder: finder_for(&params.splitter),
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
        };
        let root = grower.grow(data.all_rows(), 0, seed)?;
        Ok(Tree::from_root(root, data.n_features()))
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn n_leaves(&self) -> usize {
        self.root.n_leaves()
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.root.predict_row(row)
    }

    /// Predict every row; the caller has checked the column count.
    pub(crate) fn predict_view(&self, x: &ArrayView2<'_, f64>) -> Array1<f64> {
        if x.nrows() >= PARALLEL_MIN_ROWS {
            let values: Vec<f64> = (0..x.nrows())
                .into_par_iter()
                .map(|i| self.root.predict_row(x.row(i)))
                .collect();
            Array1::from(values)
        } else {
            x.rows()
                .into_iter()
                .map(|row| self.root.predict_row(row))
                .collect()
        }
    }

    pub(crate) fn validate(&self, max_depth: usize) -> Result<()> {
        let depth = self.depth();
        if depth > max_depth {
            return Err(WoodsError::Format(format!(
                "tree depth {depth} exceeds max_depth {max_depth}"
            )));
        }
        self.root.validate(self.n_features)
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        StoredTree::from(self).serialize(serializer)
    }
}

struct Grower<'a, 'd> {
    data: &'a DatasetView<'d>,
    finder: Box<dyn SplitFinder>,
    max_depth: usize,
    min_samples_split: usize,
}

impl Grower<'_, '_> {
    fn grow(&self, rows: Vec<usize>, depth: usize, seed: u64) -> Result<TreeNode> {
        let value = self.data.mean(&rows)?;
        if depth >= self.max_depth
            || rows.len() < self.min_samples_split
            || self.data.all_targets_equal(&rows)
        {
            return Ok(TreeNode::Leaf { value });
        }

        let Some(split) =
            self.finder
                .find_best_split(self.data, &rows, FeatureSelection::All, seed)
        else {
            return Ok(TreeNode::Leaf { value });
        };
        let (left_rows, right_rows) = self.data.partition(&rows, split.feature, split.threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return Ok(TreeNode::Leaf { value });
        }
        trace!(
            depth,
            feature = split.feature,
            threshold = split.threshold,
            gain = split.gain,
            left = left_rows.len(),
            right = right_rows.len(),
            "split node"
        );

        let mut rng = StdRng::seed_from_u64(seed);
        let (left_seed, right_seed): (u64, u64) = (rng.random(), rng.random());
        drop(rows);
        let left = self.grow(left_rows, depth + 1, left_seed)?;
        let right = self.grow(right_rows, depth + 1, right_seed)?;
        Ok(TreeNode::Internal {
            split,
            left: Box::new(left),
            right: Box::new(right),
        })
    }
}

/// Decision tree regressor.
///
/// The split strategy in [`TreeParams::splitter`] selects the greedy or the
/// randomized variant; the induction is otherwise identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    params: TreeParams,
    tree: Option<Tree>,
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Result<Self> {
        params.validate()?;
        Ok(DecisionTree { params, tree: None })
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Replace the hyperparameters. Any fitted state is discarded.
    pub fn set_params(&mut self, params: TreeParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        self.tree = None;
        Ok(())
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.params.validate()?;
        match &self.tree {
            Some(tree) => tree.validate(self.params.max_depth),
            None => Err(WoodsError::Format("decision tree has no fitted nodes".into())),
        }
    }
}

impl Regressor for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_with_seed(x, y, self.params.seed)
    }

    fn fit_with_seed(&mut self, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<()> {
        let data = check_fit_input(x, y)?;
        let tree = Tree::grow(&self.params, &data, seed)?;
        debug!(
            depth = tree.depth(),
            leaves = tree.n_leaves(),
            rows = data.n_rows(),
            "fitted decision tree"
        );
        self.tree = Some(tree);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let tree = self.tree.as_ref().ok_or(WoodsError::NotFitted)?;
        let view = x.view();
        check_predict_input(&view, tree.n_features)?;
        Ok(tree.predict_view(&view))
    }

    fn is_fitted(&self) -> bool {
        self.tree.is_some()
    }

    fn n_features(&self) -> Option<usize> {
        self.tree.as_ref().map(Tree::n_features)
    }
}
