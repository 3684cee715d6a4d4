//! Hyperparameters for every model type.
//!
//! Each struct is built once (defaults plus `with_*` builders), validated,
//! and then handed to a model constructor. Models never mutate their
//! parameters during fit; replacing them through `set_params` discards any
//! fitted state.
//!
//! All structs derive `serde` so they travel inside persisted models and can
//! be read from a JSON configuration; missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WoodsError};

pub const DEFAULT_TREE_DEPTH: usize = 3;
pub const DEFAULT_MIN_SAMPLES_SPLIT: usize = 2;
pub const DEFAULT_N_ESTIMATORS: usize = 100;
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
pub const DEFAULT_N_LAYERS: usize = 5;
pub const DEFAULT_LAYER_WIDTH: usize = 1;

/// How many features the randomized split finder looks at per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    /// `ceil(sqrt(m))` features.
    Sqrt,
    Count(usize),
}

impl MaxFeatures {
    /// Number of features to sample out of `n_features`, never more than
    /// `n_features` and at least one when any feature exists.
    pub fn resolve(&self, n_features: usize) -> usize {
        if n_features == 0 {
            return 0;
        }
        let k = match *self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Count(k) => k,
        };
        k.clamp(1, n_features)
    }
}

/// How the randomized split finder draws candidate thresholds for a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSampling {
    /// Uniform in `[min, max)` of the feature over the node's rows.
    Uniform,
    /// Normal centred on the range midpoint with sigma `(max - min) / 3`,
    /// redrawn until it lands in `[min, max)`.
    TruncatedNormal,
    /// A random subset of the midpoints between consecutive distinct values.
    Candidates,
    /// The midpoint of `[min, max]`; one threshold, no randomness.
    Mean,
    /// The median of the feature over the node's rows (the mean of the two
    /// middle values for an even count); one threshold, no randomness.
    Median,
}

/// Settings of the randomized split finder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomizedConfig {
    pub max_features: MaxFeatures,
    pub thresholds: ThresholdSampling,
    /// Thresholds drawn per sampled feature. `Mean` and `Median` always
    /// yield a single threshold.
    pub n_thresholds: usize,
}

impl Default for RandomizedConfig {
    fn default() -> Self {
        RandomizedConfig {
            max_features: MaxFeatures::Sqrt,
            thresholds: ThresholdSampling::Uniform,
            n_thresholds: 1,
        }
    }
}

impl RandomizedConfig {
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdSampling) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_n_thresholds(mut self, n_thresholds: usize) -> Self {
        self.n_thresholds = n_thresholds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_thresholds < 1 {
            return Err(WoodsError::InvalidConfig(
                "n_thresholds must be at least 1".into(),
            ));
        }
        if self.max_features == MaxFeatures::Count(0) {
            return Err(WoodsError::InvalidConfig(
                "max_features count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Split search strategy used during induction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Exhaustive search over every feature and every midpoint.
    #[default]
    Greedy,
    /// Sampled features and thresholds, driven by an explicit seed.
    Randomized(RandomizedConfig),
}

impl SplitStrategy {
    pub fn validate(&self) -> Result<()> {
        match self {
            SplitStrategy::Greedy => Ok(()),
            SplitStrategy::Randomized(config) => config.validate(),
        }
    }
}

/// Parameters of a single-split decision rule.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleParams {
    pub splitter: SplitStrategy,
    pub seed: u64,
}

impl RuleParams {
    pub fn with_splitter(mut self, splitter: SplitStrategy) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.splitter.validate()
    }
}

/// Decision tree parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// Maximum depth; a tree of depth 1 is a stump.
    pub max_depth: usize,
    /// Nodes with fewer rows become leaves.
    pub min_samples_split: usize,
    pub splitter: SplitStrategy,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams {
            max_depth: DEFAULT_TREE_DEPTH,
            min_samples_split: DEFAULT_MIN_SAMPLES_SPLIT,
            splitter: SplitStrategy::Greedy,
            seed: 0,
        }
    }
}

impl TreeParams {
    pub fn new(max_depth: usize, min_samples_split: usize) -> Self {
        TreeParams {
            max_depth,
            min_samples_split,
            ..Default::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    pub fn with_splitter(mut self, splitter: SplitStrategy) -> Self {
        self.splitter = splitter;
        self
    }

    /// Shorthand for a randomized splitter with the given settings.
    pub fn randomized(self, config: RandomizedConfig) -> Self {
        self.with_splitter(SplitStrategy::Randomized(config))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth < 1 {
            return Err(WoodsError::InvalidConfig(format!(
                "max_depth must be at least 1, got {}",
                self.max_depth
            )));
        }
        if self.min_samples_split < 2 {
            return Err(WoodsError::InvalidConfig(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        self.splitter.validate()
    }
}

/// Gradient boosting parameters. The tree seed doubles as the seed from
/// which every round's tree seed is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub tree: TreeParams,
    pub n_estimators: usize,
    pub learning_rate: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        BoostingParams {
            tree: TreeParams::default(),
            n_estimators: DEFAULT_N_ESTIMATORS,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

impl BoostingParams {
    pub fn new(tree: TreeParams, n_estimators: usize, learning_rate: f64) -> Self {
        BoostingParams {
            tree,
            n_estimators,
            learning_rate,
        }
    }

    pub fn with_tree(mut self, tree: TreeParams) -> Self {
        self.tree = tree;
        self
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.tree.seed = seed;
        self
    }

    pub fn seed(&self) -> u64 {
        self.tree.seed
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(WoodsError::InvalidConfig(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        self.tree.validate()
    }
}

/// Deep gradient boosting parameters: one boosting configuration per layer,
/// fitted in order. An empty layer list is allowed and predicts zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepBoostingParams {
    pub layers: Vec<BoostingParams>,
    /// Boosting ensembles averaged within each layer.
    #[serde(default = "default_layer_width")]
    pub layer_width: usize,
}

fn default_layer_width() -> usize {
    DEFAULT_LAYER_WIDTH
}

impl Default for DeepBoostingParams {
    fn default() -> Self {
        DeepBoostingParams::uniform(DEFAULT_N_LAYERS, BoostingParams::default())
    }
}

impl DeepBoostingParams {
    pub fn new(layers: Vec<BoostingParams>) -> Self {
        DeepBoostingParams {
            layers,
            layer_width: DEFAULT_LAYER_WIDTH,
        }
    }

    /// `n_layers` copies of `layer`, layer `i` seeded with `layer.seed() + i`.
    pub fn uniform(n_layers: usize, layer: BoostingParams) -> Self {
        let base = layer.seed();
        let layers = (0..n_layers)
            .map(|i| layer.with_seed(base.wrapping_add(i as u64)))
            .collect();
        DeepBoostingParams::new(layers)
    }

    pub fn with_layer_width(mut self, layer_width: usize) -> Self {
        self.layer_width = layer_width;
        self
    }

    /// Reseed every layer from `seed`, layer `i` getting `seed + i`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.tree.seed = seed.wrapping_add(i as u64);
        }
        self
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.layer_width < 1 {
            return Err(WoodsError::InvalidConfig(
                "layer_width must be at least 1".into(),
            ));
        }
        self.layers.iter().try_for_each(BoostingParams::validate)
    }
}
