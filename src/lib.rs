pub mod data;
pub mod ensemble;
pub mod error;
pub mod estimator;
pub mod params;
pub mod split;
pub mod store;
pub mod tree;

// Re-export commonly used types at crate root
pub use ensemble::{AveragedLayer, DeepGradientBoosting, GradientBoosting};
pub use error::{Result, WoodsError};
pub use estimator::Regressor;
pub use params::{
    BoostingParams, DeepBoostingParams, MaxFeatures, RandomizedConfig, RuleParams, SplitStrategy,
    ThresholdSampling, TreeParams,
};
pub use split::{GreedySplitFinder, RandomizedSplitFinder, Split, SplitFinder};
pub use store::{load_any, Model, ModelKind, Persist, SerializationFormat};
pub use tree::{DecisionRule, DecisionTree, Tree, TreeNode};
