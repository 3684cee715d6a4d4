//! Regression demo comparing every model on the same synthetic data.
//!
//! This demo:
//! - Creates synthetic regression data
//! - Trains a decision rule, greedy and randomized trees, gradient boosting
//!   and deep gradient boosting
//! - Reports test RMSE, then saves the boosted model in each file format and
//!   loads it back
//!
//! Run with: RUST_LOG=woods_rs=debug cargo run --example regression

use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;
use woods_rs::{
    load_any, BoostingParams, DecisionRule, DecisionTree, DeepBoostingParams,
    DeepGradientBoosting, GradientBoosting, Persist, RandomizedConfig, Regressor,
    SerializationFormat, TreeParams,
};

fn main() -> woods_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("woods-rs Regression Demo");
    println!("========================\n");

    let n_train = 500;
    let n_test = 100;
    let n_features = 5;
    let true_coef = Array1::from(vec![1.5, -2.3, 0.4, 3.1, -1.1]);
    let mut rng = StdRng::seed_from_u64(42);

    let x_train = Array2::random_using((n_train, n_features), Uniform::new(0., 1.).unwrap(), &mut rng);
    let noise_train = Array1::random_using(n_train, Uniform::new(-0.5, 0.5).unwrap(), &mut rng);
    let y_train = x_train.dot(&true_coef) + &noise_train;

    let x_test = Array2::random_using((n_test, n_features), Uniform::new(0., 1.).unwrap(), &mut rng);
    let noise_test = Array1::random_using(n_test, Uniform::new(-0.5, 0.5).unwrap(), &mut rng);
    let y_test = x_test.dot(&true_coef) + &noise_test;

    println!("Training samples: {}", n_train);
    println!("Test samples: {}", n_test);
    println!("Features: {}", n_features);
    println!();

    let mut rule = DecisionRule::greedy();
    let mut greedy_tree = DecisionTree::new(TreeParams::new(6, 2))?;
    let mut random_tree = DecisionTree::new(
        TreeParams::new(6, 2)
            .randomized(RandomizedConfig::default())
            .with_seed(7),
    )?;
    let mut boosting = GradientBoosting::new(BoostingParams::default())?;
    let mut deep = DeepGradientBoosting::new(
        DeepBoostingParams::uniform(
            3,
            BoostingParams::default()
                .with_n_estimators(40)
                .with_tree(TreeParams::default().randomized(RandomizedConfig::default())),
        )
        .with_layer_width(3),
    )?;

    let models: [(&str, &mut dyn Regressor); 5] = [
        ("decision rule", &mut rule),
        ("greedy tree", &mut greedy_tree),
        ("randomized tree", &mut random_tree),
        ("gradient boosting", &mut boosting),
        ("deep boosting", &mut deep),
    ];

    println!("{:<20} {:>10}", "Model", "Test RMSE");
    println!("{:-<20} {:->10}", "", "");
    for (name, model) in models {
        model.fit(&x_train, &y_train)?;
        let rmse = mean_squared_error(&y_test, &model.predict(&x_test)?).sqrt();
        println!("{:<20} {:>10.4}", name, rmse);
    }
    println!();

    for format in SerializationFormat::ALL {
        let path = std::env::temp_dir().join(format!("woods-demo-boosting.{format}"));
        boosting.save_model_as(&path, format)?;
        let restored = load_any(&path)?;
        let identical = restored.predict(&x_test)? == boosting.predict(&x_test)?;
        println!(
            "Saved {} model as {} to {} (reload identical: {})",
            restored.kind(),
            format,
            path.display(),
            identical
        );
        std::fs::remove_file(&path)?;
    }

    Ok(())
}

fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(|a| a.powi(2)).mean().unwrap_or(0.0)
}
