use anyhow::{bail, Result};
use clap::Parser;
use grove_dataset::Dataset;
use grove_ensemble::{
	BlendingOptions, ModelOptions, Regressor, StackingOptions, TrainProgress, VotingOptions,
};
use grove_neural::{Activation, NeuralNetworkOptions};
use grove_tree::{GradientBoostingOptions, RandomForestOptions};
use log::{debug, info};
use ndarray::prelude::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde_json::json;
use std::{str::FromStr, time::Instant};

#[derive(Parser)]
#[clap(about = "train grove models on a synthetic regression dataset and print their test metrics as json")]
struct Options {
	#[clap(long, default_value = "2000", help = "the number of rows to generate")]
	n_examples: usize,
	#[clap(long, default_value = "6", help = "the number of feature columns, at least 4")]
	n_features: usize,
	#[clap(long, default_value = "0.2", help = "the fraction of rows to test on")]
	test_fraction: f32,
	#[clap(long, default_value = "42")]
	seed: u64,
	#[clap(
		long = "model",
		help = "a model to benchmark: gradient_boosting, random_forest, neural_network, voting, stacking, or blending. defaults to all of them"
	)]
	models: Vec<ModelKind>,
}

#[derive(Clone, Copy, Debug)]
enum ModelKind {
	GradientBoosting,
	RandomForest,
	NeuralNetwork,
	Voting,
	Stacking,
	Blending,
}

impl ModelKind {
	const ALL: [ModelKind; 6] = [
		ModelKind::GradientBoosting,
		ModelKind::RandomForest,
		ModelKind::NeuralNetwork,
		ModelKind::Voting,
		ModelKind::Stacking,
		ModelKind::Blending,
	];

	fn name(self) -> &'static str {
		match self {
			ModelKind::GradientBoosting => "gradient_boosting",
			ModelKind::RandomForest => "random_forest",
			ModelKind::NeuralNetwork => "neural_network",
			ModelKind::Voting => "voting",
			ModelKind::Stacking => "stacking",
			ModelKind::Blending => "blending",
		}
	}

	fn model_options(self, n_features: usize, seed: u64) -> ModelOptions {
		let gradient_boosting = ModelOptions::GradientBoosting(GradientBoostingOptions {
			max_rounds: 200,
			learning_rate: 0.1,
			max_depth: 4,
			..Default::default()
		});
		let random_forest = ModelOptions::RandomForest(RandomForestOptions {
			n_trees: 50,
			max_features: Some((n_features / 2).max(1)),
			seed,
			..Default::default()
		});
		let neural_network = ModelOptions::NeuralNetwork(NeuralNetworkOptions {
			layer_sizes: vec![n_features, 32, 16, 1],
			activation: Activation::Relu,
			output_activation: Some(Activation::Identity),
			learning_rate: 0.005,
			max_epochs: 200,
			n_examples_per_batch: 32,
			seed,
			..Default::default()
		});
		match self {
			ModelKind::GradientBoosting => gradient_boosting,
			ModelKind::RandomForest => random_forest,
			ModelKind::NeuralNetwork => neural_network,
			ModelKind::Voting => ModelOptions::Voting(VotingOptions {
				models: vec![gradient_boosting, random_forest],
			}),
			ModelKind::Stacking => ModelOptions::Stacking(StackingOptions {
				models: vec![gradient_boosting, random_forest, neural_network],
				..Default::default()
			}),
			ModelKind::Blending => ModelOptions::Blending(BlendingOptions {
				models: vec![gradient_boosting, random_forest, neural_network],
				..Default::default()
			}),
		}
	}
}

impl FromStr for ModelKind {
	type Err = String;

	fn from_str(s: &str) -> Result<ModelKind, String> {
		ModelKind::ALL
			.iter()
			.cloned()
			.find(|kind| kind.name() == s)
			.ok_or_else(|| format!("unknown model {:?}", s))
	}
}

fn main() -> Result<()> {
	env_logger::init();
	let options = Options::parse();
	if options.n_features < 4 {
		bail!("n_features must be at least 4");
	}
	if !(options.test_fraction > 0.0 && options.test_fraction < 1.0) {
		bail!("test_fraction must be in (0, 1)");
	}
	let dataset = synthetic_dataset(options.n_examples, options.n_features, options.seed)?;
	let (dataset_train, dataset_test) = dataset.view().split_at_fraction(options.test_fraction);
	if dataset_train.nrows() == 0 || dataset_test.nrows() == 0 {
		bail!("n_examples is too small to split into train and test rows");
	}
	let model_kinds = if options.models.is_empty() {
		ModelKind::ALL.to_vec()
	} else {
		options.models.clone()
	};
	let mut outputs = Vec::with_capacity(model_kinds.len());
	for model_kind in model_kinds {
		let model_options = model_kind.model_options(options.n_features, options.seed);
		info!("benchmarking {}", model_kind.name());
		let start = Instant::now();
		let model = model_options.train(dataset_train, &mut |progress| {
			if let TrainProgress::TrainingBaseModel {
				index,
				n_base_models,
			} = progress
			{
				debug!("training base model {} of {}", index + 1, n_base_models);
			}
		})?;
		let duration = start.elapsed();
		let metrics = model.evaluate(dataset_test)?;
		info!(
			"{} trained in {:?} with a test mse of {}",
			model_kind.name(),
			duration,
			metrics.mse
		);
		outputs.push(json!({
			"model": model_kind.name(),
			"training_duration_secs": duration.as_secs_f32(),
			"metrics": metrics,
		}));
	}
	println!("{}", serde_json::to_string_pretty(&outputs)?);
	Ok(())
}

/// Generate rows with features uniform in [-1, 1] and a nonlinear target with a little noise. Only the first four columns affect the target.
fn synthetic_dataset(n_examples: usize, n_features: usize, seed: u64) -> Result<Dataset> {
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	let features =
		Array2::from_shape_fn((n_examples, n_features), |_| rng.gen_range(-1.0f32, 1.0));
	let targets = features
		.axis_iter(Axis(0))
		.map(|row| {
			let signal = (std::f32::consts::PI * row[0]).sin() + 2.0 * row[1] - row[2] * row[2]
				+ 0.5 * row[0] * row[3];
			signal + 0.1 * rng.gen_range(-1.0f32, 1.0)
		})
		.collect::<Array1<f32>>();
	Ok(Dataset::new(features, targets)?)
}
