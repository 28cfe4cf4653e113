use crate::{compute_feature_importances, train_tree, TrainProgress, Tree, TreeOptions};
use grove_dataset::{check_prediction_shape, invalid_config, DatasetView, Error, Result};
use grove_metrics::{MeanSquaredError, StreamingMetric};
use grove_progress::ProgressCounter;
use grove_util::{finite::all_finite, pzip};
use itertools::izip;
use log::{debug, info, warn};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// These are the options passed to `GradientBoosting::train`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingOptions {
	/// This is the number of rounds of training. One tree is trained per round. With 0 rounds, the model predicts the mean of the training targets.
	pub max_rounds: usize,
	/// The learning rate scales the output of each tree to control the effect each tree has on the prediction. It must be in (0, 1].
	pub learning_rate: f32,
	/// The depth of a single tree will never exceed this value.
	pub max_depth: usize,
	/// A node with fewer than this many training examples will not be split.
	pub min_examples_split: usize,
	/// A split will only be considered valid if each of the resulting children receives at least this many training examples.
	pub min_examples_per_child: usize,
	/// A node will only be split if the best split reduces the variance of the residuals by more than this value.
	pub min_gain_to_split: f32,
	/// If true, the model will include the mean squared error on the training data after each round.
	pub compute_loss: bool,
}

impl Default for GradientBoostingOptions {
	fn default() -> Self {
		Self {
			max_rounds: 100,
			learning_rate: 0.1,
			max_depth: 3,
			min_examples_split: 2,
			min_examples_per_child: 1,
			min_gain_to_split: 0.0,
			compute_loss: false,
		}
	}
}

impl GradientBoostingOptions {
	pub fn validate(&self) -> Result<()> {
		if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
			return Err(invalid_config(format!(
				"learning_rate must be in (0, 1] but is {}",
				self.learning_rate
			)));
		}
		self.tree_options().validate()
	}

	pub fn tree_options(&self) -> TreeOptions {
		TreeOptions {
			max_depth: self.max_depth,
			min_examples_split: self.min_examples_split,
			min_examples_per_child: self.min_examples_per_child,
			min_gain_to_split: self.min_gain_to_split,
		}
	}
}

/// A `GradientBoosting` model predicts the mean of the training targets plus the sum of its trees' outputs, each scaled by the learning rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
	/// The initial prediction of the model given no trained trees, the mean of the training targets.
	pub bias: f32,
	/// The learning rate the trees were trained with. It scales every tree's output at prediction time.
	pub learning_rate: f32,
	/// The trees for this model, in the order they were trained.
	pub trees: Vec<Tree>,
	/// The number of features the model was trained with.
	pub n_features: usize,
	/// The importance of each feature as measured by the number of times the feature was used in a branch node.
	pub feature_importances: Vec<f32>,
	/// The mean squared error on the training data after each round, if `compute_loss` was set.
	pub losses: Option<Vec<f32>>,
}

impl GradientBoosting {
	/// Train a gradient boosting model. Each round fits a tree to the residuals left by all previous rounds, so rounds run one after another. Within a round, residuals and predictions are updated in parallel across examples.
	pub fn train(
		dataset: DatasetView,
		options: &GradientBoostingOptions,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<GradientBoosting> {
		options.validate()?;
		let features = dataset.features();
		let targets = dataset.targets().to_vec();
		let n_examples = dataset.nrows();
		let n_features = dataset.ncols();
		info!(
			"training gradient boosting for {} rounds on {} examples with {} features",
			options.max_rounds, n_examples, n_features,
		);
		let bias = compute_bias(&targets);
		let learning_rate = options.learning_rate;
		let tree_options = options.tree_options();
		let feature_indices = (0..n_features).collect::<Vec<_>>();
		let mut predictions = vec![bias; n_examples];
		let mut residuals = vec![0.0; n_examples];
		let mut trees = Vec::with_capacity(options.max_rounds);
		let mut losses = if options.compute_loss {
			Some(Vec::with_capacity(options.max_rounds))
		} else {
			None
		};
		let round_counter = ProgressCounter::new(options.max_rounds.to_u64().unwrap());
		update_progress(TrainProgress(round_counter.clone()));
		for round_index in 0..options.max_rounds {
			// The residuals are the negative gradients of the squared error loss.
			pzip!(&mut residuals, &targets, &predictions).for_each(
				|(residual, target, prediction)| {
					*residual = target - prediction;
				},
			);
			let tree = train_tree(
				features,
				&residuals,
				(0..n_examples).collect(),
				&feature_indices,
				&tree_options,
			);
			// Update the predictions with the most recently trained tree.
			predictions
				.par_iter_mut()
				.enumerate()
				.for_each(|(example_index, prediction)| {
					*prediction += learning_rate * tree.predict(features.row(example_index));
				});
			if all_finite(predictions.iter()).is_err() {
				warn!(
					"gradient boosting predictions stopped being finite in round {}",
					round_index
				);
				return Err(Error::NumericInstability {
					stage: "boosting round",
					step: round_index,
				});
			}
			if let Some(losses) = losses.as_mut() {
				losses.push(compute_loss(&targets, &predictions));
			}
			debug!(
				"round {} trained a tree with {} nodes",
				round_index,
				tree.nodes.len()
			);
			trees.push(tree);
			round_counter.inc(1);
		}
		let feature_importances = compute_feature_importances(&trees, n_features);
		info!("finished training gradient boosting");
		Ok(GradientBoosting {
			bias,
			learning_rate,
			trees,
			n_features,
			feature_importances,
			losses,
		})
	}

	/// Write predictions into `predictions` for the input `features`. Rows are predicted in parallel.
	pub fn predict(&self, features: ArrayView2<f32>, predictions: &mut [f32]) -> Result<()> {
		check_prediction_shape(features, self.n_features, predictions.len())?;
		predictions
			.par_iter_mut()
			.enumerate()
			.for_each(|(example_index, prediction)| {
				*prediction = self.predict_row(features.row(example_index));
			});
		Ok(())
	}

	/// Make a prediction for a single example.
	pub fn predict_row(&self, features: ArrayView1<f32>) -> f32 {
		let sum: f32 = self.trees.iter().map(|tree| tree.predict(features)).sum();
		self.bias + self.learning_rate * sum
	}
}

/// The bias is the mean of the targets.
fn compute_bias(targets: &[f32]) -> f32 {
	let sum: f64 = targets.iter().map(|target| target.to_f64().unwrap()).sum();
	(sum / targets.len().to_f64().unwrap()) as f32
}

fn compute_loss(targets: &[f32], predictions: &[f32]) -> f32 {
	let mut metric = MeanSquaredError::default();
	for (prediction, target) in izip!(predictions, targets) {
		metric.update((*prediction, *target));
	}
	metric.finalize().unwrap_or(f32::NAN)
}

#[cfg(test)]
fn dataset(features: Array2<f32>, targets: Array1<f32>) -> grove_dataset::Dataset {
	grove_dataset::Dataset::new(features, targets).unwrap()
}

#[cfg(test)]
fn predict(model: &GradientBoosting, features: ArrayView2<f32>) -> Vec<f32> {
	let mut predictions = vec![0.0; features.nrows()];
	model.predict(features, &mut predictions).unwrap();
	predictions
}

#[test]
fn test_zero_rounds_predict_the_mean() {
	let dataset = dataset(
		arr2(&[[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [10.0, 1.0]]),
		arr1(&[1.0, 2.0, 3.0, 6.0]),
	);
	let model = GradientBoosting::train(
		dataset.view(),
		&GradientBoostingOptions {
			max_rounds: 0,
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	assert!(model.trees.is_empty());
	assert_eq!(model.bias, 3.0);
	let predictions = predict(&model, arr2(&[[0.0, 0.0], [50.0, 1.0], [2.0, 2.0]]).view());
	assert_eq!(predictions, vec![3.0, 3.0, 3.0]);
}

#[test]
fn test_fits_a_line() {
	let dataset = dataset(arr2(&[[1.0], [2.0], [3.0], [4.0]]), arr1(&[2.0, 4.0, 6.0, 8.0]));
	let model = GradientBoosting::train(
		dataset.view(),
		&GradientBoostingOptions {
			max_rounds: 20,
			learning_rate: 0.3,
			max_depth: 3,
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	let predictions = predict(&model, dataset.features());
	assert_eq!(predictions.len(), 4);
	for (prediction, target) in predictions.iter().zip(&[2.0, 4.0, 6.0, 8.0]) {
		assert!((prediction - target).abs() < 0.5);
	}
	assert_eq!(model.trees.len(), 20);
	assert_eq!(model.feature_importances, vec![1.0]);
}

#[test]
fn test_training_loss_does_not_increase() {
	let n = 40;
	let features = Array2::from_shape_fn((n, 2), |(i, j)| {
		if j == 0 {
			i as f32
		} else {
			(i % 5) as f32
		}
	});
	let targets = Array1::from_shape_fn(n, |i| (i as f32 / 6.0).cos() * 3.0 + (i % 5) as f32);
	let dataset = dataset(features, targets);
	let model = GradientBoosting::train(
		dataset.view(),
		&GradientBoostingOptions {
			max_rounds: 30,
			learning_rate: 0.1,
			max_depth: 2,
			compute_loss: true,
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	let losses = model.losses.unwrap();
	assert_eq!(losses.len(), 30);
	for window in losses.windows(2) {
		assert!(window[1] <= window[0] + 1e-5);
	}
	assert!(losses[29] < losses[0]);
}

#[test]
fn test_progress() {
	let dataset = dataset(arr2(&[[1.0], [2.0]]), arr1(&[1.0, 2.0]));
	let mut counters = Vec::new();
	GradientBoosting::train(
		dataset.view(),
		&GradientBoostingOptions {
			max_rounds: 7,
			..Default::default()
		},
		&mut |TrainProgress(counter)| counters.push(counter),
	)
	.unwrap();
	assert_eq!(counters.len(), 1);
	assert_eq!(counters[0].get(), 7);
	assert_eq!(counters[0].total(), 7);
}

#[test]
fn test_invalid_learning_rate() {
	let dataset = dataset(arr2(&[[1.0], [2.0]]), arr1(&[1.0, 2.0]));
	for learning_rate in &[0.0, -0.1, 1.5, f32::NAN] {
		let result = GradientBoosting::train(
			dataset.view(),
			&GradientBoostingOptions {
				learning_rate: *learning_rate,
				..Default::default()
			},
			&mut |_| {},
		);
		assert!(matches!(result, Err(Error::InvalidConfig(_))));
	}
}

#[test]
fn test_numeric_instability() {
	// The residuals of targets near f32::MAX overflow in the first round.
	let dataset = dataset(
		arr2(&[[1.0], [2.0], [3.0]]),
		arr1(&[3.4e38, 3.4e38, -3.4e38]),
	);
	let result = GradientBoosting::train(dataset.view(), &Default::default(), &mut |_| {});
	assert_eq!(
		result,
		Err(Error::NumericInstability {
			stage: "boosting round",
			step: 0,
		})
	);
}

#[test]
fn test_predict_shape_errors() {
	let dataset = dataset(arr2(&[[1.0, 2.0], [2.0, 3.0]]), arr1(&[1.0, 2.0]));
	let model = GradientBoosting::train(dataset.view(), &Default::default(), &mut |_| {}).unwrap();
	let mut predictions = vec![0.0; 2];
	assert_eq!(
		model.predict(arr2(&[[1.0], [2.0]]).view(), &mut predictions),
		Err(Error::FeatureCountMismatch {
			expected: 2,
			actual: 1,
		})
	);
	let mut predictions = vec![0.0; 3];
	assert_eq!(
		model.predict(dataset.features(), &mut predictions),
		Err(Error::PredictionsLengthMismatch {
			expected: 2,
			actual: 3,
		})
	);
}

#[test]
fn test_serialize() {
	let dataset = dataset(arr2(&[[1.0], [2.0], [3.0]]), arr1(&[1.0, 5.0, 2.0]));
	let model = GradientBoosting::train(dataset.view(), &Default::default(), &mut |_| {}).unwrap();
	let json = serde_json::to_string(&model).unwrap();
	let deserialized: GradientBoosting = serde_json::from_str(&json).unwrap();
	assert_eq!(
		predict(&model, dataset.features()),
		predict(&deserialized, dataset.features())
	);
}
