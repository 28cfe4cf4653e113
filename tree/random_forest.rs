use crate::{compute_feature_importances, train_tree, TrainProgress, Tree, TreeOptions};
use grove_dataset::{check_prediction_shape, invalid_config, DatasetView, Result};
use grove_progress::ProgressCounter;
use log::{debug, info};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::index::sample, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// These are the options passed to `RandomForest::train`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForestOptions {
	/// This is the number of trees to train. It must be at least 1.
	pub n_trees: usize,
	/// The depth of a single tree will never exceed this value.
	pub max_depth: usize,
	/// A node with fewer than this many training examples will not be split.
	pub min_examples_split: usize,
	/// A split will only be considered valid if each of the resulting children receives at least this many training examples.
	pub min_examples_per_child: usize,
	/// A node will only be split if the best split reduces the variance of the targets by more than this value.
	pub min_gain_to_split: f32,
	/// Each tree searches for splits in a random subset of this many columns. If `None`, every tree uses every column.
	pub max_features: Option<usize>,
	/// If true, each tree is trained on a sample of the rows drawn with replacement. If false, each tree is trained on every row.
	pub bootstrap: bool,
	/// Tree `i` draws its rows and columns from a random number generator seeded with `seed + i`, so training is reproducible regardless of how trees are scheduled across threads.
	pub seed: u64,
}

impl Default for RandomForestOptions {
	fn default() -> Self {
		Self {
			n_trees: 100,
			max_depth: 10,
			min_examples_split: 2,
			min_examples_per_child: 1,
			min_gain_to_split: 0.0,
			max_features: None,
			bootstrap: true,
			seed: 42,
		}
	}
}

impl RandomForestOptions {
	/// Check the options against a dataset with `n_features` columns and return the number of columns each tree will search.
	pub fn validate(&self, n_features: usize) -> Result<usize> {
		if self.n_trees == 0 {
			return Err(invalid_config("n_trees must be at least 1"));
		}
		self.tree_options().validate()?;
		match self.max_features {
			None => Ok(n_features),
			Some(max_features) if max_features == 0 => {
				Err(invalid_config("max_features must be at least 1"))
			}
			Some(max_features) if max_features > n_features => Err(invalid_config(format!(
				"max_features is {} but the dataset only has {} features",
				max_features, n_features
			))),
			Some(max_features) => Ok(max_features),
		}
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

/// A `RandomForest` predicts the unweighted mean of its trees' outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
	/// The trees for this model.
	pub trees: Vec<Tree>,
	/// The number of features the model was trained with.
	pub n_features: usize,
	/// The importance of each feature as measured by the number of times the feature was used in a branch node.
	pub feature_importances: Vec<f32>,
}

impl RandomForest {
	/// Train a random forest. The trees share no state, so they are trained in parallel on the rayon thread pool.
	pub fn train(
		dataset: DatasetView,
		options: &RandomForestOptions,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<RandomForest> {
		let n_features = dataset.ncols();
		let max_features = options.validate(n_features)?;
		let features = dataset.features();
		let targets = dataset.targets().to_vec();
		let n_examples = dataset.nrows();
		info!(
			"training a random forest of {} trees on {} examples with {} of {} features per tree",
			options.n_trees, n_examples, max_features, n_features,
		);
		let tree_options = options.tree_options();
		let tree_counter = ProgressCounter::new(options.n_trees.to_u64().unwrap());
		update_progress(TrainProgress(tree_counter.clone()));
		let trees = (0..options.n_trees)
			.into_par_iter()
			.map(|tree_index| {
				let mut rng =
					Xoshiro256Plus::seed_from_u64(options.seed.wrapping_add(tree_index as u64));
				let examples_index = if options.bootstrap {
					(0..n_examples)
						.map(|_| rng.gen_range(0, n_examples))
						.collect::<Vec<_>>()
				} else {
					(0..n_examples).collect::<Vec<_>>()
				};
				let mut feature_indices = if max_features == n_features {
					(0..n_features).collect::<Vec<_>>()
				} else {
					sample(&mut rng, n_features, max_features).into_vec()
				};
				// Searching columns in ascending order keeps ties resolved the same way as in a single tree.
				feature_indices.sort_unstable();
				let tree = train_tree(
					features,
					&targets,
					examples_index,
					&feature_indices,
					&tree_options,
				);
				debug!(
					"tree {} was trained on features {:?} and has {} nodes",
					tree_index,
					feature_indices,
					tree.nodes.len()
				);
				tree_counter.inc(1);
				tree
			})
			.collect::<Vec<_>>();
		let feature_importances = compute_feature_importances(&trees, n_features);
		info!("finished training the random forest");
		Ok(RandomForest {
			trees,
			n_features,
			feature_importances,
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
		sum / self.trees.len().to_f32().unwrap()
	}
}

#[cfg(test)]
fn toy_dataset() -> grove_dataset::Dataset {
	let n = 50;
	let features = Array2::from_shape_fn((n, 3), |(i, j)| ((i * (j + 3)) % 17) as f32);
	let targets = Array1::from_shape_fn(n, |i| {
		let x0 = ((i * 3) % 17) as f32;
		let x2 = ((i * 5) % 17) as f32;
		x0 * 2.0 - x2 + if x0 > 8.0 { 5.0 } else { 0.0 }
	});
	grove_dataset::Dataset::new(features, targets).unwrap()
}

#[cfg(test)]
fn predict(model: &RandomForest, features: ArrayView2<f32>) -> Vec<f32> {
	let mut predictions = vec![0.0; features.nrows()];
	model.predict(features, &mut predictions).unwrap();
	predictions
}

#[test]
fn test_single_tree_without_sampling_matches_train_tree() {
	let dataset = toy_dataset();
	let options = RandomForestOptions {
		n_trees: 1,
		max_depth: 4,
		min_examples_split: 3,
		max_features: Some(3),
		bootstrap: false,
		..Default::default()
	};
	let forest = RandomForest::train(dataset.view(), &options, &mut |_| {}).unwrap();
	let tree = train_tree(
		dataset.features(),
		dataset.targets().as_slice().unwrap(),
		(0..dataset.nrows()).collect(),
		&[0, 1, 2],
		&options.tree_options(),
	);
	assert_eq!(forest.trees, vec![tree.clone()]);
	let predictions = predict(&forest, dataset.features());
	for (prediction, row) in predictions.iter().zip(dataset.features().axis_iter(Axis(0))) {
		assert_eq!(*prediction, tree.predict(row));
	}
}

#[test]
fn test_training_is_reproducible() {
	let dataset = toy_dataset();
	let options = RandomForestOptions {
		n_trees: 8,
		max_features: Some(2),
		..Default::default()
	};
	let a = RandomForest::train(dataset.view(), &options, &mut |_| {}).unwrap();
	let b = RandomForest::train(dataset.view(), &options, &mut |_| {}).unwrap();
	assert_eq!(a, b);
	let c = RandomForest::train(
		dataset.view(),
		&RandomForestOptions { seed: 7, ..options },
		&mut |_| {},
	)
	.unwrap();
	assert_ne!(a.trees, c.trees);
}

#[test]
fn test_predictions() {
	let dataset = toy_dataset();
	let mut counters = Vec::new();
	let forest = RandomForest::train(
		dataset.view(),
		&RandomForestOptions {
			n_trees: 20,
			..Default::default()
		},
		&mut |TrainProgress(counter)| counters.push(counter),
	)
	.unwrap();
	assert_eq!(counters[0].get(), 20);
	assert_eq!(forest.trees.len(), 20);
	let predictions = predict(&forest, dataset.features());
	assert_eq!(predictions.len(), dataset.nrows());
	let mse = predictions
		.iter()
		.zip(dataset.targets().iter())
		.map(|(prediction, target)| (prediction - target).powi(2))
		.sum::<f32>()
		/ dataset.nrows() as f32;
	let mean = dataset.targets().mean().unwrap();
	let variance = dataset
		.targets()
		.iter()
		.map(|target| (target - mean).powi(2))
		.sum::<f32>()
		/ dataset.nrows() as f32;
	assert!(mse < variance);
	let total: f32 = forest.feature_importances.iter().sum();
	assert!((total - 1.0).abs() < 1e-5);
}

#[test]
fn test_invalid_options() {
	let dataset = toy_dataset();
	for options in &[
		RandomForestOptions {
			n_trees: 0,
			..Default::default()
		},
		RandomForestOptions {
			max_features: Some(0),
			..Default::default()
		},
		RandomForestOptions {
			max_features: Some(4),
			..Default::default()
		},
	] {
		assert!(matches!(
			RandomForest::train(dataset.view(), options, &mut |_| {}),
			Err(grove_dataset::Error::InvalidConfig(_))
		));
	}
}
