use crate::{
	BlendingEnsemble, BlendingOptions, Regressor, StackingEnsemble, StackingOptions,
	VotingEnsemble, VotingOptions,
};
use grove_dataset::{DatasetView, Result};
use grove_neural::{NeuralNetwork, NeuralNetworkOptions};
use grove_tree::{GradientBoosting, GradientBoostingOptions, RandomForest, RandomForestOptions};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// The options for every kind of model this crate can train. Ensembles hold the options of their base models, so ensembles can be nested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ModelOptions {
	GradientBoosting(GradientBoostingOptions),
	RandomForest(RandomForestOptions),
	NeuralNetwork(NeuralNetworkOptions),
	Voting(VotingOptions),
	Stacking(StackingOptions),
	Blending(BlendingOptions),
}

/// A trained model. This enum mirrors `ModelOptions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Model {
	GradientBoosting(GradientBoosting),
	RandomForest(RandomForest),
	NeuralNetwork(NeuralNetwork),
	Voting(VotingEnsemble),
	Stacking(StackingEnsemble),
	Blending(BlendingEnsemble),
}

/// The progress of training a `Model`. Ensembles report which base model is training and forward that model's own progress.
#[derive(Clone, Debug)]
pub enum TrainProgress {
	GradientBoosting(grove_tree::TrainProgress),
	RandomForest(grove_tree::TrainProgress),
	NeuralNetwork(grove_neural::TrainProgress),
	TrainingBaseModel { index: usize, n_base_models: usize },
	TrainingMetaModel,
}

impl ModelOptions {
	/// Check these options, and the options of any base models, against a dataset with `n_features` columns.
	pub fn validate(&self, n_features: usize) -> Result<()> {
		match self {
			ModelOptions::GradientBoosting(options) => options.validate(),
			ModelOptions::RandomForest(options) => options.validate(n_features).map(|_| ()),
			ModelOptions::NeuralNetwork(options) => options.validate(n_features),
			ModelOptions::Voting(options) => options.validate(n_features),
			ModelOptions::Stacking(options) => options.validate(n_features),
			ModelOptions::Blending(options) => options.validate(n_features),
		}
	}

	/// Train a model. Every option is validated before any model starts training.
	pub fn train(
		&self,
		dataset: DatasetView,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<Model> {
		self.validate(dataset.ncols())?;
		self.train_validated(dataset, update_progress)
	}

	pub(crate) fn train_validated(
		&self,
		dataset: DatasetView,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<Model> {
		let model = match self {
			ModelOptions::GradientBoosting(options) => {
				Model::GradientBoosting(GradientBoosting::train(dataset, options, &mut |progress| {
					update_progress(TrainProgress::GradientBoosting(progress))
				})?)
			}
			ModelOptions::RandomForest(options) => {
				Model::RandomForest(RandomForest::train(dataset, options, &mut |progress| {
					update_progress(TrainProgress::RandomForest(progress))
				})?)
			}
			ModelOptions::NeuralNetwork(options) => {
				Model::NeuralNetwork(NeuralNetwork::train(dataset, options, &mut |progress| {
					update_progress(TrainProgress::NeuralNetwork(progress))
				})?)
			}
			ModelOptions::Voting(options) => {
				Model::Voting(VotingEnsemble::train(dataset, options, update_progress)?)
			}
			ModelOptions::Stacking(options) => {
				Model::Stacking(StackingEnsemble::train(dataset, options, update_progress)?)
			}
			ModelOptions::Blending(options) => {
				Model::Blending(BlendingEnsemble::train(dataset, options, update_progress)?)
			}
		};
		Ok(model)
	}
}

impl Model {
	/// A short name for the kind of model, used in logs and benchmark output.
	pub fn kind(&self) -> &'static str {
		match self {
			Model::GradientBoosting(_) => "gradient_boosting",
			Model::RandomForest(_) => "random_forest",
			Model::NeuralNetwork(_) => "neural_network",
			Model::Voting(_) => "voting",
			Model::Stacking(_) => "stacking",
			Model::Blending(_) => "blending",
		}
	}

	fn as_regressor(&self) -> &dyn Regressor {
		match self {
			Model::GradientBoosting(model) => model,
			Model::RandomForest(model) => model,
			Model::NeuralNetwork(model) => model,
			Model::Voting(model) => model,
			Model::Stacking(model) => model,
			Model::Blending(model) => model,
		}
	}
}

impl Regressor for Model {
	fn n_features(&self) -> usize {
		self.as_regressor().n_features()
	}

	fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		self.as_regressor().predict(features)
	}
}

#[cfg(test)]
fn line_dataset() -> grove_dataset::Dataset {
	let features = Array2::from_shape_fn((30, 1), |(i, _)| i as f32 / 29.0);
	let targets = features.column(0).mapv(|x| 3.0 * x - 1.0);
	grove_dataset::Dataset::new(features, targets).unwrap()
}

#[test]
fn test_nested_ensembles() {
	let dataset = line_dataset();
	let options = ModelOptions::Stacking(StackingOptions {
		models: vec![
			ModelOptions::Voting(VotingOptions {
				models: vec![
					ModelOptions::GradientBoosting(Default::default()),
					ModelOptions::NeuralNetwork(NeuralNetworkOptions {
						layer_sizes: vec![1, 4, 1],
						max_epochs: 5,
						..Default::default()
					}),
				],
			}),
			ModelOptions::RandomForest(RandomForestOptions {
				n_trees: 5,
				..Default::default()
			}),
		],
		..Default::default()
	});
	let mut progress = Vec::new();
	let model = options
		.train(dataset.view(), &mut |p| progress.push(p))
		.unwrap();
	assert_eq!(model.kind(), "stacking");
	assert_eq!(model.n_features(), 1);
	assert!(progress
		.iter()
		.any(|p| matches!(p, TrainProgress::NeuralNetwork(_))));
	assert!(progress
		.iter()
		.any(|p| matches!(p, TrainProgress::TrainingMetaModel)));
	let predictions = model.predict(dataset.features()).unwrap();
	assert_eq!(predictions.len(), dataset.nrows());
	let json = serde_json::to_string(&model).unwrap();
	let deserialized: Model = serde_json::from_str(&json).unwrap();
	assert_eq!(deserialized.predict(dataset.features()).unwrap(), predictions);
}

#[test]
fn test_nested_options_are_validated_before_training() {
	let dataset = line_dataset();
	let options = ModelOptions::Voting(VotingOptions {
		models: vec![
			ModelOptions::GradientBoosting(Default::default()),
			ModelOptions::Voting(VotingOptions {
				models: vec![ModelOptions::NeuralNetwork(NeuralNetworkOptions {
					layer_sizes: vec![2, 4, 1],
					..Default::default()
				})],
			}),
		],
	});
	let mut progress = Vec::new();
	let result = options.train(dataset.view(), &mut |p| progress.push(p));
	assert_eq!(
		result,
		Err(grove_dataset::Error::FeatureCountMismatch {
			expected: 2,
			actual: 1,
		})
	);
	assert!(progress.is_empty());
	assert!(matches!(
		ModelOptions::Voting(VotingOptions::default()).validate(1),
		Err(grove_dataset::Error::InvalidConfig(_))
	));
}
