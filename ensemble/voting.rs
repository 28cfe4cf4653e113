use crate::{
	base_models::{check_base_models, predict_base_models, train_base_models, validate_base_model_options},
	regressor::check_features,
	Model, ModelOptions, Regressor, TrainProgress,
};
use grove_dataset::{DatasetView, Result};
use log::info;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// These are the options passed to `VotingEnsemble::train`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VotingOptions {
	/// The base models. Each one is trained on the full dataset. There must be at least one.
	pub models: Vec<ModelOptions>,
}

impl VotingOptions {
	pub fn validate(&self, n_features: usize) -> Result<()> {
		validate_base_model_options(&self.models, n_features)
	}
}

/// A `VotingEnsemble` predicts the unweighted mean of its base models' predictions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VotingEnsemble {
	pub models: Vec<Model>,
	pub n_features: usize,
}

impl VotingEnsemble {
	pub fn train(
		dataset: DatasetView,
		options: &VotingOptions,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<VotingEnsemble> {
		options.validate(dataset.ncols())?;
		info!(
			"training a voting ensemble of {} models on {} examples",
			options.models.len(),
			dataset.nrows()
		);
		let models = train_base_models(dataset, &options.models, update_progress)?;
		info!("finished training the voting ensemble");
		Ok(VotingEnsemble {
			models,
			n_features: dataset.ncols(),
		})
	}

	/// Combine models that were already trained. There must be at least one and they must all expect the same number of features.
	pub fn from_models(models: Vec<Model>) -> Result<VotingEnsemble> {
		let n_features = check_base_models(&models)?;
		Ok(VotingEnsemble { models, n_features })
	}
}

impl Regressor for VotingEnsemble {
	fn n_features(&self) -> usize {
		self.n_features
	}

	fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		check_features(features, self.n_features)?;
		let predictions = predict_base_models(&self.models, features)?;
		let mut mean = Array1::<f32>::zeros(features.nrows());
		for predictions in predictions.iter() {
			mean += predictions;
		}
		mean /= self.models.len().to_f32().unwrap();
		Ok(mean)
	}
}

#[cfg(test)]
fn constant_model(value: f32, n_features: usize) -> Model {
	Model::GradientBoosting(grove_tree::GradientBoosting {
		bias: value,
		learning_rate: 0.1,
		trees: Vec::new(),
		n_features,
		feature_importances: vec![0.0; n_features],
		losses: None,
	})
}

#[test]
fn test_voting_over_constant_models() {
	let ensemble = VotingEnsemble::from_models(vec![
		constant_model(1.0, 2),
		constant_model(2.0, 2),
		constant_model(6.0, 2),
	])
	.unwrap();
	let features = arr2(&[[0.0, 1.0], [5.0, -3.0]]);
	assert_eq!(ensemble.predict(features.view()).unwrap(), arr1(&[3.0, 3.0]));
}

#[test]
fn test_from_models_errors() {
	assert!(matches!(
		VotingEnsemble::from_models(Vec::new()),
		Err(grove_dataset::Error::InvalidConfig(_))
	));
	assert_eq!(
		VotingEnsemble::from_models(vec![constant_model(1.0, 2), constant_model(1.0, 3)]),
		Err(grove_dataset::Error::FeatureCountMismatch {
			expected: 2,
			actual: 3,
		})
	);
}

#[test]
fn test_train_voting_ensemble() {
	let features = Array2::from_shape_fn((30, 2), |(i, j)| (i * (j + 1)) as f32);
	let targets = Array1::from_shape_fn(30, |i| i as f32 * 0.5);
	let dataset = grove_dataset::Dataset::new(features, targets).unwrap();
	let options = VotingOptions {
		models: vec![
			ModelOptions::GradientBoosting(grove_tree::GradientBoostingOptions {
				max_rounds: 0,
				..Default::default()
			}),
			ModelOptions::RandomForest(grove_tree::RandomForestOptions {
				n_trees: 5,
				..Default::default()
			}),
		],
	};
	let mut base_models_started = Vec::new();
	let ensemble = VotingEnsemble::train(dataset.view(), &options, &mut |progress| {
		if let TrainProgress::TrainingBaseModel { index, .. } = progress {
			base_models_started.push(index);
		}
	})
	.unwrap();
	assert_eq!(base_models_started, vec![0, 1]);
	assert_eq!(ensemble.models.len(), 2);
	let predictions = ensemble.predict(dataset.features()).unwrap();
	let mean = dataset.targets().mean().unwrap();
	let forest = ensemble.models[1].predict(dataset.features()).unwrap();
	for (prediction, forest) in predictions.iter().zip(forest.iter()) {
		assert!((prediction - (mean + forest) / 2.0).abs() < 1e-4);
	}
	let metrics = ensemble.evaluate(dataset.view()).unwrap();
	assert!(metrics.mse < metrics.baseline_mse);
}

#[test]
fn test_base_model_failure_fails_training() {
	let dataset = grove_dataset::Dataset::from_rows(&[vec![1.0], vec![2.0]], &[1.0, 2.0]).unwrap();
	let options = VotingOptions {
		models: vec![
			ModelOptions::GradientBoosting(Default::default()),
			ModelOptions::RandomForest(grove_tree::RandomForestOptions {
				n_trees: 0,
				..Default::default()
			}),
		],
	};
	let mut n_base_models_started = 0;
	let result = VotingEnsemble::train(dataset.view(), &options, &mut |progress| {
		if let TrainProgress::TrainingBaseModel { .. } = progress {
			n_base_models_started += 1;
		}
	});
	assert!(matches!(result, Err(grove_dataset::Error::InvalidConfig(_))));
	// Options are validated before any base model trains.
	assert_eq!(n_base_models_started, 0);
}

#[test]
fn test_prediction_errors() {
	let ensemble = VotingEnsemble::from_models(vec![constant_model(1.0, 2)]).unwrap();
	assert_eq!(
		ensemble.predict(arr2(&[[1.0, 2.0, 3.0]]).view()),
		Err(grove_dataset::Error::FeatureCountMismatch {
			expected: 2,
			actual: 3,
		})
	);
}
