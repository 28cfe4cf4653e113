use crate::{
	base_models::{meta_features, train_base_models, validate_base_model_options},
	regressor::check_features,
	stacking::{default_meta_model_options, train_meta_model},
	Model, ModelOptions, Regressor, TrainProgress,
};
use grove_dataset::{invalid_config, DatasetView, Result};
use grove_tree::{GradientBoosting, GradientBoostingOptions};
use log::info;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// These are the options passed to `BlendingEnsemble::train`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendingOptions {
	/// The base models. There must be at least one.
	pub models: Vec<ModelOptions>,
	/// The options for the gradient boosting model that learns to combine the base models' predictions.
	pub meta_model: GradientBoostingOptions,
	/// The fraction of rows, taken from the end of the dataset, that the base models do not see and the meta model is trained on. It must be in (0, 1).
	pub holdout_fraction: f32,
}

impl Default for BlendingOptions {
	fn default() -> Self {
		Self {
			models: Vec::new(),
			meta_model: default_meta_model_options(),
			holdout_fraction: 0.2,
		}
	}
}

impl BlendingOptions {
	pub fn validate(&self, n_features: usize) -> Result<()> {
		if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
			return Err(invalid_config(format!(
				"holdout_fraction must be in (0, 1) but is {}",
				self.holdout_fraction
			)));
		}
		validate_base_model_options(&self.models, n_features)?;
		self.meta_model.validate()
	}
}

/// A `BlendingEnsemble` trains its base models on the leading rows of the dataset and its gradient boosting meta model on the base models' predictions for the held out rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendingEnsemble {
	pub models: Vec<Model>,
	pub meta_model: GradientBoosting,
	pub n_features: usize,
}

impl BlendingEnsemble {
	pub fn train(
		dataset: DatasetView,
		options: &BlendingOptions,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<BlendingEnsemble> {
		options.validate(dataset.ncols())?;
		let (dataset_train, dataset_holdout) = dataset.split_at_fraction(options.holdout_fraction);
		if dataset_train.nrows() == 0 || dataset_holdout.nrows() == 0 {
			return Err(invalid_config(format!(
				"a holdout fraction of {} of {} rows leaves no rows for the base models or the meta model",
				options.holdout_fraction,
				dataset.nrows()
			)));
		}
		info!(
			"training a blending ensemble of {} models on {} examples with {} held out",
			options.models.len(),
			dataset_train.nrows(),
			dataset_holdout.nrows()
		);
		let models = train_base_models(dataset_train, &options.models, update_progress)?;
		let meta_model =
			train_meta_model(&models, dataset_holdout, &options.meta_model, update_progress)?;
		info!("finished training the blending ensemble");
		Ok(BlendingEnsemble {
			models,
			meta_model,
			n_features: dataset.ncols(),
		})
	}
}

impl Regressor for BlendingEnsemble {
	fn n_features(&self) -> usize {
		self.n_features
	}

	fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		check_features(features, self.n_features)?;
		let meta_features = meta_features(&self.models, features)?;
		Regressor::predict(&self.meta_model, meta_features.view())
	}
}

#[test]
fn test_blending_trains_base_models_on_leading_rows() {
	// The first 8 rows have target 1 and the last 2 have target 5.
	let features = Array2::from_shape_fn((10, 1), |(i, _)| i as f32);
	let targets = Array1::from_shape_fn(10, |i| if i < 8 { 1.0 } else { 5.0 });
	let dataset = grove_dataset::Dataset::new(features, targets).unwrap();
	let ensemble = BlendingEnsemble::train(
		dataset.view(),
		&BlendingOptions {
			models: vec![ModelOptions::GradientBoosting(GradientBoostingOptions {
				max_rounds: 0,
				..Default::default()
			})],
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	match &ensemble.models[0] {
		Model::GradientBoosting(model) => assert_eq!(model.bias, 1.0),
		_ => unreachable!(),
	}
	// The meta model only saw the held out rows.
	assert_eq!(ensemble.meta_model.bias, 5.0);
	let predictions = ensemble.predict(dataset.features()).unwrap();
	for prediction in predictions.iter() {
		assert_eq!(*prediction, 5.0);
	}
}

#[test]
fn test_invalid_holdout() {
	let dataset =
		grove_dataset::Dataset::from_rows(&[vec![1.0], vec![2.0], vec![3.0]], &[1.0, 2.0, 3.0])
			.unwrap();
	let models = vec![ModelOptions::GradientBoosting(Default::default())];
	for holdout_fraction in &[0.0, 1.0, 0.9, 1e-9] {
		let result = BlendingEnsemble::train(
			dataset.view(),
			&BlendingOptions {
				models: models.clone(),
				holdout_fraction: *holdout_fraction,
				..Default::default()
			},
			&mut |_| {},
		);
		assert!(matches!(result, Err(grove_dataset::Error::InvalidConfig(_))));
	}
}
