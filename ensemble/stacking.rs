use crate::{
	base_models::{meta_features, train_base_models, validate_base_model_options},
	regressor::check_features,
	Model, ModelOptions, Regressor, TrainProgress,
};
use grove_dataset::{DatasetView, Result};
use grove_tree::{GradientBoosting, GradientBoostingOptions};
use log::info;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// These are the options passed to `StackingEnsemble::train`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StackingOptions {
	/// The base models. Each one is trained on the full dataset. There must be at least one.
	pub models: Vec<ModelOptions>,
	/// The options for the gradient boosting model that learns to combine the base models' predictions.
	pub meta_model: GradientBoostingOptions,
}

impl Default for StackingOptions {
	fn default() -> Self {
		Self {
			models: Vec::new(),
			meta_model: default_meta_model_options(),
		}
	}
}

impl StackingOptions {
	pub fn validate(&self, n_features: usize) -> Result<()> {
		validate_base_model_options(&self.models, n_features)?;
		self.meta_model.validate()
	}
}

pub(crate) fn default_meta_model_options() -> GradientBoostingOptions {
	GradientBoostingOptions {
		max_rounds: 50,
		learning_rate: 0.1,
		max_depth: 3,
		min_examples_split: 2,
		..Default::default()
	}
}

/**
A `StackingEnsemble` feeds its base models' predictions to a gradient boosting meta model.

The meta model is trained on the base models' predictions for the same rows the base models were trained on. Use a [`BlendingEnsemble`](struct.BlendingEnsemble.html) to train the meta model on rows the base models have not seen.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StackingEnsemble {
	pub models: Vec<Model>,
	pub meta_model: GradientBoosting,
	pub n_features: usize,
}

impl StackingEnsemble {
	pub fn train(
		dataset: DatasetView,
		options: &StackingOptions,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<StackingEnsemble> {
		options.validate(dataset.ncols())?;
		info!(
			"training a stacking ensemble of {} models on {} examples",
			options.models.len(),
			dataset.nrows()
		);
		let models = train_base_models(dataset, &options.models, update_progress)?;
		let meta_model = train_meta_model(&models, dataset, &options.meta_model, update_progress)?;
		info!("finished training the stacking ensemble");
		Ok(StackingEnsemble {
			models,
			meta_model,
			n_features: dataset.ncols(),
		})
	}
}

impl Regressor for StackingEnsemble {
	fn n_features(&self) -> usize {
		self.n_features
	}

	fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		check_features(features, self.n_features)?;
		let meta_features = meta_features(&self.models, features)?;
		Regressor::predict(&self.meta_model, meta_features.view())
	}
}

/// Train the meta model on the predictions `models` make for the rows of `dataset`.
pub(crate) fn train_meta_model(
	models: &[Model],
	dataset: DatasetView,
	options: &GradientBoostingOptions,
	update_progress: &mut dyn FnMut(TrainProgress),
) -> Result<GradientBoosting> {
	let meta_features = meta_features(models, dataset.features())?;
	let targets = dataset.targets();
	let meta_dataset = DatasetView::new(meta_features.view(), targets.view())?;
	update_progress(TrainProgress::TrainingMetaModel);
	GradientBoosting::train(meta_dataset, options, &mut |progress| {
		update_progress(TrainProgress::GradientBoosting(progress))
	})
}

#[cfg(test)]
fn toy_dataset() -> grove_dataset::Dataset {
	let features = Array2::from_shape_fn((40, 2), |(i, j)| ((i * (j + 2)) % 13) as f32);
	let targets = Array1::from_shape_fn(40, |i| {
		let x0 = ((i * 2) % 13) as f32;
		let x1 = ((i * 3) % 13) as f32;
		x0 * 3.0 - x1
	});
	grove_dataset::Dataset::new(features, targets).unwrap()
}

#[test]
fn test_stacking_over_constant_base_models_predicts_the_mean() {
	let dataset = toy_dataset();
	let constant = ModelOptions::GradientBoosting(GradientBoostingOptions {
		max_rounds: 0,
		..Default::default()
	});
	let ensemble = StackingEnsemble::train(
		dataset.view(),
		&StackingOptions {
			models: vec![constant.clone(), constant],
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	// Every meta feature column is constant, so no meta tree can split.
	let mean = dataset.targets().mean().unwrap();
	let predictions = ensemble.predict(dataset.features()).unwrap();
	for prediction in predictions.iter() {
		assert!((prediction - mean).abs() < 1e-4);
	}
}

#[test]
fn test_stacking() {
	let dataset = toy_dataset();
	let mut trained_meta_model = false;
	let ensemble = StackingEnsemble::train(
		dataset.view(),
		&StackingOptions {
			models: vec![
				ModelOptions::GradientBoosting(Default::default()),
				ModelOptions::RandomForest(grove_tree::RandomForestOptions {
					n_trees: 10,
					..Default::default()
				}),
			],
			..Default::default()
		},
		&mut |progress| {
			if let TrainProgress::TrainingMetaModel = progress {
				trained_meta_model = true;
			}
		},
	)
	.unwrap();
	assert!(trained_meta_model);
	assert_eq!(ensemble.meta_model.n_features, 2);
	assert_eq!(ensemble.meta_model.trees.len(), 50);
	let predictions = ensemble.predict(dataset.features()).unwrap();
	assert_eq!(predictions.len(), dataset.nrows());
	let metrics = ensemble.evaluate(dataset.view()).unwrap();
	assert!(metrics.mse < metrics.baseline_mse);
}

#[test]
fn test_empty_stacking_ensemble() {
	let dataset = toy_dataset();
	assert!(matches!(
		StackingEnsemble::train(dataset.view(), &Default::default(), &mut |_| {}),
		Err(grove_dataset::Error::InvalidConfig(_))
	));
}
