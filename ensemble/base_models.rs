use crate::{Model, ModelOptions, Regressor, TrainProgress};
use grove_dataset::{invalid_config, DatasetView, Error, Result};
use log::debug;
use ndarray::prelude::*;
use rayon::prelude::*;

pub fn validate_base_model_options(models: &[ModelOptions], n_features: usize) -> Result<()> {
	if models.is_empty() {
		return Err(invalid_config("an ensemble must have at least one base model"));
	}
	for model in models {
		model.validate(n_features)?;
	}
	Ok(())
}

/// Train each base model in turn on `dataset`. The first failure is returned and no ensemble is built.
pub fn train_base_models(
	dataset: DatasetView,
	models: &[ModelOptions],
	update_progress: &mut dyn FnMut(TrainProgress),
) -> Result<Vec<Model>> {
	let n_base_models = models.len();
	let mut trained_models = Vec::with_capacity(n_base_models);
	for (index, options) in models.iter().enumerate() {
		update_progress(TrainProgress::TrainingBaseModel {
			index,
			n_base_models,
		});
		let model = options.train_validated(dataset, update_progress)?;
		debug!(
			"trained base model {} of {}, a {} model",
			index + 1,
			n_base_models,
			model.kind()
		);
		trained_models.push(model);
	}
	Ok(trained_models)
}

/// Check that `models` is not empty and that every model expects the same number of features, and return that number.
pub fn check_base_models(models: &[Model]) -> Result<usize> {
	let first = models
		.first()
		.ok_or_else(|| invalid_config("an ensemble must have at least one base model"))?;
	let n_features = first.n_features();
	for model in models {
		if model.n_features() != n_features {
			return Err(Error::FeatureCountMismatch {
				expected: n_features,
				actual: model.n_features(),
			});
		}
	}
	Ok(n_features)
}

/// Predict `features` with every model in parallel. If any model fails, the error is returned.
pub fn predict_base_models(models: &[Model], features: ArrayView2<f32>) -> Result<Vec<Array1<f32>>> {
	models
		.par_iter()
		.map(|model| model.predict(features))
		.collect()
}

/// Arrange the base models' predictions as the columns of a matrix, the input of a meta model.
pub fn meta_features(models: &[Model], features: ArrayView2<f32>) -> Result<Array2<f32>> {
	let predictions = predict_base_models(models, features)?;
	let mut meta_features = Array2::zeros((features.nrows(), models.len()));
	for (mut column, predictions) in meta_features.axis_iter_mut(Axis(1)).zip(predictions.iter()) {
		column.assign(predictions);
	}
	Ok(meta_features)
}
