use crate::{regressor::check_features, Model, Regressor};
use grove_dataset::{invalid_config, DatasetView, Error, Result};
use grove_metrics::{Metric, RegressionMetrics, RegressionMetricsInput, RegressionMetricsOutput};
use log::info;
use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/**
A `Registry` holds trained models under string identifiers, each with a positive weight, and predicts the weighted average of their predictions.

Models can be registered and removed after they were trained, but every model in a registry must expect the same number of features.
*/
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
	entries: BTreeMap<String, RegistryEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
	pub model: Model,
	pub weight: f32,
}

impl Registry {
	pub fn new() -> Registry {
		Registry::default()
	}

	/// Add `model` under `id`, replacing and returning any entry already registered under `id`.
	pub fn register(
		&mut self,
		id: impl Into<String>,
		model: Model,
		weight: f32,
	) -> Result<Option<RegistryEntry>> {
		let id = id.into();
		check_weight(weight)?;
		let other_entry = self.entries.iter().find(|(entry_id, _)| **entry_id != id);
		if let Some((_, entry)) = other_entry {
			let expected = entry.model.n_features();
			if model.n_features() != expected {
				return Err(Error::FeatureCountMismatch {
					expected,
					actual: model.n_features(),
				});
			}
		}
		info!(
			"registering a {} model as {:?} with weight {}",
			model.kind(),
			id,
			weight
		);
		Ok(self.entries.insert(id, RegistryEntry { model, weight }))
	}

	/// Remove and return the entry registered under `id`.
	pub fn remove(&mut self, id: &str) -> Result<RegistryEntry> {
		self.entries
			.remove(id)
			.ok_or_else(|| Error::ModelNotFound(id.to_owned()))
	}

	pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
		self.entries.get(id)
	}

	/// Change the weight of the model registered under `id`.
	pub fn set_weight(&mut self, id: &str, weight: f32) -> Result<()> {
		check_weight(weight)?;
		let entry = self
			.entries
			.get_mut(id)
			.ok_or_else(|| Error::ModelNotFound(id.to_owned()))?;
		entry.weight = weight;
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// The registered identifiers in ascending order.
	pub fn ids(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(|id| id.as_str())
	}

	/// Predict `features` with every registered model in parallel and return the weighted average of their predictions.
	pub fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		let first_entry = self
			.entries
			.values()
			.next()
			.ok_or_else(|| invalid_config("an empty registry cannot make predictions"))?;
		check_features(features, first_entry.model.n_features())?;
		let weighted_predictions = self
			.entries
			.par_iter()
			.map(|(_, entry)| {
				let predictions = entry.model.predict(features)?;
				Ok(predictions * entry.weight)
			})
			.collect::<Result<Vec<_>>>()?;
		let total_weight: f32 = self.entries.values().map(|entry| entry.weight).sum();
		let mut sum = Array1::<f32>::zeros(features.nrows());
		for predictions in weighted_predictions.iter() {
			sum += predictions;
		}
		Ok(sum / total_weight)
	}

	/// Predict the rows of `dataset` and compare the predictions with its targets.
	pub fn evaluate(&self, dataset: DatasetView) -> Result<RegressionMetricsOutput> {
		let predictions = self.predict(dataset.features())?;
		let labels = dataset.targets();
		Ok(RegressionMetrics::compute(RegressionMetricsInput {
			predictions: predictions.view(),
			labels: labels.view(),
		}))
	}
}

fn check_weight(weight: f32) -> Result<()> {
	if weight.is_finite() && weight > 0.0 {
		Ok(())
	} else {
		Err(invalid_config(format!(
			"a registry weight must be finite and positive but is {}",
			weight
		)))
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
fn test_weighted_average() {
	let mut registry = Registry::new();
	registry.register("a", constant_model(1.0, 1), 1.0).unwrap();
	registry.register("b", constant_model(4.0, 1), 3.0).unwrap();
	let features = arr2(&[[0.0], [1.0]]);
	assert_eq!(registry.predict(features.view()).unwrap(), arr1(&[3.25, 3.25]));
	registry.set_weight("a", 3.0).unwrap();
	assert_eq!(registry.predict(features.view()).unwrap(), arr1(&[2.5, 2.5]));
	assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn test_register_replaces_and_remove() {
	let mut registry = Registry::new();
	assert!(registry.is_empty());
	assert!(registry
		.register("a", constant_model(1.0, 2), 1.0)
		.unwrap()
		.is_none());
	let replaced = registry
		.register("a", constant_model(2.0, 2), 2.0)
		.unwrap()
		.unwrap();
	assert_eq!(replaced.weight, 1.0);
	assert_eq!(registry.len(), 1);
	assert_eq!(registry.get("a").unwrap().weight, 2.0);
	assert_eq!(registry.remove("a").unwrap().weight, 2.0);
	assert_eq!(
		registry.remove("a"),
		Err(Error::ModelNotFound("a".to_owned()))
	);
	assert_eq!(
		registry.set_weight("a", 1.0),
		Err(Error::ModelNotFound("a".to_owned()))
	);
}

#[test]
fn test_registry_errors() {
	let mut registry = Registry::new();
	assert!(matches!(
		registry.predict(arr2(&[[1.0]]).view()),
		Err(Error::InvalidConfig(_))
	));
	for weight in &[0.0, -1.0, f32::NAN, f32::INFINITY] {
		assert!(matches!(
			registry.register("a", constant_model(1.0, 1), *weight),
			Err(Error::InvalidConfig(_))
		));
	}
	registry.register("a", constant_model(1.0, 1), 1.0).unwrap();
	assert_eq!(
		registry.register("b", constant_model(1.0, 2), 1.0),
		Err(Error::FeatureCountMismatch {
			expected: 1,
			actual: 2,
		})
	);
	// Replacing the only entry may change the number of features.
	assert!(registry.register("a", constant_model(1.0, 2), 1.0).is_ok());
	assert_eq!(
		registry.predict(arr2(&[[1.0]]).view()),
		Err(Error::FeatureCountMismatch {
			expected: 2,
			actual: 1,
		})
	);
}

#[test]
fn test_evaluate() {
	let mut registry = Registry::new();
	registry.register("a", constant_model(2.0, 1), 1.0).unwrap();
	let dataset =
		grove_dataset::Dataset::from_rows(&[vec![0.0], vec![1.0]], &[2.0, 2.0]).unwrap();
	let metrics = registry.evaluate(dataset.view()).unwrap();
	assert_eq!(metrics.mse, 0.0);
	assert_eq!(metrics.r2, 1.0);
}
