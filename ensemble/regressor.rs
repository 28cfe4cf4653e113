use grove_dataset::{check_prediction_shape, DatasetView, Result};
use grove_metrics::{Metric, RegressionMetrics, RegressionMetricsInput, RegressionMetricsOutput};
use grove_neural::NeuralNetwork;
use grove_tree::{GradientBoosting, RandomForest};
use ndarray::prelude::*;

/**
The `Regressor` trait is the contract every trained model and every ensemble fulfills: it maps a matrix of features to one prediction per row.

Implementations never mutate themselves while predicting, so a trained model can be shared across threads and several models can predict at once.
*/
pub trait Regressor: Send + Sync {
	/// The number of columns `predict` expects.
	fn n_features(&self) -> usize;

	/// Make one prediction for each row of `features`.
	fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>>;

	/// Predict the rows of `dataset` and compare the predictions with its targets.
	fn evaluate(&self, dataset: DatasetView) -> Result<RegressionMetricsOutput> {
		let predictions = self.predict(dataset.features())?;
		let labels = dataset.targets();
		Ok(RegressionMetrics::compute(RegressionMetricsInput {
			predictions: predictions.view(),
			labels: labels.view(),
		}))
	}
}

impl Regressor for GradientBoosting {
	fn n_features(&self) -> usize {
		self.n_features
	}

	fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		let mut predictions = vec![0.0; features.nrows()];
		GradientBoosting::predict(self, features, &mut predictions)?;
		Ok(Array1::from(predictions))
	}
}

impl Regressor for RandomForest {
	fn n_features(&self) -> usize {
		self.n_features
	}

	fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		let mut predictions = vec![0.0; features.nrows()];
		RandomForest::predict(self, features, &mut predictions)?;
		Ok(Array1::from(predictions))
	}
}

impl Regressor for NeuralNetwork {
	fn n_features(&self) -> usize {
		NeuralNetwork::n_features(self)
	}

	fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
		let mut predictions = vec![0.0; features.nrows()];
		NeuralNetwork::predict(self, features, &mut predictions)?;
		Ok(Array1::from(predictions))
	}
}

/// Check that `features` has the number of columns a model was trained with.
pub(crate) fn check_features(features: ArrayView2<f32>, n_features: usize) -> Result<()> {
	check_prediction_shape(features, n_features, features.nrows())
}
