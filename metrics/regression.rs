use super::{mean_variance::MeanVariance, Metric, StreamingMetric};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// `RegressionMetrics` computes the common regression metrics from a stream of predictions and labels.
#[derive(Debug, Default)]
pub struct RegressionMetrics {
	labels: MeanVariance,
	absolute_error: f64,
	squared_error: f64,
}

pub struct RegressionMetricsInput<'a> {
	pub predictions: ArrayView1<'a, f32>,
	pub labels: ArrayView1<'a, f32>,
}

/// The output from `RegressionMetrics`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetricsOutput {
	/// The mean squared error.
	pub mse: f32,
	/// The root mean squared error.
	pub rmse: f32,
	/// The mean absolute error.
	pub mae: f32,
	/// The coefficient of determination. When the labels have zero variance this is 1.0 if every prediction is exact and 0.0 otherwise.
	pub r2: f32,
	/// The mean squared error of always predicting the mean of the labels, which is the variance of the labels.
	pub baseline_mse: f32,
	/// The root of `baseline_mse`.
	pub baseline_rmse: f32,
}

impl RegressionMetrics {
	pub fn new() -> Self {
		Self::default()
	}
}

impl<'a> StreamingMetric<'a> for RegressionMetrics {
	type Input = RegressionMetricsInput<'a>;
	type Output = RegressionMetricsOutput;

	fn update(&mut self, input: RegressionMetricsInput) {
		let RegressionMetricsInput {
			predictions,
			labels,
		} = input;
		for (prediction, label) in predictions.iter().zip(labels.iter()) {
			let label = label.to_f64().unwrap();
			self.labels.update(label);
			let error = prediction.to_f64().unwrap() - label;
			self.absolute_error += error.abs();
			self.squared_error += error * error;
		}
	}

	fn merge(&mut self, other: Self) {
		self.labels.merge(&other.labels);
		self.absolute_error += other.absolute_error;
		self.squared_error += other.squared_error;
	}

	fn finalize(self) -> Self::Output {
		if self.labels.n == 0 {
			return RegressionMetricsOutput {
				mse: f32::NAN,
				rmse: f32::NAN,
				mae: f32::NAN,
				r2: f32::NAN,
				baseline_mse: f32::NAN,
				baseline_rmse: f32::NAN,
			};
		}
		let n = self.labels.n.to_f64().unwrap();
		let mae = self.absolute_error / n;
		let mse = self.squared_error / n;
		let rmse = mse.sqrt();
		let total_sum_of_squares = self.labels.m2;
		let r2 = if total_sum_of_squares > 0.0 {
			1.0 - self.squared_error / total_sum_of_squares
		} else if self.squared_error == 0.0 {
			1.0
		} else {
			0.0
		};
		let baseline_mse = self.labels.variance();
		let baseline_rmse = baseline_mse.sqrt();
		RegressionMetricsOutput {
			mse: mse as f32,
			rmse: rmse as f32,
			mae: mae as f32,
			r2: r2 as f32,
			baseline_mse: baseline_mse as f32,
			baseline_rmse: baseline_rmse as f32,
		}
	}
}

impl<'a> Metric<'a> for RegressionMetrics {
	type Input = RegressionMetricsInput<'a>;
	type Output = RegressionMetricsOutput;

	fn compute(input: Self::Input) -> Self::Output {
		let mut metrics = RegressionMetrics::new();
		metrics.update(input);
		metrics.finalize()
	}
}

#[test]
fn test_regression_metrics() {
	let labels = arr1(&[1.0, 2.0, 3.0, 4.0]);
	let predictions = arr1(&[2.0, 2.0, 3.0, 2.0]);
	let metrics = RegressionMetrics::compute(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	insta::assert_debug_snapshot!(metrics, @r###"
 RegressionMetricsOutput {
     mse: 1.25,
     rmse: 1.118034,
     mae: 0.75,
     r2: 0.0,
     baseline_mse: 1.25,
     baseline_rmse: 1.118034,
 }
 "###);
}

#[test]
fn test_perfect_fit_has_r2_of_one() {
	let labels = arr1(&[3.0, -1.0, 8.5, 0.25]);
	let metrics = RegressionMetrics::compute(RegressionMetricsInput {
		predictions: labels.view(),
		labels: labels.view(),
	});
	assert_eq!(metrics.r2, 1.0);
	assert_eq!(metrics.mse, 0.0);
	assert_eq!(metrics.mae, 0.0);
}

#[test]
fn test_predicting_the_mean_has_r2_of_zero() {
	let labels = arr1(&[1.0, 2.0, 4.0, 9.0]);
	let predictions = Array1::from_elem(4, 4.0);
	let metrics = RegressionMetrics::compute(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	assert!(metrics.r2.abs() < 1e-6);
}

#[test]
fn test_constant_labels() {
	let labels = arr1(&[5.0, 5.0, 5.0]);
	let exact = RegressionMetrics::compute(RegressionMetricsInput {
		predictions: labels.view(),
		labels: labels.view(),
	});
	assert_eq!(exact.r2, 1.0);
	let predictions = arr1(&[4.0, 5.0, 6.0]);
	let inexact = RegressionMetrics::compute(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	assert_eq!(inexact.r2, 0.0);
	assert!(inexact.r2.is_finite());
}

#[test]
fn test_merge_matches_single_pass() {
	let labels = arr1(&[1.0, 2.0, 4.0, 9.0, 3.0, 3.0]);
	let predictions = arr1(&[1.5, 2.0, 3.0, 8.0, 3.5, 2.0]);
	let single = RegressionMetrics::compute(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	let mut a = RegressionMetrics::new();
	a.update(RegressionMetricsInput {
		predictions: predictions.slice(s![..2]),
		labels: labels.slice(s![..2]),
	});
	let mut b = RegressionMetrics::new();
	b.update(RegressionMetricsInput {
		predictions: predictions.slice(s![2..]),
		labels: labels.slice(s![2..]),
	});
	a.merge(b);
	let merged = a.finalize();
	assert!((single.mse - merged.mse).abs() < 1e-6);
	assert!((single.mae - merged.mae).abs() < 1e-6);
	assert!((single.r2 - merged.r2).abs() < 1e-6);
}
