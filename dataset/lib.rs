/*!
This crate defines the values every grove model consumes: a [`Dataset`](struct.Dataset.html) of real-valued feature rows paired with real-valued targets, a borrowed [`DatasetView`](struct.DatasetView.html), and the [`Error`](enum.Error.html) type shared across the workspace.

Features are stored row-major in an `ndarray::Array2<f32>`, so every row has the same length once a `Dataset` exists. Ragged input is caught by [`Dataset::from_rows`](struct.Dataset.html#method.from_rows).
*/

#![allow(clippy::tabs_in_doc_comments)]

mod error;

pub use self::error::{invalid_config, Error, Result};

use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// A feature matrix with one target per row. Feature names are informational and are never read by the training algorithms.
#[derive(Clone, Debug)]
pub struct Dataset {
	features: Array2<f32>,
	targets: Array1<f32>,
	feature_names: Option<Vec<String>>,
}

impl Dataset {
	/// Create a dataset, checking that there is at least one row and that there is exactly one target per row.
	pub fn new(features: Array2<f32>, targets: Array1<f32>) -> Result<Self> {
		check_shape(features.view(), targets.view())?;
		Ok(Self {
			features,
			targets,
			feature_names: None,
		})
	}

	/// Create a dataset from a slice of rows. Every row must have the same length as the first.
	pub fn from_rows(rows: &[Vec<f32>], targets: &[f32]) -> Result<Self> {
		if rows.len() != targets.len() {
			return Err(Error::LengthMismatch {
				rows: rows.len(),
				targets: targets.len(),
			});
		}
		let n_features = rows.first().map(|row| row.len()).ok_or(Error::EmptyDataset)?;
		for (row_index, row) in rows.iter().enumerate() {
			if row.len() != n_features {
				return Err(Error::RaggedRows {
					row: row_index,
					expected: n_features,
					actual: row.len(),
				});
			}
		}
		let data = rows.iter().flatten().cloned().collect::<Vec<_>>();
		// The length of `data` is `rows.len() * n_features` as checked above.
		let features = Array2::from_shape_vec((rows.len(), n_features), data)
			.map_err(|_| Error::EmptyDataset)?;
		Self::new(features, Array1::from(targets.to_vec()))
	}

	/// Attach a name to each feature column.
	pub fn with_feature_names(mut self, feature_names: Vec<String>) -> Result<Self> {
		if feature_names.len() != self.ncols() {
			return Err(Error::FeatureCountMismatch {
				expected: self.ncols(),
				actual: feature_names.len(),
			});
		}
		self.feature_names = Some(feature_names);
		Ok(self)
	}

	pub fn features(&self) -> ArrayView2<f32> {
		self.features.view()
	}

	pub fn targets(&self) -> ArrayView1<f32> {
		self.targets.view()
	}

	pub fn feature_names(&self) -> Option<&[String]> {
		self.feature_names.as_deref()
	}

	pub fn nrows(&self) -> usize {
		self.features.nrows()
	}

	pub fn ncols(&self) -> usize {
		self.features.ncols()
	}

	pub fn view(&self) -> DatasetView {
		DatasetView {
			features: self.features.view(),
			targets: self.targets.view(),
		}
	}
}

impl<'a> From<&'a Dataset> for DatasetView<'a> {
	fn from(dataset: &'a Dataset) -> Self {
		dataset.view()
	}
}

/// A borrowed dataset. Models train on views so that callers can train on a slice of a larger dataset without copying it.
#[derive(Clone, Copy, Debug)]
pub struct DatasetView<'a> {
	features: ArrayView2<'a, f32>,
	targets: ArrayView1<'a, f32>,
}

impl<'a> DatasetView<'a> {
	pub fn new(features: ArrayView2<'a, f32>, targets: ArrayView1<'a, f32>) -> Result<Self> {
		check_shape(features, targets)?;
		Ok(Self { features, targets })
	}

	pub fn features(&self) -> ArrayView2<'a, f32> {
		self.features
	}

	pub fn targets(&self) -> ArrayView1<'a, f32> {
		self.targets
	}

	pub fn nrows(&self) -> usize {
		self.features.nrows()
	}

	pub fn ncols(&self) -> usize {
		self.features.ncols()
	}

	/// Split the view into a leading part with `1 - fraction` of the rows, rounded to the nearest row, and a trailing part with the rest. Either part may be empty.
	pub fn split_at_fraction(&self, fraction: f32) -> (DatasetView<'a>, DatasetView<'a>) {
		// Round rather than truncate so a product just below a whole number keeps its row.
		let split_index = ((1.0 - fraction.to_f64().unwrap()) * self.nrows().to_f64().unwrap())
			.round()
			.to_usize()
			.unwrap_or(0)
			.min(self.nrows());
		let (features_a, features_b) = self.features.split_at(Axis(0), split_index);
		let (targets_a, targets_b) = self.targets.split_at(Axis(0), split_index);
		(
			DatasetView {
				features: features_a,
				targets: targets_a,
			},
			DatasetView {
				features: features_b,
				targets: targets_b,
			},
		)
	}
}

fn check_shape(features: ArrayView2<f32>, targets: ArrayView1<f32>) -> Result<()> {
	if features.nrows() != targets.len() {
		return Err(Error::LengthMismatch {
			rows: features.nrows(),
			targets: targets.len(),
		});
	}
	if features.nrows() == 0 {
		return Err(Error::EmptyDataset);
	}
	Ok(())
}

/// Check that a feature matrix passed to `predict` has the column count the model was trained with, and that the output buffer has one slot per row.
pub fn check_prediction_shape(
	features: ArrayView2<f32>,
	n_features: usize,
	n_predictions: usize,
) -> Result<()> {
	if features.ncols() != n_features {
		return Err(Error::FeatureCountMismatch {
			expected: n_features,
			actual: features.ncols(),
		});
	}
	if features.nrows() != n_predictions {
		return Err(Error::PredictionsLengthMismatch {
			expected: features.nrows(),
			actual: n_predictions,
		});
	}
	Ok(())
}

#[test]
fn test_from_rows() {
	let dataset = Dataset::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]], &[5.0, 6.0]).unwrap();
	assert_eq!(dataset.nrows(), 2);
	assert_eq!(dataset.ncols(), 2);
	assert_eq!(dataset.features(), arr2(&[[1.0, 2.0], [3.0, 4.0]]));
	assert_eq!(dataset.targets(), arr1(&[5.0, 6.0]));
}

#[test]
fn test_shape_errors() {
	assert_eq!(
		Dataset::from_rows(&[vec![1.0], vec![2.0, 3.0]], &[0.0, 0.0]).unwrap_err(),
		Error::RaggedRows {
			row: 1,
			expected: 1,
			actual: 2,
		}
	);
	assert_eq!(
		Dataset::from_rows(&[vec![1.0]], &[0.0, 1.0]).unwrap_err(),
		Error::LengthMismatch {
			rows: 1,
			targets: 2,
		}
	);
	assert_eq!(
		Dataset::from_rows(&[], &[]).unwrap_err(),
		Error::EmptyDataset
	);
	assert_eq!(
		Dataset::new(Array2::zeros((0, 3)), Array1::zeros(0)).unwrap_err(),
		Error::EmptyDataset
	);
}

#[test]
fn test_feature_names() {
	let dataset = Dataset::from_rows(&[vec![1.0, 2.0]], &[0.0]).unwrap();
	assert!(dataset
		.clone()
		.with_feature_names(vec!["kwh".to_owned()])
		.is_err());
	let dataset = dataset
		.with_feature_names(vec!["kwh".to_owned(), "m3".to_owned()])
		.unwrap();
	assert_eq!(dataset.feature_names().unwrap()[1], "m3");
}

#[test]
fn test_split_at_fraction() {
	let dataset = Dataset::from_rows(
		&[vec![0.0], vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
		&[0.0, 10.0, 20.0, 30.0, 40.0],
	)
	.unwrap();
	let view = dataset.view();
	let (train, holdout) = view.split_at_fraction(0.4);
	assert_eq!(train.nrows(), 3);
	assert_eq!(holdout.nrows(), 2);
	assert_eq!(holdout.targets(), arr1(&[30.0, 40.0]));
}

#[test]
fn test_split_at_fraction_rounds() {
	let features = Array2::from_shape_fn((10, 1), |(i, _)| i as f32);
	let dataset = Dataset::new(features, Array1::zeros(10)).unwrap();
	// (1 - 0.6) * 10 is slightly less than 4 in f32.
	let (train, holdout) = dataset.view().split_at_fraction(0.6);
	assert_eq!(train.nrows(), 4);
	assert_eq!(holdout.nrows(), 6);
	let (train, holdout) = dataset.view().split_at_fraction(0.0);
	assert_eq!((train.nrows(), holdout.nrows()), (10, 0));
	let (train, holdout) = dataset.view().split_at_fraction(1.0);
	assert_eq!((train.nrows(), holdout.nrows()), (0, 10));
}

#[test]
fn test_check_prediction_shape() {
	let features = Array2::<f32>::zeros((3, 2));
	assert!(check_prediction_shape(features.view(), 2, 3).is_ok());
	assert_eq!(
		check_prediction_shape(features.view(), 4, 3).unwrap_err(),
		Error::FeatureCountMismatch {
			expected: 4,
			actual: 2
		}
	);
	assert_eq!(
		check_prediction_shape(features.view(), 2, 1).unwrap_err(),
		Error::PredictionsLengthMismatch {
			expected: 3,
			actual: 1
		}
	);
}
