use thiserror::Error;

/// The error type shared by every grove crate.
///
/// Shape and configuration errors are detected before any training work begins. `NumericInstability` is reported when a training loop observes a NaN or infinite value, which usually means the learning rate is too high.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
	#[error("the dataset has no rows")]
	EmptyDataset,
	#[error("the dataset has {rows} rows but {targets} targets")]
	LengthMismatch { rows: usize, targets: usize },
	#[error("row {row} has {actual} features but the first row has {expected}")]
	RaggedRows {
		row: usize,
		expected: usize,
		actual: usize,
	},
	#[error("expected {expected} features but got {actual}")]
	FeatureCountMismatch { expected: usize, actual: usize },
	#[error("expected a predictions buffer of length {expected} but got {actual}")]
	PredictionsLengthMismatch { expected: usize, actual: usize },
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("encountered a value that is not finite during {stage} {step}")]
	NumericInstability { stage: &'static str, step: usize },
	#[error("no model is registered with the id \"{0}\"")]
	ModelNotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shorthand for building an `Error::InvalidConfig`.
pub fn invalid_config(message: impl Into<String>) -> Error {
	Error::InvalidConfig(message.into())
}
