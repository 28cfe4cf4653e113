/*!
This crate implements a multi-layer perceptron for regression, [`NeuralNetwork`](struct.NeuralNetwork.html), trained with mini-batch gradient descent and the Adam optimizer, with optional inverted dropout on the hidden layers.

Epochs run one after another because each one starts from the parameters the previous one left. Prediction does not modify the network, so it is split into chunks of rows that run in parallel.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod adam;
mod early_stopping;
mod network;

pub use self::network::{Layer, NeuralNetwork};

use grove_dataset::{invalid_config, Error, Result};
use serde::{Deserialize, Serialize};

/// These are the options passed to `NeuralNetwork::train`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetworkOptions {
	/// The number of neurons in each layer, starting with the input layer, whose size must equal the number of features, and ending with the output layer, whose size must be 1.
	pub layer_sizes: Vec<usize>,
	/// The activation function applied to every hidden neuron, and to the output neuron unless `output_activation` is set.
	pub activation: Activation,
	/// If set, the output neuron uses this activation instead of `activation`.
	pub output_activation: Option<Activation>,
	/// The optimizer used to update the weights and biases.
	pub optimizer: Optimizer,
	/// This is the learning rate to use when updating the model parameters.
	pub learning_rate: f32,
	/// This is the maximum number of epochs to train.
	pub max_epochs: usize,
	/// This is the number of examples to use for each batch of training. The last batch of an epoch may be smaller.
	pub n_examples_per_batch: usize,
	/// During training, each hidden neuron's output is set to zero with this probability and the surviving outputs are scaled by `1 / (1 - dropout)`. It must be in [0, 1).
	pub dropout: f32,
	/// The seed for the random number generator used to initialize the weights and draw dropout masks.
	pub seed: u64,
	/// Specify options for early stopping. If the value is `Some`, early stopping will be enabled. If it is `None`, early stopping will be disabled.
	pub early_stopping_options: Option<EarlyStoppingOptions>,
}

impl Default for NeuralNetworkOptions {
	fn default() -> Self {
		Self {
			layer_sizes: vec![1, 16, 1],
			activation: Activation::Relu,
			output_activation: None,
			optimizer: Optimizer::default(),
			learning_rate: 0.01,
			max_epochs: 100,
			n_examples_per_batch: 32,
			dropout: 0.0,
			seed: 42,
			early_stopping_options: None,
		}
	}
}

impl NeuralNetworkOptions {
	/// Check the options against a dataset with `n_features` columns.
	pub fn validate(&self, n_features: usize) -> Result<()> {
		if self.layer_sizes.len() < 2 {
			return Err(invalid_config(
				"layer_sizes must contain at least an input and an output layer",
			));
		}
		if self.layer_sizes.iter().any(|size| *size == 0) {
			return Err(invalid_config("every layer must have at least one neuron"));
		}
		if self.layer_sizes[0] != n_features {
			return Err(Error::FeatureCountMismatch {
				expected: self.layer_sizes[0],
				actual: n_features,
			});
		}
		if self.layer_sizes[self.layer_sizes.len() - 1] != 1 {
			return Err(invalid_config("the output layer must have exactly one neuron"));
		}
		if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
			return Err(invalid_config("learning_rate must be a finite, positive number"));
		}
		if self.max_epochs == 0 {
			return Err(invalid_config("max_epochs must be at least 1"));
		}
		if self.n_examples_per_batch == 0 {
			return Err(invalid_config("n_examples_per_batch must be at least 1"));
		}
		if !(self.dropout >= 0.0 && self.dropout < 1.0) {
			return Err(invalid_config(format!(
				"dropout must be in [0, 1) but is {}",
				self.dropout
			)));
		}
		self.optimizer.validate()?;
		if let Some(early_stopping_options) = &self.early_stopping_options {
			early_stopping_options.validate()?;
		}
		Ok(())
	}
}

/// The activation function applied to the weighted sum of a neuron's inputs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Activation {
	Relu,
	Sigmoid,
	Tanh,
	Identity,
}

impl Activation {
	pub fn apply(self, x: f32) -> f32 {
		match self {
			Activation::Relu => x.max(0.0),
			Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
			Activation::Tanh => x.tanh(),
			Activation::Identity => x,
		}
	}

	/// The derivative of the activation function with respect to its input `x`.
	pub fn derivative(self, x: f32) -> f32 {
		match self {
			Activation::Relu => {
				if x > 0.0 {
					1.0
				} else {
					0.0
				}
			}
			Activation::Sigmoid => {
				let s = self.apply(x);
				s * (1.0 - s)
			}
			Activation::Tanh => 1.0 - x.tanh().powi(2),
			Activation::Identity => 1.0,
		}
	}
}

/// The optimizer used to update the network's parameters after each batch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Optimizer {
	Adam {
		/// The decay rate of the first moment estimates.
		beta_1: f32,
		/// The decay rate of the second moment estimates.
		beta_2: f32,
		/// Added to the denominator of the update to avoid dividing by zero.
		epsilon: f32,
	},
}

impl Default for Optimizer {
	fn default() -> Self {
		Optimizer::Adam {
			beta_1: 0.9,
			beta_2: 0.999,
			epsilon: 1e-8,
		}
	}
}

impl Optimizer {
	fn validate(&self) -> Result<()> {
		match self {
			Optimizer::Adam {
				beta_1,
				beta_2,
				epsilon,
			} => {
				if !(*beta_1 >= 0.0 && *beta_1 < 1.0 && *beta_2 >= 0.0 && *beta_2 < 1.0) {
					return Err(invalid_config("the adam betas must be in [0, 1)"));
				}
				if !(*epsilon > 0.0) {
					return Err(invalid_config("the adam epsilon must be positive"));
				}
				Ok(())
			}
		}
	}
}

/// The parameters in this struct control how to determine whether training should stop early after each epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingOptions {
	/// This is the fraction of the dataset that is set aside to compute the early stopping metric. The last rows of the dataset are set aside.
	pub early_stopping_fraction: f32,
	/// If this many epochs pass by without a significant improvement in the early stopping metric over the previous epoch, training will be stopped early.
	pub n_epochs_without_improvement_to_stop: usize,
	/// This is the minimum decrease in the early stopping metric for an epoch to be considered a significant improvement over the previous epoch.
	pub min_decrease_in_loss_for_significant_change: f32,
}

impl Default for EarlyStoppingOptions {
	fn default() -> Self {
		Self {
			early_stopping_fraction: 0.1,
			n_epochs_without_improvement_to_stop: 3,
			min_decrease_in_loss_for_significant_change: 1e-3,
		}
	}
}

impl EarlyStoppingOptions {
	fn validate(&self) -> Result<()> {
		if !(self.early_stopping_fraction > 0.0 && self.early_stopping_fraction < 1.0) {
			return Err(invalid_config("early_stopping_fraction must be in (0, 1)"));
		}
		if self.n_epochs_without_improvement_to_stop == 0 {
			return Err(invalid_config(
				"n_epochs_without_improvement_to_stop must be at least 1",
			));
		}
		Ok(())
	}
}

/// This is the training progress, which tracks the current epoch.
#[derive(Clone, Debug)]
pub struct TrainProgress(pub grove_progress::ProgressCounter);

#[test]
fn test_activations() {
	assert_eq!(Activation::Relu.apply(-2.0), 0.0);
	assert_eq!(Activation::Relu.apply(3.0), 3.0);
	assert_eq!(Activation::Relu.derivative(-1.0), 0.0);
	assert_eq!(Activation::Sigmoid.apply(0.0), 0.5);
	assert_eq!(Activation::Sigmoid.derivative(0.0), 0.25);
	assert_eq!(Activation::Tanh.apply(0.0), 0.0);
	assert_eq!(Activation::Tanh.derivative(0.0), 1.0);
	assert_eq!(Activation::Identity.apply(-4.5), -4.5);
	assert_eq!(Activation::Identity.derivative(-4.5), 1.0);
}

#[test]
fn test_validate() {
	let valid = NeuralNetworkOptions {
		layer_sizes: vec![2, 4, 1],
		..Default::default()
	};
	assert!(valid.validate(2).is_ok());
	assert_eq!(
		valid.validate(3),
		Err(Error::FeatureCountMismatch {
			expected: 2,
			actual: 3,
		})
	);
	let invalid = vec![
		NeuralNetworkOptions {
			layer_sizes: vec![2],
			..valid.clone()
		},
		NeuralNetworkOptions {
			layer_sizes: vec![2, 0, 1],
			..valid.clone()
		},
		NeuralNetworkOptions {
			layer_sizes: vec![2, 4, 2],
			..valid.clone()
		},
		NeuralNetworkOptions {
			dropout: 1.0,
			..valid.clone()
		},
		NeuralNetworkOptions {
			dropout: -0.1,
			..valid.clone()
		},
		NeuralNetworkOptions {
			max_epochs: 0,
			..valid.clone()
		},
		NeuralNetworkOptions {
			n_examples_per_batch: 0,
			..valid.clone()
		},
		NeuralNetworkOptions {
			learning_rate: 0.0,
			..valid.clone()
		},
		NeuralNetworkOptions {
			early_stopping_options: Some(EarlyStoppingOptions {
				early_stopping_fraction: 1.0,
				..Default::default()
			}),
			..valid.clone()
		},
	];
	for options in invalid {
		assert!(matches!(options.validate(2), Err(Error::InvalidConfig(_))));
	}
}
