use crate::{
	adam::AdamState, early_stopping::EarlyStoppingMonitor, Activation, NeuralNetworkOptions,
	Optimizer, TrainProgress,
};
use grove_dataset::{check_prediction_shape, invalid_config, DatasetView, Error, Result};
use grove_metrics::{MeanSquaredError, StreamingMetric};
use grove_progress::ProgressCounter;
use grove_util::finite::all_finite;
use itertools::izip;
use log::{debug, info, warn};
use ndarray::{azip, prelude::*, s};
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const N_EXAMPLES_PER_PREDICTION_CHUNK: usize = 256;

/// A fully connected feed forward network with a single output neuron. It always has at least one layer, and each layer's input width matches the previous layer's output width.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NeuralNetwork {
	/// The layers after the input layer, in order.
	pub layers: Vec<Layer>,
	pub activation: Activation,
	pub output_activation: Activation,
	/// The mean squared error on the training rows for each epoch that ran.
	pub losses: Vec<f32>,
}

/// A fully connected layer. `weights` has one row for each neuron in this layer and one column for each neuron in the previous layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
	pub weights: Array2<f32>,
	pub biases: Array1<f32>,
}

impl<'de> Deserialize<'de> for NeuralNetwork {
	fn deserialize<D>(deserializer: D) -> std::result::Result<NeuralNetwork, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		#[derive(Deserialize)]
		struct UncheckedNeuralNetwork {
			layers: Vec<Layer>,
			activation: Activation,
			output_activation: Activation,
			losses: Vec<f32>,
		}
		let network = UncheckedNeuralNetwork::deserialize(deserializer)?;
		check_layers(&network.layers).map_err(serde::de::Error::custom)?;
		Ok(NeuralNetwork {
			layers: network.layers,
			activation: network.activation,
			output_activation: network.output_activation,
			losses: network.losses,
		})
	}
}

fn check_layers(layers: &[Layer]) -> Result<()> {
	let last_layer = layers
		.last()
		.ok_or_else(|| invalid_config("a network must have at least one layer"))?;
	if last_layer.weights.nrows() != 1 {
		return Err(invalid_config("the last layer must have a single neuron"));
	}
	let mut n_inputs = layers[0].weights.ncols();
	for (layer_index, layer) in layers.iter().enumerate() {
		if layer.weights.ncols() != n_inputs || layer.biases.len() != layer.weights.nrows() {
			return Err(invalid_config(format!(
				"the shape of layer {} does not match its inputs",
				layer_index
			)));
		}
		n_inputs = layer.weights.nrows();
	}
	Ok(())
}

/// The gradient of the loss with respect to one layer's parameters.
pub struct LayerGradients {
	pub weights: Array2<f32>,
	pub biases: Array1<f32>,
}

/// The intermediate values of a training forward pass, which the backward pass needs.
struct ForwardPass {
	/// `outputs[0]` is the batch of features and `outputs[i + 1]` is the output of layer `i`, after activation and dropout.
	outputs: Vec<Array2<f32>>,
	/// The weighted sums of each layer before activation.
	weighted_sums: Vec<Array2<f32>>,
	/// The scaled dropout mask applied to each hidden layer's output, if dropout is enabled.
	masks: Vec<Option<Array2<f32>>>,
}

impl NeuralNetwork {
	/**
	Train a neural network to minimize the mean squared error of its output.

	The rows are processed in order in batches of `options.n_examples_per_batch`, and the parameters are updated by the optimizer after every batch. If the parameters stop being finite, training stops with `Error::NumericInstability`.
	*/
	pub fn train(
		dataset: DatasetView,
		options: &NeuralNetworkOptions,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<NeuralNetwork> {
		options.validate(dataset.ncols())?;
		let (dataset_train, dataset_early_stopping) = match &options.early_stopping_options {
			Some(early_stopping_options) => {
				let (dataset_train, dataset_early_stopping) =
					dataset.split_at_fraction(early_stopping_options.early_stopping_fraction);
				if dataset_train.nrows() == 0 || dataset_early_stopping.nrows() == 0 {
					return Err(invalid_config(format!(
						"an early stopping fraction of {} leaves no rows for training or for early stopping",
						early_stopping_options.early_stopping_fraction
					)));
				}
				(dataset_train, Some(dataset_early_stopping))
			}
			None => (dataset, None),
		};
		info!(
			"training a neural network with layer sizes {:?} on {} examples for up to {} epochs",
			options.layer_sizes,
			dataset_train.nrows(),
			options.max_epochs,
		);
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let mut model = NeuralNetwork::initialize(options, &mut rng);
		let Optimizer::Adam {
			beta_1,
			beta_2,
			epsilon,
		} = options.optimizer;
		let mut adam = AdamState::new(&model.layers, beta_1, beta_2, epsilon);
		let mut early_stopping_monitor =
			options
				.early_stopping_options
				.as_ref()
				.map(|early_stopping_options| {
					EarlyStoppingMonitor::new(
						early_stopping_options.min_decrease_in_loss_for_significant_change,
						early_stopping_options.n_epochs_without_improvement_to_stop,
					)
				});
		let epoch_counter = ProgressCounter::new(options.max_epochs.to_u64().unwrap());
		update_progress(TrainProgress(epoch_counter.clone()));
		let n_layers = model.layers.len();
		for epoch in 0..options.max_epochs {
			let step = (epoch + 1).to_i32().unwrap_or(i32::MAX);
			let mut loss = MeanSquaredError::default();
			for (features, targets) in izip!(
				dataset_train
					.features()
					.axis_chunks_iter(Axis(0), options.n_examples_per_batch),
				dataset_train
					.targets()
					.axis_chunks_iter(Axis(0), options.n_examples_per_batch)
			) {
				let forward_pass = model.forward(features, options.dropout, &mut rng);
				for (prediction, target) in forward_pass.outputs[n_layers].column(0).iter().zip(targets)
				{
					loss.update((*prediction, *target));
				}
				let gradients = model.backward(&forward_pass, targets);
				adam.step(&mut model.layers, &gradients, options.learning_rate, step);
				if !model.is_finite() {
					warn!("the network's parameters stopped being finite in epoch {}", epoch);
					return Err(Error::NumericInstability {
						stage: "epoch",
						step: epoch,
					});
				}
			}
			let epoch_loss = loss.finalize().unwrap_or(0.0);
			debug!("epoch {} finished with a training loss of {}", epoch, epoch_loss);
			model.losses.push(epoch_loss);
			epoch_counter.inc(1);
			if let (Some(early_stopping_monitor), Some(dataset_early_stopping)) =
				(early_stopping_monitor.as_mut(), dataset_early_stopping)
			{
				let early_stopping_loss = model.compute_loss(dataset_early_stopping);
				if early_stopping_monitor.update(early_stopping_loss) {
					warn!("stopping early after epoch {}", epoch);
					break;
				}
			}
		}
		info!(
			"finished training the neural network after {} epochs",
			model.losses.len()
		);
		Ok(model)
	}

	/// Write predictions into `predictions` for the input `features`. Dropout is never applied. Chunks of rows are predicted in parallel.
	pub fn predict(&self, features: ArrayView2<f32>, predictions: &mut [f32]) -> Result<()> {
		check_prediction_shape(features, self.n_features(), predictions.len())?;
		predictions
			.par_chunks_mut(N_EXAMPLES_PER_PREDICTION_CHUNK)
			.enumerate()
			.for_each(|(chunk_index, predictions)| {
				let start = chunk_index * N_EXAMPLES_PER_PREDICTION_CHUNK;
				let features = features.slice(s![start..start + predictions.len(), ..]);
				let outputs = self.predict_batch(features);
				for (prediction, output) in predictions.iter_mut().zip(outputs.column(0)) {
					*prediction = *output;
				}
			});
		Ok(())
	}

	/// The number of features the network was trained with.
	pub fn n_features(&self) -> usize {
		self.layers[0].weights.ncols()
	}

	/// Create a network with Xavier uniform initialized weights and zero biases.
	fn initialize(options: &NeuralNetworkOptions, rng: &mut Xoshiro256Plus) -> NeuralNetwork {
		let layers = options
			.layer_sizes
			.windows(2)
			.map(|sizes| {
				let (n_inputs, n_outputs) = (sizes[0], sizes[1]);
				let limit = (6.0 / (n_inputs + n_outputs).to_f32().unwrap()).sqrt();
				Layer {
					weights: Array2::from_shape_fn((n_outputs, n_inputs), |_| {
						rng.gen_range(-limit, limit)
					}),
					biases: Array1::zeros(n_outputs),
				}
			})
			.collect();
		NeuralNetwork {
			layers,
			activation: options.activation,
			output_activation: options.output_activation.unwrap_or(options.activation),
			losses: Vec::new(),
		}
	}

	fn layer_activation(&self, layer_index: usize) -> Activation {
		if layer_index + 1 == self.layers.len() {
			self.output_activation
		} else {
			self.activation
		}
	}

	fn predict_batch(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let mut outputs = features.to_owned();
		for (layer_index, layer) in self.layers.iter().enumerate() {
			let activation = self.layer_activation(layer_index);
			outputs = (outputs.dot(&layer.weights.t()) + &layer.biases)
				.mapv_into(|value| activation.apply(value));
		}
		outputs
	}

	fn forward(
		&self,
		features: ArrayView2<f32>,
		dropout: f32,
		rng: &mut Xoshiro256Plus,
	) -> ForwardPass {
		let n_layers = self.layers.len();
		let mut outputs = Vec::with_capacity(n_layers + 1);
		let mut weighted_sums = Vec::with_capacity(n_layers);
		let mut masks = Vec::with_capacity(n_layers);
		outputs.push(features.to_owned());
		for (layer_index, layer) in self.layers.iter().enumerate() {
			let weighted_sum = outputs[layer_index].dot(&layer.weights.t()) + &layer.biases;
			let activation = self.layer_activation(layer_index);
			let mut output = weighted_sum.mapv(|value| activation.apply(value));
			let is_hidden = layer_index + 1 < n_layers;
			let mask = if is_hidden && dropout > 0.0 {
				let scale = 1.0 / (1.0 - dropout);
				let mask = Array2::from_shape_fn(output.raw_dim(), |_| {
					if rng.gen::<f32>() < dropout {
						0.0
					} else {
						scale
					}
				});
				output *= &mask;
				Some(mask)
			} else {
				None
			};
			weighted_sums.push(weighted_sum);
			masks.push(mask);
			outputs.push(output);
		}
		ForwardPass {
			outputs,
			weighted_sums,
			masks,
		}
	}

	/// Compute the gradient of the batch's mean squared error with respect to every layer's parameters.
	fn backward(&self, forward_pass: &ForwardPass, targets: ArrayView1<f32>) -> Vec<LayerGradients> {
		let n_layers = self.layers.len();
		let n_examples = targets.len().to_f32().unwrap();
		let predictions = forward_pass.outputs[n_layers].column(0);
		let output_weighted_sums = forward_pass.weighted_sums[n_layers - 1].column(0);
		// delta is the gradient of the loss with respect to the current layer's weighted sums.
		let mut delta = Array2::from_shape_fn((targets.len(), 1), |(example_index, _)| {
			2.0 * (predictions[example_index] - targets[example_index]) / n_examples
				* self
					.output_activation
					.derivative(output_weighted_sums[example_index])
		});
		let mut gradients = Vec::with_capacity(n_layers);
		for layer_index in (0..n_layers).rev() {
			gradients.push(LayerGradients {
				weights: delta.t().dot(&forward_pass.outputs[layer_index]),
				biases: delta.sum_axis(Axis(0)),
			});
			if layer_index == 0 {
				break;
			}
			let mut previous_delta = delta.dot(&self.layers[layer_index].weights);
			if let Some(mask) = &forward_pass.masks[layer_index - 1] {
				previous_delta *= mask;
			}
			let activation = self.layer_activation(layer_index - 1);
			azip!((value in &mut previous_delta, &weighted_sum in &forward_pass.weighted_sums[layer_index - 1]) {
				*value *= activation.derivative(weighted_sum);
			});
			delta = previous_delta;
		}
		gradients.reverse();
		gradients
	}

	fn compute_loss(&self, dataset: DatasetView) -> f32 {
		let outputs = self.predict_batch(dataset.features());
		let mut loss = MeanSquaredError::default();
		for (prediction, target) in izip!(outputs.column(0), dataset.targets()) {
			loss.update((*prediction, *target));
		}
		loss.finalize().unwrap_or(0.0)
	}

	fn is_finite(&self) -> bool {
		self.layers.iter().all(|layer| {
			all_finite(layer.weights.iter()).is_ok() && all_finite(layer.biases.iter()).is_ok()
		})
	}
}

#[cfg(test)]
fn line_dataset() -> grove_dataset::Dataset {
	let n = 50;
	let features = Array2::from_shape_fn((n, 1), |(i, _)| i as f32 / 49.0);
	let targets = Array1::from_shape_fn(n, |i| {
		let x = i as f32 / 49.0;
		2.0 * x + 1.0 + 0.01 * (i as f32).sin()
	});
	grove_dataset::Dataset::new(features, targets).unwrap()
}

#[cfg(test)]
fn predict(model: &NeuralNetwork, features: ArrayView2<f32>) -> Vec<f32> {
	let mut predictions = vec![0.0; features.nrows()];
	model.predict(features, &mut predictions).unwrap();
	predictions
}

#[test]
fn test_fits_a_line() {
	let dataset = line_dataset();
	let mut counters = Vec::new();
	let model = NeuralNetwork::train(
		dataset.view(),
		&NeuralNetworkOptions {
			layer_sizes: vec![1, 16, 1],
			activation: Activation::Relu,
			output_activation: Some(Activation::Identity),
			learning_rate: 0.01,
			max_epochs: 1000,
			n_examples_per_batch: 10,
			..Default::default()
		},
		&mut |TrainProgress(counter)| counters.push(counter),
	)
	.unwrap();
	assert_eq!(counters.len(), 1);
	assert_eq!(counters[0].get(), counters[0].total());
	assert_eq!(model.losses.len(), 1000);
	let predictions = predict(&model, dataset.features());
	let mae = predictions
		.iter()
		.zip(dataset.targets())
		.map(|(prediction, target)| (prediction - target).abs())
		.sum::<f32>()
		/ dataset.nrows() as f32;
	assert!(mae < 0.1, "mae = {}", mae);
}

#[test]
fn test_loss_decreases_with_sigmoid_activations() {
	let features = Array2::from_shape_fn((40, 2), |(i, j)| ((i + j * 7) % 11) as f32 / 10.0);
	let targets = Array1::from_shape_fn(40, |i| 0.5 + 0.3 * features[(i, 0)] - 0.2 * features[(i, 1)]);
	let dataset = grove_dataset::Dataset::new(features, targets).unwrap();
	let model = NeuralNetwork::train(
		dataset.view(),
		&NeuralNetworkOptions {
			layer_sizes: vec![2, 6, 1],
			activation: Activation::Sigmoid,
			max_epochs: 200,
			n_examples_per_batch: 8,
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	assert_eq!(model.output_activation, Activation::Sigmoid);
	assert!(model.losses[model.losses.len() - 1] < model.losses[0]);
}

#[test]
fn test_backward_matches_finite_differences() {
	let features = arr2(&[[0.5, -1.0], [1.5, 0.25], [-0.75, 2.0]]);
	let targets = arr1(&[1.0, -0.5, 0.25]);
	let options = NeuralNetworkOptions {
		layer_sizes: vec![2, 3, 1],
		activation: Activation::Tanh,
		output_activation: Some(Activation::Identity),
		..Default::default()
	};
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let model = NeuralNetwork::initialize(&options, &mut rng);
	let forward_pass = model.forward(features.view(), 0.0, &mut rng);
	let gradients = model.backward(&forward_pass, targets.view());
	let loss = |model: &NeuralNetwork| {
		let predictions = model.predict_batch(features.view());
		izip!(predictions.column(0), &targets)
			.map(|(prediction, target)| (prediction - target).powi(2))
			.sum::<f32>()
			/ 3.0
	};
	let h = 1e-2;
	for (layer_index, layer_gradients) in gradients.iter().enumerate() {
		for ((i, j), gradient) in layer_gradients.weights.indexed_iter() {
			let mut plus = model.clone();
			plus.layers[layer_index].weights[(i, j)] += h;
			let mut minus = model.clone();
			minus.layers[layer_index].weights[(i, j)] -= h;
			let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
			assert!((numeric - gradient).abs() < 1e-2);
		}
		for (i, gradient) in layer_gradients.biases.iter().enumerate() {
			let mut plus = model.clone();
			plus.layers[layer_index].biases[i] += h;
			let mut minus = model.clone();
			minus.layers[layer_index].biases[i] -= h;
			let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
			assert!((numeric - gradient).abs() < 1e-2);
		}
	}
}

#[test]
fn test_initialization() {
	let options = NeuralNetworkOptions {
		layer_sizes: vec![3, 5, 2, 1],
		..Default::default()
	};
	let model = NeuralNetwork::initialize(&options, &mut Xoshiro256Plus::seed_from_u64(1));
	assert_eq!(model.layers.len(), 3);
	for (layer, sizes) in model.layers.iter().zip(options.layer_sizes.windows(2)) {
		assert_eq!(layer.weights.dim(), (sizes[1], sizes[0]));
		assert_eq!(layer.biases.len(), sizes[1]);
		let limit = (6.0 / (sizes[0] + sizes[1]) as f32).sqrt();
		assert!(layer.weights.iter().all(|weight| weight.abs() <= limit));
		assert!(layer.biases.iter().all(|bias| *bias == 0.0));
	}
	assert_eq!(model.n_features(), 3);
}

#[test]
fn test_dropout_only_applies_during_training() {
	let dataset = line_dataset();
	// Tanh keeps every hidden neuron active, so dropping one always changes the gradients.
	let options = NeuralNetworkOptions {
		layer_sizes: vec![1, 8, 1],
		activation: Activation::Tanh,
		output_activation: Some(Activation::Identity),
		max_epochs: 20,
		n_examples_per_batch: 10,
		..Default::default()
	};
	let without_dropout = NeuralNetwork::train(dataset.view(), &options, &mut |_| {}).unwrap();
	let with_dropout = NeuralNetwork::train(
		dataset.view(),
		&NeuralNetworkOptions {
			dropout: 0.5,
			..options
		},
		&mut |_| {},
	)
	.unwrap();
	assert_ne!(with_dropout.layers, without_dropout.layers);
	let a = predict(&with_dropout, dataset.features());
	let b = predict(&with_dropout, dataset.features());
	assert_eq!(a, b);
	assert!(a.iter().all(|prediction| prediction.is_finite()));
}

#[test]
fn test_numeric_instability() {
	let features = Array2::from_shape_fn((20, 1), |(i, _)| (i + 1) as f32);
	let targets = Array1::from_shape_fn(20, |i| (i + 1) as f32);
	let dataset = grove_dataset::Dataset::new(features, targets).unwrap();
	let result = NeuralNetwork::train(
		dataset.view(),
		&NeuralNetworkOptions {
			layer_sizes: vec![1, 4, 1],
			activation: Activation::Identity,
			learning_rate: 1e30,
			max_epochs: 10,
			n_examples_per_batch: 5,
			..Default::default()
		},
		&mut |_| {},
	);
	assert!(matches!(
		result,
		Err(Error::NumericInstability { stage: "epoch", .. })
	));
}

#[test]
fn test_early_stopping() {
	let dataset = line_dataset();
	let model = NeuralNetwork::train(
		dataset.view(),
		&NeuralNetworkOptions {
			layer_sizes: vec![1, 4, 1],
			max_epochs: 50,
			early_stopping_options: Some(crate::EarlyStoppingOptions {
				early_stopping_fraction: 0.2,
				n_epochs_without_improvement_to_stop: 1,
				min_decrease_in_loss_for_significant_change: 1e9,
			}),
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	assert_eq!(model.losses.len(), 2);
}

#[test]
fn test_predict_shape_errors() {
	let dataset = line_dataset();
	let model = NeuralNetwork::train(
		dataset.view(),
		&NeuralNetworkOptions {
			max_epochs: 1,
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	let mut predictions = vec![0.0; 2];
	assert_eq!(
		model.predict(arr2(&[[1.0, 2.0], [3.0, 4.0]]).view(), &mut predictions),
		Err(Error::FeatureCountMismatch {
			expected: 1,
			actual: 2,
		})
	);
	assert_eq!(
		model.predict(arr2(&[[1.0]]).view(), &mut predictions),
		Err(Error::PredictionsLengthMismatch {
			expected: 1,
			actual: 2,
		})
	);
}

#[test]
fn test_serialize() {
	let dataset = line_dataset();
	let model = NeuralNetwork::train(
		dataset.view(),
		&NeuralNetworkOptions {
			max_epochs: 3,
			..Default::default()
		},
		&mut |_| {},
	)
	.unwrap();
	let json = serde_json::to_string(&model).unwrap();
	let deserialized: NeuralNetwork = serde_json::from_str(&json).unwrap();
	assert_eq!(
		predict(&model, dataset.features()),
		predict(&deserialized, dataset.features())
	);
}

#[test]
fn test_deserialize_checks_layer_shapes() {
	let layer = |n_outputs: usize, n_inputs: usize| Layer {
		weights: Array2::zeros((n_outputs, n_inputs)),
		biases: Array1::zeros(n_outputs),
	};
	let network = |layers: Vec<Layer>| NeuralNetwork {
		layers,
		activation: Activation::Relu,
		output_activation: Activation::Identity,
		losses: Vec::new(),
	};
	let deserialize = |network: &NeuralNetwork| {
		let json = serde_json::to_string(network).unwrap();
		serde_json::from_str::<NeuralNetwork>(&json)
	};
	let valid = network(vec![layer(4, 2), layer(1, 4)]);
	assert_eq!(deserialize(&valid).unwrap(), valid);
	assert!(deserialize(&network(Vec::new())).is_err());
	assert!(deserialize(&network(vec![layer(4, 2), layer(1, 3)])).is_err());
	assert!(deserialize(&network(vec![layer(4, 2), layer(2, 4)])).is_err());
	let mut bad_biases = valid.clone();
	bad_biases.layers[0].biases = Array1::zeros(3);
	assert!(deserialize(&bad_biases).is_err());
}
