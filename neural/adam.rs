use crate::network::{Layer, LayerGradients};
use itertools::izip;
use ndarray::prelude::*;

/// The first and second moment estimates Adam keeps for every weight and bias.
pub struct AdamState {
	beta_1: f32,
	beta_2: f32,
	epsilon: f32,
	moments: Vec<LayerMoments>,
}

struct LayerMoments {
	weights_m: Array2<f32>,
	weights_v: Array2<f32>,
	biases_m: Array1<f32>,
	biases_v: Array1<f32>,
}

impl AdamState {
	pub fn new(layers: &[Layer], beta_1: f32, beta_2: f32, epsilon: f32) -> Self {
		let moments = layers
			.iter()
			.map(|layer| LayerMoments {
				weights_m: Array2::zeros(layer.weights.raw_dim()),
				weights_v: Array2::zeros(layer.weights.raw_dim()),
				biases_m: Array1::zeros(layer.biases.raw_dim()),
				biases_v: Array1::zeros(layer.biases.raw_dim()),
			})
			.collect();
		Self {
			beta_1,
			beta_2,
			epsilon,
			moments,
		}
	}

	/**
	Apply one Adam update to every layer.

	The bias correction uses `step`, which counts epochs from 1, so every batch within an epoch is corrected by the same factor.
	*/
	pub fn step(
		&mut self,
		layers: &mut [Layer],
		gradients: &[LayerGradients],
		learning_rate: f32,
		step: i32,
	) {
		let beta_1 = self.beta_1;
		let beta_2 = self.beta_2;
		let epsilon = self.epsilon;
		let correction_1 = 1.0 - beta_1.powi(step);
		let correction_2 = 1.0 - beta_2.powi(step);
		let update = |parameter: &mut f32, m: &mut f32, v: &mut f32, gradient: f32| {
			*m = beta_1 * *m + (1.0 - beta_1) * gradient;
			*v = beta_2 * *v + (1.0 - beta_2) * gradient * gradient;
			let m_hat = *m / correction_1;
			let v_hat = *v / correction_2;
			*parameter -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
		};
		for (layer, moments, gradients) in izip!(layers, &mut self.moments, gradients) {
			for (weight, m, v, gradient) in izip!(
				layer.weights.iter_mut(),
				moments.weights_m.iter_mut(),
				moments.weights_v.iter_mut(),
				gradients.weights.iter()
			) {
				update(weight, m, v, *gradient);
			}
			for (bias, m, v, gradient) in izip!(
				layer.biases.iter_mut(),
				moments.biases_m.iter_mut(),
				moments.biases_v.iter_mut(),
				gradients.biases.iter()
			) {
				update(bias, m, v, *gradient);
			}
		}
	}
}

#[test]
fn test_first_step_moves_each_parameter_by_the_learning_rate() {
	let mut layers = vec![Layer {
		weights: arr2(&[[1.0, -1.0]]),
		biases: arr1(&[0.0]),
	}];
	let gradients = vec![LayerGradients {
		weights: arr2(&[[0.5, -20.0]]),
		biases: arr1(&[3.0]),
	}];
	let mut adam = AdamState::new(&layers, 0.9, 0.999, 1e-8);
	adam.step(&mut layers, &gradients, 0.1, 1);
	assert!((layers[0].weights[(0, 0)] - 0.9).abs() < 1e-5);
	assert!((layers[0].weights[(0, 1)] - -0.9).abs() < 1e-5);
	assert!((layers[0].biases[0] - -0.1).abs() < 1e-5);
}
