//! https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Parallel_algorithm

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Combine two separate means and sums of squared deviations into a single mean and sum of squared deviations. Useful in parallel algorithms, and with `n_b = 1, m2_b = 0` it is Welford's single-value update.
pub fn merge_mean_m2(
	n_a: u64,
	mean_a: f64,
	m2_a: f64,
	n_b: u64,
	mean_b: f64,
	m2_b: f64,
) -> (f64, f64) {
	let n_a = n_a.to_f64().unwrap();
	let n_b = n_b.to_f64().unwrap();
	(
		(((n_a * mean_a) + (n_b * mean_b)) / (n_a + n_b)),
		m2_a + m2_b + (mean_b - mean_a) * (mean_b - mean_a) * (n_a * n_b / (n_a + n_b)),
	)
}

/// A running count, mean, and sum of squared deviations from the mean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanVariance {
	pub n: u64,
	pub mean: f64,
	pub m2: f64,
}

impl MeanVariance {
	pub fn update(&mut self, value: f64) {
		if self.n == 0 {
			*self = MeanVariance {
				n: 1,
				mean: value,
				m2: 0.0,
			};
		} else {
			let (mean, m2) = merge_mean_m2(self.n, self.mean, self.m2, 1, value, 0.0);
			self.n += 1;
			self.mean = mean;
			self.m2 = m2;
		}
	}

	pub fn merge(&mut self, other: &MeanVariance) {
		if other.n == 0 {
			return;
		}
		if self.n == 0 {
			*self = *other;
			return;
		}
		let (mean, m2) = merge_mean_m2(self.n, self.mean, self.m2, other.n, other.mean, other.m2);
		self.n += other.n;
		self.mean = mean;
		self.m2 = m2;
	}

	/// The population variance, or 0 for an empty stream.
	pub fn variance(&self) -> f64 {
		if self.n == 0 {
			0.0
		} else {
			self.m2 / self.n.to_f64().unwrap()
		}
	}
}

#[test]
fn test_mean_variance() {
	let mut left = MeanVariance::default();
	for value in &[2.0, 4.0] {
		left.update(*value);
	}
	let mut right = MeanVariance::default();
	for value in &[6.0, 8.0] {
		right.update(*value);
	}
	assert_eq!(left.mean, 3.0);
	assert_eq!(left.variance(), 1.0);
	left.merge(&right);
	assert_eq!(left.n, 4);
	assert_eq!(left.mean, 5.0);
	assert_eq!(left.variance(), 5.0);
}

#[test]
fn test_constant_values_have_zero_variance() {
	let mut mean_variance = MeanVariance::default();
	for _ in 0..7 {
		mean_variance.update(0.1f32 as f64);
	}
	assert_eq!(mean_variance.m2, 0.0);
}
