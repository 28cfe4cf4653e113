use super::StreamingMetric;
use num_traits::ToPrimitive;

/// The arithmetic mean of a stream of values, accumulated in `f64`.
#[derive(Debug, Default)]
pub struct Mean {
	n: u64,
	sum: f64,
}

impl StreamingMetric<'_> for Mean {
	type Input = f32;
	type Output = Option<f32>;

	fn update(&mut self, value: f32) {
		self.n += 1;
		self.sum += value.to_f64().unwrap();
	}

	fn merge(&mut self, other: Self) {
		self.n += other.n;
		self.sum += other.sum;
	}

	fn finalize(self) -> Self::Output {
		if self.n == 0 {
			None
		} else {
			(self.sum / self.n.to_f64().unwrap()).to_f32()
		}
	}
}

#[test]
fn test_mean() {
	let mut mean = Mean::default();
	assert_eq!(Mean::default().finalize(), None);
	for value in &[1.0, 2.0, 3.0, 6.0] {
		mean.update(*value);
	}
	let mut other = Mean::default();
	other.update(8.0);
	mean.merge(other);
	assert_eq!(mean.finalize(), Some(4.0));
}
