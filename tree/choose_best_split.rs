use crate::TreeOptions;
use grove_metrics::MeanVariance;
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// The best split found for a node.
#[derive(Clone, Debug, PartialEq)]
pub struct Split {
	pub feature_index: usize,
	pub split_value: f32,
	/// The reduction in target variance, `parent_variance - (n_left * left_variance + n_right * right_variance) / n`.
	pub gain: f64,
}

/// Scratch buffers reused across every node of a tree so that split search does not allocate per node.
#[derive(Default)]
pub struct SplitScratch {
	pairs: Vec<(f32, f32)>,
	right_stats: Vec<MeanVariance>,
}

/**
Find the split of the examples in `examples_index` with the largest variance reduction, considering only the columns in `feature_indices`.

For each column, the node's `(value, target)` pairs are sorted by value and a threshold is proposed at the midpoint of every pair of adjacent distinct values. Examples with `value <= threshold` go left. Columns are searched in the order given and thresholds in ascending order, and a candidate only replaces the current best if its gain is strictly greater, so ties go to the first candidate found.

Returns `None` when the targets have zero variance or no candidate has a gain greater than `options.min_gain_to_split`.
*/
pub fn choose_best_split(
	features: ArrayView2<f32>,
	targets: &[f32],
	examples_index: &[usize],
	feature_indices: &[usize],
	options: &TreeOptions,
	scratch: &mut SplitScratch,
) -> Option<Split> {
	let n_examples = examples_index.len();
	let mut parent = MeanVariance::default();
	for example_index in examples_index {
		parent.update(targets[*example_index].to_f64().unwrap());
	}
	if parent.m2 <= 0.0 {
		return None;
	}
	let parent_variance = parent.variance();
	let n = n_examples.to_f64().unwrap();
	let min_gain_to_split = options.min_gain_to_split.to_f64().unwrap();
	let mut best_split: Option<Split> = None;
	for feature_index in feature_indices.iter().cloned() {
		let pairs = &mut scratch.pairs;
		pairs.clear();
		pairs.extend(
			examples_index
				.iter()
				.map(|example_index| (features[(*example_index, feature_index)], targets[*example_index])),
		);
		pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
		// right_stats[i] holds the statistics of pairs[i..].
		let right_stats = &mut scratch.right_stats;
		right_stats.clear();
		right_stats.resize(n_examples, MeanVariance::default());
		let mut running = MeanVariance::default();
		for (pair, stats) in pairs.iter().zip(right_stats.iter_mut()).rev() {
			running.update(pair.1.to_f64().unwrap());
			*stats = running;
		}
		let mut left = MeanVariance::default();
		for i in 0..n_examples - 1 {
			left.update(pairs[i].1.to_f64().unwrap());
			let value = pairs[i].0;
			let next_value = pairs[i + 1].0;
			// Only the boundary between two distinct values is a usable threshold.
			if !(value < next_value) {
				continue;
			}
			let n_left = i + 1;
			let n_right = n_examples - n_left;
			if n_left < options.min_examples_per_child || n_right < options.min_examples_per_child {
				continue;
			}
			let right = &right_stats[i + 1];
			let gain = parent_variance - (left.m2 + right.m2) / n;
			if gain <= min_gain_to_split {
				continue;
			}
			let is_better = match &best_split {
				Some(best_split) => gain > best_split.gain,
				None => true,
			};
			if is_better {
				best_split = Some(Split {
					feature_index,
					split_value: midpoint(value, next_value),
					gain,
				});
			}
		}
	}
	best_split
}

/// The midpoint of `a < b`. If the midpoint rounds up to `b`, `a` is returned instead, which sends the same examples left.
fn midpoint(a: f32, b: f32) -> f32 {
	let midpoint = a + (b - a) / 2.0;
	if midpoint < b {
		midpoint
	} else {
		a
	}
}

#[test]
fn test_midpoint() {
	assert_eq!(midpoint(1.0, 2.0), 1.5);
	assert_eq!(midpoint(-3.0, 1.0), -1.0);
	let a = 1.0f32;
	let b = f32::from_bits(a.to_bits() + 1);
	assert_eq!(midpoint(a, b), a);
}

#[test]
fn test_choose_best_split() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let targets = [2.0, 4.0, 6.0, 8.0];
	let split = choose_best_split(
		features.view(),
		&targets,
		&[0, 1, 2, 3],
		&[0],
		&TreeOptions::default(),
		&mut SplitScratch::default(),
	)
	.unwrap();
	assert_eq!(split.feature_index, 0);
	assert_eq!(split.split_value, 2.5);
	assert!((split.gain - 4.0).abs() < 1e-9);
}

#[test]
fn test_ties_go_to_the_first_column() {
	// Both columns separate the targets perfectly.
	let features = arr2(&[[0.0, 10.0], [0.0, 10.0], [1.0, 20.0], [1.0, 20.0]]);
	let targets = [1.0, 1.0, 5.0, 5.0];
	let split = choose_best_split(
		features.view(),
		&targets,
		&[0, 1, 2, 3],
		&[0, 1],
		&TreeOptions::default(),
		&mut SplitScratch::default(),
	)
	.unwrap();
	assert_eq!(split.feature_index, 0);
	assert_eq!(split.split_value, 0.5);
}

#[test]
fn test_no_split_for_constant_targets_or_columns() {
	let mut scratch = SplitScratch::default();
	let features = arr2(&[[1.0], [2.0], [3.0]]);
	assert_eq!(
		choose_best_split(
			features.view(),
			&[7.0, 7.0, 7.0],
			&[0, 1, 2],
			&[0],
			&TreeOptions::default(),
			&mut scratch,
		),
		None
	);
	let features = arr2(&[[4.0], [4.0], [4.0]]);
	assert_eq!(
		choose_best_split(
			features.view(),
			&[1.0, 2.0, 3.0],
			&[0, 1, 2],
			&[0],
			&TreeOptions::default(),
			&mut scratch,
		),
		None
	);
}

#[test]
fn test_min_examples_per_child() {
	// The best unrestricted split isolates the outlier.
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let targets = [0.0, 0.0, 0.0, 100.0];
	let options = TreeOptions {
		min_examples_per_child: 2,
		..Default::default()
	};
	let split = choose_best_split(
		features.view(),
		&targets,
		&[0, 1, 2, 3],
		&[0],
		&options,
		&mut SplitScratch::default(),
	)
	.unwrap();
	assert_eq!(split.split_value, 2.5);
}
