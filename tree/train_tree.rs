use crate::{
	choose_best_split::{choose_best_split, SplitScratch},
	BranchNode, LeafNode, Node, Tree, TreeOptions,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// A node waiting to be split. It is already in the tree as a leaf and is replaced by a branch if a split is found.
struct StackItem {
	node_index: usize,
	examples_index: Vec<usize>,
	depth: usize,
}

/**
Train a regression tree on the rows of `features` listed in `examples_index`, searching for splits only in the columns listed in `feature_indices`.

`examples_index` may contain the same row more than once, which is how bootstrap samples are trained. Nodes are grown depth first from an explicit stack rather than by recursion, and every node is pushed onto the tree's node vector as a leaf before it is considered for splitting, so every child index in the finished tree refers to a real node.

A node becomes a leaf whose value is the mean of its targets when its depth reaches `options.max_depth`, when it has fewer than `options.min_examples_split` examples, or when no split improves the variance of its targets.
*/
pub fn train_tree(
	features: ArrayView2<f32>,
	targets: &[f32],
	examples_index: Vec<usize>,
	feature_indices: &[usize],
	options: &TreeOptions,
) -> Tree {
	let mut scratch = SplitScratch::default();
	let mut nodes = vec![leaf(targets, &examples_index)];
	let mut stack = vec![StackItem {
		node_index: 0,
		examples_index,
		depth: 0,
	}];
	while let Some(StackItem {
		node_index,
		examples_index,
		depth,
	}) = stack.pop()
	{
		if depth >= options.max_depth || examples_index.len() < options.min_examples_split {
			continue;
		}
		let split = match choose_best_split(
			features,
			targets,
			&examples_index,
			feature_indices,
			options,
			&mut scratch,
		) {
			Some(split) => split,
			None => continue,
		};
		let examples_count = examples_index.len();
		let (left_examples_index, right_examples_index): (Vec<usize>, Vec<usize>) =
			examples_index.into_iter().partition(|example_index| {
				features[(*example_index, split.feature_index)] <= split.split_value
			});
		let left_child_index = nodes.len();
		nodes.push(leaf(targets, &left_examples_index));
		let right_child_index = nodes.len();
		nodes.push(leaf(targets, &right_examples_index));
		nodes[node_index] = Node::Branch(BranchNode {
			feature_index: split.feature_index,
			split_value: split.split_value,
			left_child_index,
			right_child_index,
			examples_count,
		});
		// Push the right child first so the left subtree is grown first.
		stack.push(StackItem {
			node_index: right_child_index,
			examples_index: right_examples_index,
			depth: depth + 1,
		});
		stack.push(StackItem {
			node_index: left_child_index,
			examples_index: left_examples_index,
			depth: depth + 1,
		});
	}
	Tree { nodes }
}

fn leaf(targets: &[f32], examples_index: &[usize]) -> Node {
	Node::Leaf(LeafNode {
		value: mean(targets, examples_index),
		examples_count: examples_index.len(),
	})
}

/// The mean of the targets at `examples_index`, accumulated in `f64`.
fn mean(targets: &[f32], examples_index: &[usize]) -> f32 {
	if examples_index.is_empty() {
		return 0.0;
	}
	let sum: f64 = examples_index
		.iter()
		.map(|example_index| targets[*example_index].to_f64().unwrap())
		.sum();
	(sum / examples_index.len().to_f64().unwrap()) as f32
}

#[cfg(test)]
fn all_examples(n: usize) -> Vec<usize> {
	(0..n).collect()
}

#[cfg(test)]
fn training_mse(tree: &Tree, features: ArrayView2<f32>, targets: &[f32]) -> f32 {
	let squared_error: f32 = features
		.axis_iter(Axis(0))
		.zip(targets)
		.map(|(row, target)| (tree.predict(row) - target).powi(2))
		.sum();
	squared_error / targets.len() as f32
}

#[test]
fn test_train_tree() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let targets = [2.0, 4.0, 6.0, 8.0];
	let tree = train_tree(
		features.view(),
		&targets,
		all_examples(4),
		&[0],
		&TreeOptions {
			max_depth: 1,
			..Default::default()
		},
	);
	insta::assert_debug_snapshot!(tree, @r###"
 Tree {
     nodes: [
         Branch(
             BranchNode {
                 feature_index: 0,
                 split_value: 2.5,
                 left_child_index: 1,
                 right_child_index: 2,
                 examples_count: 4,
             },
         ),
         Leaf(
             LeafNode {
                 value: 3.0,
                 examples_count: 2,
             },
         ),
         Leaf(
             LeafNode {
                 value: 7.0,
                 examples_count: 2,
             },
         ),
     ],
 }
 "###);
}

#[test]
fn test_deep_tree_fits_training_data() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let targets = [2.0, 4.0, 6.0, 8.0];
	let tree = train_tree(
		features.view(),
		&targets,
		all_examples(4),
		&[0],
		&TreeOptions::default(),
	);
	for (row, target) in features.axis_iter(Axis(0)).zip(targets.iter()) {
		assert_eq!(tree.predict(row), *target);
	}
	assert_eq!(tree.leaves().count(), 4);
}

#[test]
fn test_constant_targets_give_a_single_leaf() {
	let features = arr2(&[[1.0, 5.0], [2.0, 3.0], [3.0, 1.0], [4.0, 0.0]]);
	let targets = [0.1, 0.1, 0.1, 0.1];
	let tree = train_tree(
		features.view(),
		&targets,
		all_examples(4),
		&[0, 1],
		&TreeOptions::default(),
	);
	assert_eq!(tree.nodes.len(), 1);
	for row in features.axis_iter(Axis(0)) {
		assert_eq!(tree.predict(row), 0.1);
	}
	assert_eq!(tree.predict(arr1(&[100.0, -100.0]).view()), 0.1);
}

#[test]
fn test_single_row() {
	let features = arr2(&[[3.0, 4.0]]);
	let tree = train_tree(features.view(), &[9.5], vec![0], &[0, 1], &Default::default());
	assert_eq!(
		tree.nodes,
		vec![Node::Leaf(LeafNode {
			value: 9.5,
			examples_count: 1,
		})]
	);
}

#[test]
fn test_duplicate_feature_values_give_a_leaf() {
	let features = arr2(&[[2.0], [2.0], [2.0]]);
	let tree = train_tree(
		features.view(),
		&[1.0, 2.0, 6.0],
		all_examples(3),
		&[0],
		&Default::default(),
	);
	assert_eq!(tree.nodes.len(), 1);
	assert_eq!(tree.predict(arr1(&[2.0]).view()), 3.0);
}

#[test]
fn test_min_examples_split() {
	let features = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
	let targets = [2.0, 4.0, 6.0, 8.0];
	let tree = train_tree(
		features.view(),
		&targets,
		all_examples(4),
		&[0],
		&TreeOptions {
			min_examples_split: 3,
			..Default::default()
		},
	);
	// The root splits into two children of two examples each, which are too small to split.
	assert_eq!(tree.nodes.len(), 3);
	assert_eq!(tree.depth(), 1);
}

#[test]
fn test_feature_subset_keeps_original_column_indices() {
	// Column 2 is the only one related to the target.
	let features = arr2(&[
		[0.0, 9.0, 1.0],
		[0.0, 9.0, 2.0],
		[0.0, 9.0, 3.0],
		[0.0, 9.0, 4.0],
	]);
	let targets = [1.0, 1.0, 10.0, 10.0];
	let tree = train_tree(
		features.view(),
		&targets,
		all_examples(4),
		&[1, 2],
		&Default::default(),
	);
	match &tree.nodes[0] {
		Node::Branch(branch) => {
			assert_eq!(branch.feature_index, 2);
			assert_eq!(branch.split_value, 2.5);
		}
		Node::Leaf(_) => panic!("expected the root to be a branch"),
	}
}

#[test]
fn test_repeated_examples() {
	let features = arr2(&[[1.0], [2.0]]);
	let targets = [0.0, 3.0];
	let tree = train_tree(
		features.view(),
		&targets,
		vec![0, 0, 0, 1],
		&[0],
		&TreeOptions {
			max_depth: 0,
			..Default::default()
		},
	);
	assert_eq!(
		tree.nodes,
		vec![Node::Leaf(LeafNode {
			value: 0.75,
			examples_count: 4,
		})]
	);
}

#[test]
fn test_training_mse_does_not_increase_with_depth() {
	let n = 64;
	let features = Array2::from_shape_fn((n, 2), |(i, j)| {
		let x = i as f32;
		if j == 0 {
			x
		} else {
			(x * 7.0) % 13.0
		}
	});
	let targets = (0..n)
		.map(|i| {
			let x = i as f32;
			(x / 8.0).sin() * 10.0 + ((x * 7.0) % 13.0)
		})
		.collect::<Vec<_>>();
	let mut previous_mse = f32::INFINITY;
	for max_depth in 0..8 {
		let tree = train_tree(
			features.view(),
			&targets,
			all_examples(n),
			&[0, 1],
			&TreeOptions {
				max_depth,
				..Default::default()
			},
		);
		let mse = training_mse(&tree, features.view(), &targets);
		assert!(mse <= previous_mse + 1e-4);
		assert!(tree.depth() <= max_depth);
		previous_mse = mse;
	}
}
