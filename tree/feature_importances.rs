use crate::{Node, Tree};
use num_traits::ToPrimitive;

/// This function computes feature importances using the "split" method, where a feature's importance is proportional to the number of branch nodes that use it to split. If no tree has a branch, every importance is zero.
pub fn compute_feature_importances(trees: &[Tree], n_features: usize) -> Vec<f32> {
	let mut counts = vec![0usize; n_features];
	for tree in trees.iter() {
		for node in tree.nodes.iter() {
			if let Node::Branch(branch) = node {
				counts[branch.feature_index] += 1;
			}
		}
	}
	// Normalize the counts so the importances sum to one.
	let total: usize = counts.iter().sum();
	if total == 0 {
		return vec![0.0; n_features];
	}
	let total = total.to_f32().unwrap();
	counts
		.into_iter()
		.map(|count| count.to_f32().unwrap() / total)
		.collect()
}

#[test]
fn test_compute_feature_importances() {
	use crate::{BranchNode, LeafNode};
	let leaf = || {
		Node::Leaf(LeafNode {
			value: 0.0,
			examples_count: 1,
		})
	};
	let branch = |feature_index, left_child_index| {
		Node::Branch(BranchNode {
			feature_index,
			split_value: 0.0,
			left_child_index,
			right_child_index: left_child_index + 1,
			examples_count: 2,
		})
	};
	let trees = vec![
		Tree {
			nodes: vec![branch(2, 1), leaf(), branch(0, 3), leaf(), leaf()],
		},
		Tree {
			nodes: vec![branch(2, 1), leaf(), leaf()],
		},
		Tree {
			nodes: vec![leaf()],
		},
	];
	assert_eq!(
		compute_feature_importances(&trees, 3),
		vec![1.0 / 3.0, 0.0, 2.0 / 3.0]
	);
	assert_eq!(compute_feature_importances(&trees[2..], 3), vec![0.0; 3]);
}
