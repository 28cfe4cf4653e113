/*!
This crate implements regression models built from decision trees: a single CART-style tree trained by variance reduction ([`train_tree`](fn.train_tree.html)), [`GradientBoosting`](struct.GradientBoosting.html), which fits trees to residuals one round at a time, and [`RandomForest`](struct.RandomForest.html), which averages independently trained trees over bootstrap samples and random feature subsets.

Every model is produced by its `train` function and is immutable afterward, so a trained model can be shared across threads and used for prediction concurrently.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod choose_best_split;
mod feature_importances;
mod gradient_boosting;
mod random_forest;
mod train_tree;

pub use self::feature_importances::compute_feature_importances;
pub use self::gradient_boosting::{GradientBoosting, GradientBoostingOptions};
pub use self::random_forest::{RandomForest, RandomForestOptions};
pub use self::train_tree::train_tree;

use grove_dataset::{invalid_config, Result};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// These are the options that control the growth of a single tree. `GradientBoostingOptions` and `RandomForestOptions` each produce one for the trees they train.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeOptions {
	/// The depth of a tree will never exceed this value. A depth of 0 produces a single leaf.
	pub max_depth: usize,
	/// A node with fewer than this many training examples will not be split.
	pub min_examples_split: usize,
	/// A split will only be considered valid if each of the resulting children receives at least this many training examples.
	pub min_examples_per_child: usize,
	/// A node will only be split if the best split reduces the variance of the targets by more than this value.
	pub min_gain_to_split: f32,
}

impl Default for TreeOptions {
	fn default() -> Self {
		Self {
			max_depth: 5,
			min_examples_split: 2,
			min_examples_per_child: 1,
			min_gain_to_split: 0.0,
		}
	}
}

impl TreeOptions {
	pub fn validate(&self) -> Result<()> {
		if self.min_examples_per_child == 0 {
			return Err(invalid_config("min_examples_per_child must be at least 1"));
		}
		if !self.min_gain_to_split.is_finite() || self.min_gain_to_split < 0.0 {
			return Err(invalid_config(
				"min_gain_to_split must be a finite, non-negative number",
			));
		}
		Ok(())
	}
}

/// This struct reports the training progress. The counter counts boosting rounds for `GradientBoosting` and finished trees for `RandomForest`.
#[derive(Clone, Debug)]
pub struct TrainProgress(pub grove_progress::ProgressCounter);

/// Trees are stored as a `Vec` of `Node`s with the root at index 0. Each branch in the tree has two indexes into the `Vec`, one for each of its children, and both are greater than the branch's own index.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

impl<'de> Deserialize<'de> for Tree {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Tree, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		#[derive(Deserialize)]
		struct UncheckedTree {
			nodes: Vec<Node>,
		}
		let UncheckedTree { nodes } = UncheckedTree::deserialize(deserializer)?;
		Tree::from_nodes(nodes).map_err(serde::de::Error::custom)
	}
}

impl Tree {
	/// Create a tree from its nodes, checking that there is a root and that every child index points forward to a node in the vector, so `predict` always reaches a leaf.
	pub fn from_nodes(nodes: Vec<Node>) -> Result<Tree> {
		if nodes.is_empty() {
			return Err(invalid_config("a tree must have at least one node"));
		}
		for (node_index, node) in nodes.iter().enumerate() {
			if let Node::Branch(branch) = node {
				for child_index in &[branch.left_child_index, branch.right_child_index] {
					if *child_index <= node_index || *child_index >= nodes.len() {
						return Err(invalid_config(format!(
							"node {} has a child index of {} in a tree with {} nodes",
							node_index,
							child_index,
							nodes.len()
						)));
					}
				}
			}
		}
		Ok(Tree { nodes })
	}

	/// Make a prediction for a given example.
	pub fn predict(&self, features: ArrayView1<f32>) -> f32 {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					left_child_index,
					right_child_index,
					feature_index,
					split_value,
					..
				}) => {
					node_index = if features[*feature_index] <= *split_value {
						*left_child_index
					} else {
						*right_child_index
					};
				}
				// We made it to a leaf! The prediction is the leaf's value.
				Node::Leaf(LeafNode { value, .. }) => return *value,
			}
		}
	}

	/// The number of edges on the longest path from the root to a leaf.
	pub fn depth(&self) -> usize {
		let mut max_depth = 0;
		let mut stack = vec![(0, 0)];
		while let Some((node_index, depth)) = stack.pop() {
			max_depth = max_depth.max(depth);
			if let Node::Branch(branch) = &self.nodes[node_index] {
				stack.push((branch.left_child_index, depth + 1));
				stack.push((branch.right_child_index, depth + 1));
			}
		}
		max_depth
	}

	pub fn leaves(&self) -> impl Iterator<Item = &LeafNode> {
		self.nodes.iter().filter_map(|node| match node {
			Node::Leaf(leaf) => Some(leaf),
			Node::Branch(_) => None,
		})
	}
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

impl Node {
	pub fn examples_count(&self) -> usize {
		match self {
			Node::Branch(BranchNode { examples_count, .. }) => *examples_count,
			Node::Leaf(LeafNode { examples_count, .. }) => *examples_count,
		}
	}
}

/// A `BranchNode` sends an example to its left child if the value of the feature at `feature_index` is <= `split_value`, and to its right child otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchNode {
	/// This is the index of the feature to get the value for. It always refers to a column of the full feature matrix, even when the tree was trained on a subset of the columns.
	pub feature_index: usize,
	/// This is the threshold value of the split.
	pub split_value: f32,
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
	/// The number of training examples that passed through this node.
	pub examples_count: usize,
}

/// The leaves in a tree hold the values to output for examples that get sent to them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
	/// This is the value to output, the mean of the targets of the training examples sent to this leaf.
	pub value: f32,
	/// The number of training examples that were sent to this leaf.
	pub examples_count: usize,
}

#[test]
fn test_predict() {
	// x0 <= 1.0 ? 10.0 : (x1 <= 0.5 ? 20.0 : 30.0)
	let tree = Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				feature_index: 0,
				split_value: 1.0,
				left_child_index: 1,
				right_child_index: 2,
				examples_count: 3,
			}),
			Node::Leaf(LeafNode {
				value: 10.0,
				examples_count: 1,
			}),
			Node::Branch(BranchNode {
				feature_index: 1,
				split_value: 0.5,
				left_child_index: 3,
				right_child_index: 4,
				examples_count: 2,
			}),
			Node::Leaf(LeafNode {
				value: 20.0,
				examples_count: 1,
			}),
			Node::Leaf(LeafNode {
				value: 30.0,
				examples_count: 1,
			}),
		],
	};
	assert_eq!(tree.predict(arr1(&[1.0, 9.0]).view()), 10.0);
	assert_eq!(tree.predict(arr1(&[1.5, 0.5]).view()), 20.0);
	assert_eq!(tree.predict(arr1(&[1.5, 0.6]).view()), 30.0);
	assert_eq!(tree.depth(), 2);
	assert_eq!(tree.leaves().count(), 3);
	assert_eq!(tree.nodes[2].examples_count(), 2);
}

#[test]
fn test_from_nodes() {
	let leaf = || {
		Node::Leaf(LeafNode {
			value: 1.0,
			examples_count: 1,
		})
	};
	let branch = |left_child_index, right_child_index| {
		Node::Branch(BranchNode {
			feature_index: 0,
			split_value: 0.5,
			left_child_index,
			right_child_index,
			examples_count: 2,
		})
	};
	assert!(Tree::from_nodes(vec![branch(1, 2), leaf(), leaf()]).is_ok());
	assert!(Tree::from_nodes(Vec::new()).is_err());
	assert!(Tree::from_nodes(vec![branch(1, 3), leaf(), leaf()]).is_err());
	assert!(Tree::from_nodes(vec![branch(0, 2), leaf(), leaf()]).is_err());
	let cycle = r#"{"nodes":[{"Branch":{"feature_index":0,"split_value":0.5,"left_child_index":0,"right_child_index":0,"examples_count":2}}]}"#;
	assert!(serde_json::from_str::<Tree>(cycle).is_err());
	let tree = Tree::from_nodes(vec![branch(1, 2), leaf(), leaf()]).unwrap();
	let json = serde_json::to_string(&tree).unwrap();
	assert_eq!(serde_json::from_str::<Tree>(&json).unwrap(), tree);
}

#[test]
fn test_tree_options_validate() {
	assert!(TreeOptions::default().validate().is_ok());
	assert!(TreeOptions {
		min_examples_per_child: 0,
		..Default::default()
	}
	.validate()
	.is_err());
	assert!(TreeOptions {
		min_gain_to_split: f32::NAN,
		..Default::default()
	}
	.validate()
	.is_err());
}
