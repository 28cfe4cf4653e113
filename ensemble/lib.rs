/*!
This crate combines the models from `grove_tree` and `grove_neural` into ensembles.

Every trained model implements the [`Regressor`](trait.Regressor.html) trait. [`ModelOptions`](enum.ModelOptions.html) describes any model, including ensembles of other models, and trains it into a [`Model`](enum.Model.html). The ensembles are:

- [`VotingEnsemble`](struct.VotingEnsemble.html), which averages its base models' predictions.
- [`StackingEnsemble`](struct.StackingEnsemble.html), which trains a gradient boosting meta model on its base models' predictions for the training rows.
- [`BlendingEnsemble`](struct.BlendingEnsemble.html), which trains its base models on the leading rows and the meta model on the held out rows.

A [`Registry`](struct.Registry.html) holds already trained models under identifiers and predicts their weighted average.

# Example

```
use grove_dataset::Dataset;
use grove_ensemble::{ModelOptions, Regressor, VotingOptions};
use grove_tree::{GradientBoostingOptions, RandomForestOptions};
use ndarray::prelude::*;

let features = Array2::from_shape_fn((20, 1), |(i, _)| i as f32);
let targets = Array1::from_shape_fn(20, |i| 2.0 * i as f32 + 1.0);
let dataset = Dataset::new(features, targets).unwrap();
let options = ModelOptions::Voting(VotingOptions {
	models: vec![
		ModelOptions::GradientBoosting(GradientBoostingOptions::default()),
		ModelOptions::RandomForest(RandomForestOptions {
			n_trees: 10,
			..Default::default()
		}),
	],
});
let model = options.train(dataset.view(), &mut |_| {}).unwrap();
let predictions = model.predict(dataset.features()).unwrap();
assert_eq!(predictions.len(), 20);
```
*/

#![allow(clippy::tabs_in_doc_comments)]

mod base_models;
mod blending;
mod model;
mod registry;
mod regressor;
mod stacking;
mod voting;

pub use self::blending::{BlendingEnsemble, BlendingOptions};
pub use self::model::{Model, ModelOptions, TrainProgress};
pub use self::registry::{Registry, RegistryEntry};
pub use self::regressor::Regressor;
pub use self::stacking::{StackingEnsemble, StackingOptions};
pub use self::voting::{VotingEnsemble, VotingOptions};
