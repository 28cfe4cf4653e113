#![allow(clippy::tabs_in_doc_comments)]

use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

/**
A `ProgressCounter` tracks the progress of a training run whose steps may complete on several threads at once, such as the trees of a random forest being built on the rayon pool.

Counting with an `Arc<Mutex<u64>>` would make every finished tree wait on the lock. `ProgressCounter` wraps an atomic instead, and clones share the same counter, so the caller can hold one clone and watch it while the trainer increments another:

```
use grove_progress::ProgressCounter;
use rayon::prelude::*;

let progress_counter = ProgressCounter::new(100);
(0..100).into_par_iter().for_each(|_| {
	progress_counter.inc(1);
});
assert_eq!(progress_counter.get(), progress_counter.total());
```
*/
#[derive(Clone, Debug)]
pub struct ProgressCounter {
	current: Arc<AtomicU64>,
	total: u64,
}

impl ProgressCounter {
	/// Create a new `ProgressCounter` that will count from 0 up to the specified `total`.
	pub fn new(total: u64) -> Self {
		Self {
			current: Arc::new(AtomicU64::new(0)),
			total,
		}
	}
	/// Retrieve the total value this `ProgressCounter` counts up to.
	pub fn total(&self) -> u64 {
		self.total
	}
	/// Retrieve the current progress value.
	pub fn get(&self) -> u64 {
		self.current.load(Ordering::Relaxed)
	}
	/// Increment the progress value by `amount`.
	pub fn inc(&self, amount: u64) {
		self.current.fetch_add(amount, Ordering::Relaxed);
	}
}

#[test]
fn test_clones_share_the_counter() {
	let counter = ProgressCounter::new(3);
	let clone = counter.clone();
	clone.inc(2);
	assert_eq!(counter.get(), 2);
	counter.inc(1);
	assert_eq!(clone.get(), clone.total());
}
