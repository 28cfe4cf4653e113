/**
The `EarlyStoppingMonitor` keeps track of the values of an early stopping metric for each epoch, and if enough epochs have passed without a significant improvement in the metric, the `update()` function will return `true` to indicate that training should be stopped.
*/
pub struct EarlyStoppingMonitor {
	threshold: f32,
	epochs: usize,
	n_epochs_without_observed_improvement: usize,
	previous_epoch_metric_value: Option<f32>,
}

impl EarlyStoppingMonitor {
	pub fn new(threshold: f32, epochs: usize) -> Self {
		EarlyStoppingMonitor {
			threshold,
			epochs,
			previous_epoch_metric_value: None,
			n_epochs_without_observed_improvement: 0,
		}
	}

	/// Record the next epoch's early stopping metric. Returns true if training should stop.
	pub fn update(&mut self, early_stopping_metric_value: f32) -> bool {
		let result = if let Some(previous_epoch_metric_value) = self.previous_epoch_metric_value {
			if early_stopping_metric_value > previous_epoch_metric_value
				|| f32::abs(early_stopping_metric_value - previous_epoch_metric_value)
					< self.threshold
			{
				self.n_epochs_without_observed_improvement += 1;
				self.n_epochs_without_observed_improvement >= self.epochs
			} else {
				self.n_epochs_without_observed_improvement = 0;
				false
			}
		} else {
			false
		};
		self.previous_epoch_metric_value = Some(early_stopping_metric_value);
		result
	}
}

#[test]
fn test_early_stopping_monitor() {
	let mut monitor = EarlyStoppingMonitor::new(0.01, 2);
	assert!(!monitor.update(1.0));
	assert!(!monitor.update(0.5));
	// Within the threshold of the previous value.
	assert!(!monitor.update(0.495));
	// A significant improvement resets the count.
	assert!(!monitor.update(0.3));
	assert!(!monitor.update(0.4));
	assert!(monitor.update(0.45));
}
