use serde::{Deserialize, Serialize};

/// Loss and binary accuracy of one optimization step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub loss: f32,
    pub accuracy: f32,
}

/// Incremental mean of the step metrics seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMetrics {
    pub count: usize,
    pub loss: f32,
    pub accuracy: f32,
}

impl RunningMetrics {
    pub fn update(&mut self, metrics: StepMetrics) {
        self.count += 1;
        let n = self.count as f32;
        self.loss += (metrics.loss - self.loss) / n;
        self.accuracy += (metrics.accuracy - self.accuracy) / n;
    }
}

/// Progress of the training loop, mutated once per step.
///
/// Persisted as `state.json` next to model checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Completed adversarial steps, cumulative across `train` calls.
    pub step: usize,
    /// Completed scorer-only warm-up steps.
    pub pre_steps: usize,
    /// Latest scorer step.
    pub scorer: StepMetrics,
    /// Latest adversarial step.
    pub adversarial: StepMetrics,
    pub scorer_running: RunningMetrics,
    pub adversarial_running: RunningMetrics,
    /// Steps at which a sample grid was emitted.
    pub saves: Vec<usize>,
}

impl TrainingState {
    pub fn record_scorer(&mut self, metrics: StepMetrics) {
        self.scorer = metrics;
        self.scorer_running.update(metrics);
    }

    pub fn record_adversarial(&mut self, metrics: StepMetrics) {
        self.adversarial = metrics;
        self.adversarial_running.update(metrics);
    }
}
