use crate::config::check_learning_rate;
use crate::error::GanError;
use crate::lifecycle::Phase;
use crate::state::StepMetrics;
use crate::utils::loss::BinaryCrossEntropy;
use crate::utils::{ensure_finite, scalar_f32};
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Optimizer, learning rate and criterion attached to the parameters of `M`.
pub struct Compiled<B: AutodiffBackend, M: AutodiffModule<B>> {
    optim: OptimizerAdaptor<Adam, M, B>,
    learning_rate: f64,
    criterion: BinaryCrossEntropy,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> Compiled<B, M> {
    pub fn new(optimizer: &AdamConfig, learning_rate: f64) -> Result<Self, GanError> {
        check_learning_rate("learning_rate", learning_rate)?;
        Ok(Self {
            optim: optimizer.init::<B, M>(),
            learning_rate,
            criterion: BinaryCrossEntropy::default(),
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Scores `probabilities` against `labels` and applies one update to `module`.
    ///
    /// Only the parameters of `module` that took part in computing `probabilities` move.
    /// Divergence is detected on this step's scores and loss, before the update, so nothing
    /// is applied when either is not finite. Parameters that overflow during the update
    /// itself surface through the scores of the next step.
    ///
    /// # Shapes
    ///   - probabilities [batch, 1]
    ///   - labels [batch, 1]
    pub fn fit(
        &mut self,
        module: &mut M,
        probabilities: Tensor<B, 2>,
        labels: Tensor<B, 2>,
        phase: Phase,
    ) -> Result<StepMetrics, GanError> {
        let loss = self
            .criterion
            .forward(probabilities.clone(), labels.clone());
        let accuracy = self
            .criterion
            .accuracy(probabilities.clone().detach(), labels.detach());

        // the clamped log can hide NaN scores from the loss
        ensure_finite(phase, "scores", scalar_f32(probabilities.detach().sum()))?;
        let loss_value = ensure_finite(phase, "loss", scalar_f32(loss.clone()))?;
        let accuracy = scalar_f32(accuracy);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, module);
        *module = self.optim.step(self.learning_rate, module.clone(), grads);

        Ok(StepMetrics {
            loss: loss_value,
            accuracy,
        })
    }
}
