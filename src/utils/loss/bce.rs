use burn::module::Module;
use burn::prelude::*;

/// Configuration to create a [Binary Cross-entropy criterion](BinaryCrossEntropy) using the [init function](BinaryCrossEntropyConfig::init).
#[derive(Config, Debug)]
pub struct BinaryCrossEntropyConfig {
    /// Lower bound applied to the log-probabilities.
    #[config(default = "-100.0")]
    pub log_floor: f64,
    /// Probability above which a prediction counts as "real" for the accuracy.
    #[config(default = 0.5)]
    pub threshold: f64,
}

impl BinaryCrossEntropyConfig {
    /// Initialize [Binary Cross-entropy criterion](BinaryCrossEntropy).
    pub fn init(&self) -> BinaryCrossEntropy {
        BinaryCrossEntropy {
            log_floor: self.log_floor,
            threshold: self.threshold,
        }
    }
}

/// Binary cross entropy between sigmoid probabilities and `{0, 1}` targets, with binary accuracy
/// as a side metric.
///
/// Should be created using [BinaryCrossEntropyConfig]
#[derive(Module, Clone, Debug)]
pub struct BinaryCrossEntropy {
    pub log_floor: f64,
    pub threshold: f64,
}

impl Default for BinaryCrossEntropy {
    fn default() -> Self {
        BinaryCrossEntropyConfig::new().init()
    }
}

impl BinaryCrossEntropy {
    /// Compute the criterion on the input tensor.
    ///
    /// # Shapes
    ///
    /// - probabilities: `[batch_size, 1]`
    /// - targets: `[batch_size, 1]`
    /// - output: `[1]`
    pub fn forward<const D: usize, B: Backend>(
        &self,
        probabilities: Tensor<B, D>,
        targets: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        // - (target * log(p) + (1 - target) * log(1 - p))
        // https://github.com/tracel-ai/burn/issues/2739: clamp to avoid undefined values at 0 and 1
        let loss = (targets.clone() - 1)
            * probabilities
                .clone()
                .neg()
                .log1p()
                .clamp_min(self.log_floor)
            - targets * probabilities.log().clamp_min(self.log_floor);

        loss.mean()
    }

    /// Fraction of predictions on the same side of the threshold as their target.
    ///
    /// # Shapes
    ///
    /// - probabilities: `[batch_size, 1]`
    /// - targets: `[batch_size, 1]`
    /// - output: `[1]`
    pub fn accuracy<const D: usize, B: Backend>(
        &self,
        probabilities: Tensor<B, D>,
        targets: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        let predicted = probabilities.greater_elem(self.threshold);
        let expected = targets.greater_elem(0.5);
        predicted.equal(expected).float().mean()
    }
}
