//! Generator followed by a frozen scorer, used to update the generator from the scorer's judgment.

use crate::compiled::Compiled;
use crate::error::GanError;
use crate::generator::ImageGenerator;
use crate::lifecycle::{Lifecycle, Phase};
use crate::scorer::{ImageScorer, ScorerHandle};
use crate::state::StepMetrics;
use burn::optim::AdamConfig;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Wiring of a generator into a scorer.
///
/// The pair owns no parameters: it borrows both models for each call, and its optimizer only
/// tracks the generator's parameters.
pub struct AdversarialPair<B: AutodiffBackend> {
    latent_dim: usize,
    image_dims: [usize; 3],
    compiled: Option<Compiled<B, ImageGenerator<B>>>,
}

impl<B: AutodiffBackend> AdversarialPair<B> {
    /// Fails when the generator output does not match the scorer input.
    pub fn build(generator: &ImageGenerator<B>, scorer: &ImageScorer<B>) -> Result<Self, GanError> {
        if generator.image_dims() != scorer.image_dims() {
            return Err(GanError::precondition(
                "image_dims",
                format!(
                    "the generator produces {:?} images but the scorer expects {:?}",
                    generator.image_dims(),
                    scorer.image_dims()
                ),
            ));
        }
        Ok(Self {
            latent_dim: generator.latent_dim,
            image_dims: generator.image_dims(),
            compiled: None,
        })
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn image_dims(&self) -> [usize; 3] {
        self.image_dims
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.compiled.is_some() {
            Lifecycle::Compiled
        } else {
            Lifecycle::Built
        }
    }

    /// `None` until compiled.
    pub fn learning_rate(&self) -> Option<f64> {
        self.compiled.as_ref().map(Compiled::learning_rate)
    }

    pub fn compile(&mut self, optimizer: &AdamConfig, learning_rate: f64) -> Result<(), GanError> {
        if self.compiled.is_some() {
            return Err(GanError::State {
                operation: "compile_adversarial",
                expected: Lifecycle::Built,
                actual: Lifecycle::Compiled,
            });
        }
        self.compiled = Some(Compiled::new(optimizer, learning_rate)?);
        Ok(())
    }

    /// # Shapes
    ///   - noise [batch, latent_dim]
    ///   - Output [batch, 1], values in `[0, 1]`
    pub fn forward(
        &self,
        generator: &ImageGenerator<B>,
        scorer: &ImageScorer<B>,
        noise: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        scorer.forward(generator.forward(noise))
    }

    /// One generator update through the scorer.
    ///
    /// The scorer is frozen for the duration of the step and is trainable again afterwards,
    /// whether the step succeeded or not.
    ///
    /// # Shapes
    ///   - noise [batch, latent_dim]
    ///   - labels [batch, 1]
    pub fn train_on_batch(
        &mut self,
        generator: &mut ImageGenerator<B>,
        scorer: &mut ScorerHandle<B>,
        noise: Tensor<B, 2>,
        labels: Tensor<B, 2>,
    ) -> Result<StepMetrics, GanError> {
        let compiled = self.compiled.as_mut().ok_or(GanError::State {
            operation: "adversarial train_on_batch",
            expected: Lifecycle::Compiled,
            actual: Lifecycle::Built,
        })?;

        let judge = scorer.freeze();
        let probabilities = judge.forward(generator.forward(noise));
        let metrics = compiled.fit(generator, probabilities, labels, Phase::Adversarial);
        scorer.unfreeze();

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ImageGeneratorConfig;
    use crate::scorer::ImageScorerConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestAutodiffBackend = Autodiff<NdArray>;
    type B = TestAutodiffBackend;

    fn models(device: &<B as Backend>::Device) -> (ImageGenerator<B>, ScorerHandle<B>) {
        let generator = ImageGeneratorConfig::new(8, 8, 1)
            .with_latent_dim(4)
            .with_depth(16)
            .with_kernel_size(3)
            .init::<B>(device);
        let scorer = ImageScorerConfig::new(8, 8, 1)
            .with_depth(2)
            .with_kernel_size(3)
            .init::<B>(device);
        (generator, ScorerHandle::new(scorer))
    }

    fn values<const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let device = Default::default();
        let (generator, _) = models(&device);
        let scorer = ImageScorerConfig::new(12, 8, 1)
            .with_depth(2)
            .with_kernel_size(3)
            .init::<B>(&device);

        let err = AdversarialPair::build(&generator, &scorer).err().unwrap();
        assert!(matches!(err, GanError::Precondition { field, .. } if field == "image_dims"));
    }

    #[test]
    fn composed_output_is_a_probability() {
        let device = Default::default();
        let (generator, scorer) = models(&device);
        let pair = AdversarialPair::build(&generator, scorer.model()).unwrap();
        assert_eq!(pair.latent_dim(), 4);

        let noise = Tensor::<B, 2>::random([5, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let scores = pair.forward(&generator, scorer.model(), noise);
        assert_eq!(scores.dims(), [5, 1]);
        assert!(values(scores).iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn training_moves_only_the_generator() {
        let device = Default::default();
        let (mut generator, mut scorer) = models(&device);
        let mut pair = AdversarialPair::build(&generator, scorer.model()).unwrap();
        let noise = Tensor::<B, 2>::random([4, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let labels = Tensor::<B, 2>::ones([4, 1], &device);

        let err = pair
            .train_on_batch(&mut generator, &mut scorer, noise.clone(), labels.clone())
            .unwrap_err();
        assert!(matches!(err, GanError::State { .. }));

        pair.compile(&AdamConfig::new(), 1e-2).unwrap();
        assert_eq!(pair.lifecycle(), Lifecycle::Compiled);

        let scorer_before = values(scorer.model().output.weight.val());
        let generator_before = values(generator.projection.weight.val());

        let metrics = pair
            .train_on_batch(&mut generator, &mut scorer, noise, labels)
            .unwrap();
        assert!(metrics.loss.is_finite());

        assert!(scorer.is_trainable());
        assert_eq!(values(scorer.model().output.weight.val()), scorer_before);
        assert_ne!(values(generator.projection.weight.val()), generator_before);
    }
}
