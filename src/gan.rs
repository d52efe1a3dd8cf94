//! The training orchestrator.

use crate::adversarial::AdversarialPair;
use crate::config::{GanConfig, TrainingConfig};
use crate::dataset::{GanDatasets, LabeledImages};
use crate::error::GanError;
use crate::generator::ImageGenerator;
use crate::lifecycle::{Lifecycle, Phase};
use crate::sample::{PngSampleWriter, SampleGrid, SampleSink};
use crate::scorer::{ImageScorer, ScorerHandle};
use crate::state::{StepMetrics, TrainingState};
use crate::utils::loss::BinaryCrossEntropy;
use crate::utils::{ensure_finite, scalar_f32};
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::Distribution;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use tracing::{debug, info, warn};

/// Images per forward pass when evaluating the scorer.
const EVAL_CHUNK: usize = 256;

const SCORER_RECORD: &str = "scorer";
const GENERATOR_RECORD: &str = "generator";
const STATE_FILE: &str = "state.json";
const CONFIG_FILE: &str = "config.json";
const CHECKPOINT_DIR: &str = "checkpoint";

/// Deep convolutional GAN: owns the scorer, the generator, the adversarial pair and the
/// training state, and sequences them through
/// `Uninitialized → Built → Compiled → Training → Done`.
///
/// ```ignore
/// let mut gan = Gan::<Autodiff<NdArray>>::new(GanConfig::new("mnist_gan".into(), 28, 28, 1), device)?;
/// gan.initialize_models()?;
/// gan.train(&datasets, &TrainingConfig::new(10_000, 256).with_save_interval(500))?;
/// ```
pub struct Gan<B: AutodiffBackend> {
    config: GanConfig,
    device: B::Device,
    lifecycle: Lifecycle,
    scorer: Option<ScorerHandle<B>>,
    generator: Option<ImageGenerator<B>>,
    adversarial: Option<AdversarialPair<B>>,
    state: TrainingState,
    /// Latent batch reused for every sample grid.
    reference_noise: Tensor<B, 2>,
    rng: StdRng,
}

impl<B: AutodiffBackend> Gan<B> {
    /// Validates the configuration and seeds the backend and the batch sampler.
    pub fn new(config: GanConfig, device: B::Device) -> Result<Self, GanError> {
        config.validate()?;
        B::seed(&device, config.seed);
        let reference_noise = latent_batch::<B>(
            config.grid_rows * config.grid_columns,
            config.latent_dim,
            &device,
        );
        let rng = StdRng::seed_from_u64(config.seed);
        debug!(name = %config.name, "created gan");

        Ok(Self {
            config,
            device,
            lifecycle: Lifecycle::Uninitialized,
            scorer: None,
            generator: None,
            adversarial: None,
            state: TrainingState::default(),
            reference_noise,
            rng,
        })
    }

    pub fn config(&self) -> &GanConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn training_state(&self) -> &TrainingState {
        &self.state
    }

    pub fn scorer(&self) -> Option<&ScorerHandle<B>> {
        self.scorer.as_ref()
    }

    pub fn generator(&self) -> Option<&ImageGenerator<B>> {
        self.generator.as_ref()
    }

    pub fn adversarial(&self) -> Option<&AdversarialPair<B>> {
        self.adversarial.as_ref()
    }

    /// The latent batch behind every sample grid, `[grid_rows * grid_columns, latent_dim]`.
    pub fn reference_noise(&self) -> Tensor<B, 2> {
        self.reference_noise.clone()
    }

    fn state_error(&self, operation: &'static str, expected: Lifecycle) -> GanError {
        GanError::State {
            operation,
            expected,
            actual: self.lifecycle,
        }
    }

    fn refresh_lifecycle(&mut self) {
        let previous = self.lifecycle;
        self.lifecycle = match (&self.scorer, &self.generator, &self.adversarial) {
            (Some(scorer), Some(_), Some(pair))
                if scorer.lifecycle() == Lifecycle::Compiled
                    && pair.lifecycle() == Lifecycle::Compiled =>
            {
                Lifecycle::Compiled
            }
            (Some(_), Some(_), _) => Lifecycle::Built,
            _ => Lifecycle::Uninitialized,
        };
        if previous != self.lifecycle {
            debug!(from = %previous, to = %self.lifecycle, "lifecycle transition");
        }
    }

    /// Builds the scorer, or returns the existing one.
    pub fn build_scorer(&mut self) -> Result<&ImageScorer<B>, GanError> {
        if self.scorer.is_some() {
            warn!("scorer already built, returning the existing one");
        } else {
            let model = self.config.scorer_config().init::<B>(&self.device);
            debug!(blocks = model.blocks.len(), "built scorer");
            self.scorer = Some(ScorerHandle::new(model));
            self.refresh_lifecycle();
        }
        self.scorer
            .as_ref()
            .map(ScorerHandle::model)
            .ok_or_else(|| self.state_error("build_scorer", Lifecycle::Built))
    }

    /// Builds the generator, or returns the existing one.
    pub fn build_generator(&mut self) -> Result<&ImageGenerator<B>, GanError> {
        if self.generator.is_some() {
            warn!("generator already built, returning the existing one");
        } else {
            let model = self.config.generator_config().init::<B>(&self.device);
            debug!(blocks = model.blocks.len(), "built generator");
            self.generator = Some(model);
            self.refresh_lifecycle();
        }
        self.generator
            .as_ref()
            .ok_or_else(|| self.state_error("build_generator", Lifecycle::Built))
    }

    /// Wires the generator into the scorer, or returns the existing pair.
    pub fn build_adversarial(&mut self) -> Result<&AdversarialPair<B>, GanError> {
        if self.adversarial.is_some() {
            warn!("adversarial pair already built, returning the existing one");
        } else {
            let (Some(generator), Some(scorer)) = (&self.generator, &self.scorer) else {
                return Err(self.state_error("build_adversarial", Lifecycle::Built));
            };
            self.adversarial = Some(AdversarialPair::build(generator, scorer.model())?);
            self.refresh_lifecycle();
        }
        self.adversarial
            .as_ref()
            .ok_or_else(|| self.state_error("build_adversarial", Lifecycle::Built))
    }

    pub fn compile_scorer(&mut self, learning_rate: f64) -> Result<(), GanError> {
        let actual = self.lifecycle;
        let scorer = match self.scorer.as_mut() {
            Some(scorer) if actual != Lifecycle::Uninitialized => scorer,
            _ => {
                return Err(GanError::State {
                    operation: "compile_scorer",
                    expected: Lifecycle::Built,
                    actual,
                });
            }
        };
        scorer.compile(&self.config.optimizer, learning_rate)?;
        debug!(learning_rate, "compiled scorer");
        self.refresh_lifecycle();
        Ok(())
    }

    /// Compiles the adversarial pair, building it first when needed.
    pub fn compile_adversarial(&mut self, learning_rate: f64) -> Result<(), GanError> {
        if self.lifecycle == Lifecycle::Uninitialized {
            return Err(self.state_error("compile_adversarial", Lifecycle::Built));
        }
        if self.adversarial.is_none() {
            self.build_adversarial()?;
        }
        let actual = self.lifecycle;
        let pair = self.adversarial.as_mut().ok_or(GanError::State {
            operation: "compile_adversarial",
            expected: Lifecycle::Built,
            actual,
        })?;
        pair.compile(&self.config.optimizer, learning_rate)?;
        debug!(learning_rate, "compiled adversarial pair");
        self.refresh_lifecycle();
        Ok(())
    }

    /// Builds and compiles every handle with the configured learning rates.
    pub fn initialize_models(&mut self) -> Result<(), GanError> {
        let scorer_lr = self.config.scorer_lr;
        let adversarial_lr = self.config.adversarial_lr;
        self.build_scorer()?;
        self.build_generator()?;
        self.compile_scorer(scorer_lr)?;
        self.build_adversarial()?;
        self.compile_adversarial(adversarial_lr)?;
        info!(
            name = %self.config.name,
            scorer_lr,
            adversarial_lr,
            "models initialized"
        );
        Ok(())
    }

    /// Disposes every handle and the training state, and re-seeds as in [`Gan::new`].
    pub fn reset(&mut self) {
        B::seed(&self.device, self.config.seed);
        self.reference_noise = latent_batch::<B>(
            self.config.grid_rows * self.config.grid_columns,
            self.config.latent_dim,
            &self.device,
        );
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.scorer = None;
        self.generator = None;
        self.adversarial = None;
        self.state = TrainingState::default();
        self.refresh_lifecycle();
    }

    /// Runs the training loop, writing sample grids to `out_path` when it is set.
    pub fn train(
        &mut self,
        datasets: &GanDatasets<B>,
        training: &TrainingConfig,
    ) -> Result<&TrainingState, GanError> {
        match &training.out_path {
            Some(out_path) => {
                let mut writer = PngSampleWriter::new(out_path, &self.config.name);
                self.run(datasets, training, Some(&mut writer))
            }
            None => self.run(datasets, training, None),
        }
    }

    /// Runs the training loop, handing sample grids to `sink`.
    pub fn train_with_sink(
        &mut self,
        datasets: &GanDatasets<B>,
        training: &TrainingConfig,
        sink: &mut dyn SampleSink,
    ) -> Result<&TrainingState, GanError> {
        self.run(datasets, training, Some(sink))
    }

    fn run(
        &mut self,
        datasets: &GanDatasets<B>,
        training: &TrainingConfig,
        sink: Option<&mut dyn SampleSink>,
    ) -> Result<&TrainingState, GanError> {
        training.validate()?;
        if !matches!(self.lifecycle, Lifecycle::Compiled | Lifecycle::Done) {
            return Err(self.state_error("train", Lifecycle::Compiled));
        }
        datasets.validate(self.config.image_dims())?;

        self.lifecycle = Lifecycle::Training;
        info!(
            steps = training.steps,
            batch_size = training.batch_size,
            pre_steps = training.pre_steps,
            save_interval = training.save_interval,
            train_examples = datasets.train.len(),
            "training started"
        );

        match self.run_steps(datasets, training, sink) {
            Ok(()) => {
                self.lifecycle = Lifecycle::Done;
                info!(
                    step = self.state.step,
                    scorer_loss = self.state.scorer_running.loss,
                    scorer_accuracy = self.state.scorer_running.accuracy,
                    adversarial_loss = self.state.adversarial_running.loss,
                    adversarial_accuracy = self.state.adversarial_running.accuracy,
                    "training done"
                );
                Ok(&self.state)
            }
            Err(err) => {
                self.lifecycle = Lifecycle::Compiled;
                Err(err)
            }
        }
    }

    fn run_steps(
        &mut self,
        datasets: &GanDatasets<B>,
        training: &TrainingConfig,
        mut sink: Option<&mut dyn SampleSink>,
    ) -> Result<(), GanError> {
        for _ in 0..training.pre_steps {
            let metrics = self.scorer_step(&datasets.train, training.batch_size)?;
            self.state.pre_steps += 1;
            debug!(
                pre_step = self.state.pre_steps,
                loss = metrics.loss,
                accuracy = metrics.accuracy,
                "scorer warm-up step"
            );
        }

        let mut config_written = false;
        let first_step = self.state.step;
        for run_step in 1..=training.steps {
            let step = first_step + run_step;
            let scorer = self
                .scorer_step(&datasets.train, training.batch_size)
                .map_err(|e| e.at_step(step))?;
            let adversarial = self
                .adversarial_step(training.batch_size)
                .map_err(|e| e.at_step(step))?;

            self.state.step = step;
            self.state.record_scorer(scorer);
            self.state.record_adversarial(adversarial);
            info!(
                step,
                scorer_loss = scorer.loss,
                scorer_accuracy = scorer.accuracy,
                adversarial_loss = adversarial.loss,
                adversarial_accuracy = adversarial.accuracy,
                "training step"
            );

            // intervals count from the start of this run
            if training.save_interval > 0 && run_step % training.save_interval == 0 {
                if let Some(sink) = sink.as_deref_mut() {
                    self.save_samples(sink, step)?;
                }
                if let Some(out_path) = &training.out_path {
                    if !config_written {
                        std::fs::create_dir_all(out_path)?;
                        self.config.save(out_path.join(CONFIG_FILE))?;
                        config_written = true;
                    }
                    if training.checkpoint {
                        self.save_checkpoint(out_path.join(CHECKPOINT_DIR))?;
                    }
                }
                self.log_evaluation("validation", datasets.validation.as_ref())?;
            }
        }

        self.log_evaluation("validation", datasets.validation.as_ref())?;
        self.log_evaluation("test", datasets.test.as_ref())?;
        Ok(())
    }

    fn noise(&self, batch_size: usize) -> Tensor<B, 2> {
        latent_batch::<B>(batch_size, self.config.latent_dim, &self.device)
    }

    /// Real images labelled 1 followed by generated images labelled 0.
    fn scorer_step(
        &mut self,
        train: &LabeledImages<B>,
        batch_size: usize,
    ) -> Result<StepMetrics, GanError> {
        let noise = self.noise(batch_size);
        let real = train.sample_batch(batch_size, &mut self.rng);
        let actual = self.lifecycle;
        let (Some(scorer), Some(generator)) = (self.scorer.as_mut(), self.generator.as_ref())
        else {
            return Err(GanError::State {
                operation: "scorer step",
                expected: Lifecycle::Compiled,
                actual,
            });
        };

        let fake = Tensor::from_inner(generator.valid().forward(noise.inner()));
        let images = Tensor::cat(vec![real, fake], 0);
        let labels = Tensor::cat(
            vec![
                Tensor::ones([batch_size, 1], &self.device),
                Tensor::zeros([batch_size, 1], &self.device),
            ],
            0,
        );
        scorer.train_on_batch(images, labels)
    }

    /// Fresh noise labelled 1, through the frozen scorer.
    fn adversarial_step(&mut self, batch_size: usize) -> Result<StepMetrics, GanError> {
        let noise = self.noise(batch_size);
        let labels = Tensor::ones([batch_size, 1], &self.device);
        let actual = self.lifecycle;
        let (Some(pair), Some(generator), Some(scorer)) = (
            self.adversarial.as_mut(),
            self.generator.as_mut(),
            self.scorer.as_mut(),
        ) else {
            return Err(GanError::State {
                operation: "adversarial step",
                expected: Lifecycle::Compiled,
                actual,
            });
        };
        pair.train_on_batch(generator, scorer, noise, labels)
    }

    fn save_samples(&mut self, sink: &mut dyn SampleSink, step: usize) -> Result<(), GanError> {
        let images = self.generate(self.reference_noise())?;
        let grid = SampleGrid::from_images(images, self.config.grid_rows, self.config.grid_columns)?;
        sink.save(step, &grid)?;
        self.state.saves.push(step);
        info!(step, "saved sample grid");
        Ok(())
    }

    fn log_evaluation(
        &self,
        set: &'static str,
        images: Option<&LabeledImages<B>>,
    ) -> Result<(), GanError> {
        if let Some(images) = images {
            let metrics = self.evaluate_scorer(images)?;
            info!(
                set,
                step = self.state.step,
                loss = metrics.loss,
                accuracy = metrics.accuracy,
                "scorer evaluation"
            );
        }
        Ok(())
    }

    /// Generates images in inference mode.
    ///
    /// # Shapes
    ///   - noise [batch, latent_dim]
    ///   - Output [batch, rows, columns, channels]
    pub fn generate(&self, noise: Tensor<B, 2>) -> Result<Tensor<B, 4>, GanError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| self.state_error("generate", Lifecycle::Built))?;
        let [_batch, latent_dim] = noise.dims();
        if latent_dim != self.config.latent_dim {
            return Err(GanError::precondition(
                "noise",
                format!(
                    "expected {} latent dimensions, found {latent_dim}",
                    self.config.latent_dim
                ),
            ));
        }
        Ok(Tensor::from_inner(
            generator.valid().forward(noise.inner()),
        ))
    }

    /// `frames` images along the straight line between two random latent vectors, endpoints
    /// included.
    pub fn interpolate(&self, frames: usize) -> Result<Tensor<B, 4>, GanError> {
        if frames == 0 {
            return Err(GanError::precondition("frames", "must be positive"));
        }
        let start = self.noise(1);
        let end = self.noise(1);
        let span = (frames - 1).max(1) as f64;
        let noise = (0..frames)
            .map(|frame| {
                let t = frame as f64 / span;
                start.clone().mul_scalar(1.0 - t) + end.clone().mul_scalar(t)
            })
            .collect();
        self.generate(Tensor::cat(noise, 0))
    }

    /// Loss and accuracy of the scorer labelling every image as real, in inference mode.
    pub fn evaluate_scorer(&self, images: &LabeledImages<B>) -> Result<StepMetrics, GanError> {
        let scorer = self
            .scorer
            .as_ref()
            .ok_or_else(|| self.state_error("evaluate_scorer", Lifecycle::Built))?;
        images.validate("images", "labels", self.config.image_dims())?;

        let model = scorer.model().valid();
        let criterion = BinaryCrossEntropy::default();
        let mut loss = 0.0;
        let mut accuracy = 0.0;
        for chunk in images.chunks(EVAL_CHUNK) {
            let [n, ..] = chunk.dims();
            let probabilities = model.forward(chunk.inner());
            let labels = Tensor::ones([n, 1], &probabilities.device());
            let weight = n as f32 / images.len() as f32;
            loss += weight * scalar_f32(criterion.forward(probabilities.clone(), labels.clone()));
            accuracy += weight * scalar_f32(criterion.accuracy(probabilities, labels));
        }
        let loss = ensure_finite(Phase::Scorer, "evaluation loss", loss)?;
        Ok(StepMetrics { loss, accuracy })
    }

    /// Records the scorer, the generator and the training state under `dir`.
    pub fn save_checkpoint(&self, dir: impl AsRef<Path>) -> Result<(), GanError> {
        let dir = dir.as_ref();
        let (Some(scorer), Some(generator)) = (&self.scorer, &self.generator) else {
            return Err(self.state_error("save_checkpoint", Lifecycle::Built));
        };
        std::fs::create_dir_all(dir)?;
        let recorder = CompactRecorder::new();
        scorer
            .model()
            .clone()
            .save_file(dir.join(SCORER_RECORD), &recorder)
            .map_err(|e| GanError::Record(format!("{e:?}")))?;
        generator
            .clone()
            .save_file(dir.join(GENERATOR_RECORD), &recorder)
            .map_err(|e| GanError::Record(format!("{e:?}")))?;
        std::fs::write(
            dir.join(STATE_FILE),
            serde_json::to_string_pretty(&self.state)?,
        )?;
        info!(dir = %dir.display(), step = self.state.step, "saved checkpoint");
        Ok(())
    }

    /// Restores a checkpoint written by [`Gan::save_checkpoint`] into the built models.
    ///
    /// Optimizer state is not part of the checkpoint.
    pub fn load_checkpoint(&mut self, dir: impl AsRef<Path>) -> Result<(), GanError> {
        let dir = dir.as_ref();
        if self.scorer.is_none() || self.generator.is_none() {
            return Err(self.state_error("load_checkpoint", Lifecycle::Built));
        }
        let recorder = CompactRecorder::new();
        if let Some(scorer) = self.scorer.as_mut() {
            let model = scorer
                .model()
                .clone()
                .load_file(dir.join(SCORER_RECORD), &recorder, &self.device)
                .map_err(|e| GanError::Record(format!("{e:?}")))?;
            scorer.set_model(model);
        }
        if let Some(generator) = self.generator.as_mut() {
            *generator = generator
                .clone()
                .load_file(dir.join(GENERATOR_RECORD), &recorder, &self.device)
                .map_err(|e| GanError::Record(format!("{e:?}")))?;
        }
        let state = std::fs::read_to_string(dir.join(STATE_FILE))?;
        self.state = serde_json::from_str(&state)?;
        info!(dir = %dir.display(), step = self.state.step, "loaded checkpoint");
        Ok(())
    }
}

/// `[batch_size, latent_dim]`, uniform in `[-1, 1]`.
fn latent_batch<B: Backend>(
    batch_size: usize,
    latent_dim: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::random(
        [batch_size, latent_dim],
        Distribution::Uniform(-1.0, 1.0),
        device,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestAutodiffBackend = Autodiff<NdArray>;

    fn tiny() -> GanConfig {
        GanConfig::new("tiny".to_string(), 8, 8, 1)
            .with_depth(2)
            .with_generator_depth(16)
            .with_kernel_size(3)
            .with_latent_dim(4)
            .with_grid_rows(2)
            .with_grid_columns(2)
    }

    #[test]
    fn lifecycle_follows_builds_and_compiles() {
        let mut gan = Gan::<TestAutodiffBackend>::new(tiny(), Default::default()).unwrap();
        assert_eq!(gan.lifecycle(), Lifecycle::Uninitialized);

        gan.build_scorer().unwrap();
        assert_eq!(gan.lifecycle(), Lifecycle::Uninitialized);
        gan.build_generator().unwrap();
        assert_eq!(gan.lifecycle(), Lifecycle::Built);

        gan.compile_scorer(0.0002).unwrap();
        assert_eq!(gan.lifecycle(), Lifecycle::Built);
        gan.compile_adversarial(0.00009).unwrap();
        assert_eq!(gan.lifecycle(), Lifecycle::Compiled);
        assert!(gan.adversarial().is_some());

        gan.reset();
        assert_eq!(gan.lifecycle(), Lifecycle::Uninitialized);
        assert!(gan.scorer().is_none() && gan.generator().is_none());
    }

    #[test]
    fn reference_noise_matches_the_grid() {
        let gan = Gan::<TestAutodiffBackend>::new(tiny(), Default::default()).unwrap();
        assert_eq!(gan.reference_noise().dims(), [4, 4]);
        let values = gan
            .reference_noise()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn generate_requires_a_generator_and_matching_noise() {
        let mut gan = Gan::<TestAutodiffBackend>::new(tiny(), Default::default()).unwrap();
        let err = gan.generate(gan.reference_noise()).unwrap_err();
        assert!(matches!(err, GanError::State { operation: "generate", .. }));

        gan.build_generator().unwrap();
        let images = gan.generate(gan.reference_noise()).unwrap();
        assert_eq!(images.dims(), [4, 8, 8, 1]);

        let wrong = Tensor::<TestAutodiffBackend, 2>::zeros([2, 5], gan.device());
        let err = gan.generate(wrong).unwrap_err();
        assert!(matches!(err, GanError::Precondition { field, .. } if field == "noise"));
    }

    #[test]
    fn step_state_errors_report_the_current_lifecycle() {
        let mut gan = Gan::<TestAutodiffBackend>::new(tiny(), Default::default()).unwrap();
        gan.build_scorer().unwrap();
        gan.lifecycle = Lifecycle::Training;

        let device = gan.device().clone();
        let train = LabeledImages::new(
            Tensor::zeros([4, 8, 8, 1], &device),
            Tensor::zeros([4, 1], &device),
        );
        let err = gan.scorer_step(&train, 2).unwrap_err();
        assert!(matches!(
            err,
            GanError::State {
                operation: "scorer step",
                actual: Lifecycle::Training,
                ..
            }
        ));
        let err = gan.adversarial_step(2).unwrap_err();
        assert!(matches!(
            err,
            GanError::State {
                actual: Lifecycle::Training,
                ..
            }
        ));
    }
}
