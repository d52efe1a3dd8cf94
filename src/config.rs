use crate::error::GanError;
use crate::generator::{GENERATOR_BLOCKS, ImageGeneratorConfig};
use crate::scorer::ImageScorerConfig;
use burn::optim::AdamConfig;
use burn::prelude::*;
use std::path::PathBuf;

/// Construction parameters of a [`Gan`](crate::gan::Gan).
///
/// Defaults follow the MNIST setup: 64 base filters for the scorer, 4x that for the generator,
/// 5x5 kernels with stride 2, and a 100-dimensional latent space.
#[derive(Config, Debug)]
pub struct GanConfig {
    /// Identifier, also used as the file prefix of saved samples.
    pub name: String,
    /// Image height.
    pub rows: usize,
    /// Image width.
    pub columns: usize,
    /// Image channels.
    pub channels: usize,

    /// Scorer filter count of the first block, doubled on every following block.
    #[config(default = 64)]
    pub depth: usize,
    /// Generator channels after the dense projection, halved on every upsampling block.
    #[config(default = 256)]
    pub generator_depth: usize,
    /// Dropout rate of the scorer blocks.
    #[config(default = 0.4)]
    pub dropout: f64,
    #[config(default = 5)]
    pub kernel_size: usize,
    /// Scorer downsampling stride.
    #[config(default = 2)]
    pub stride: usize,
    /// Negative slope of the scorer's leaky ReLU.
    #[config(default = 0.2)]
    pub relu_alpha: f64,
    #[config(default = 100)]
    pub latent_dim: usize,
    /// Weight of the previous running statistics in the generator's batch normalization.
    #[config(default = 0.9)]
    pub norm_momentum: f64,

    #[config(default = 0.0002)]
    pub scorer_lr: f64,
    #[config(default = 0.00009)]
    pub adversarial_lr: f64,
    /// Shared by the scorer and the adversarial pair; each gets its own optimizer state.
    #[config(default = "AdamConfig::new().with_beta_1(0.5)")]
    pub optimizer: AdamConfig,

    /// Seeds the backend and the batch sampler.
    #[config(default = 0)]
    pub seed: u64,
    /// Sample grid layout.
    #[config(default = 4)]
    pub grid_rows: usize,
    #[config(default = 4)]
    pub grid_columns: usize,
}

impl GanConfig {
    /// Image shape as `[rows, columns, channels]`.
    pub fn image_dims(&self) -> [usize; 3] {
        [self.rows, self.columns, self.channels]
    }

    pub fn scorer_config(&self) -> ImageScorerConfig {
        ImageScorerConfig::new(self.rows, self.columns, self.channels)
            .with_depth(self.depth)
            .with_dropout(self.dropout)
            .with_kernel_size(self.kernel_size)
            .with_stride(self.stride)
            .with_relu_alpha(self.relu_alpha)
    }

    pub fn generator_config(&self) -> ImageGeneratorConfig {
        ImageGeneratorConfig::new(self.rows, self.columns, self.channels)
            .with_latent_dim(self.latent_dim)
            .with_depth(self.generator_depth)
            .with_kernel_size(self.kernel_size)
            .with_norm_momentum(self.norm_momentum)
    }

    /// Checks every construction parameter.
    pub fn validate(&self) -> Result<(), GanError> {
        for (field, value) in [
            ("rows", self.rows),
            ("columns", self.columns),
            ("channels", self.channels),
            ("depth", self.depth),
            ("stride", self.stride),
            ("latent_dim", self.latent_dim),
            ("grid_rows", self.grid_rows),
            ("grid_columns", self.grid_columns),
        ] {
            if value == 0 {
                return Err(GanError::precondition(field, "must be positive"));
            }
        }
        if self.kernel_size % 2 == 0 {
            return Err(GanError::precondition(
                "kernel_size",
                format!("must be odd, found {}", self.kernel_size),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(GanError::precondition(
                "dropout",
                format!("must lie in [0, 1), found {}", self.dropout),
            ));
        }
        if !(0.0..=1.0).contains(&self.norm_momentum) {
            return Err(GanError::precondition(
                "norm_momentum",
                format!("must lie in [0, 1], found {}", self.norm_momentum),
            ));
        }
        if !(self.relu_alpha.is_finite() && self.relu_alpha >= 0.0) {
            return Err(GanError::precondition(
                "relu_alpha",
                format!("must be a non-negative number, found {}", self.relu_alpha),
            ));
        }
        for (field, lr) in [
            ("scorer_lr", self.scorer_lr),
            ("adversarial_lr", self.adversarial_lr),
        ] {
            check_learning_rate(field, lr)?;
        }
        if self.generator_depth >> GENERATOR_BLOCKS == 0 {
            return Err(GanError::precondition(
                "generator_depth",
                format!(
                    "must be at least {} so that every upsampling block keeps a filter, found {}",
                    1 << GENERATOR_BLOCKS,
                    self.generator_depth
                ),
            ));
        }
        self.scorer_config().validate()?;
        self.generator_config().validate()?;
        Ok(())
    }
}

pub(crate) fn check_learning_rate(field: &str, lr: f64) -> Result<(), GanError> {
    if lr.is_finite() && lr > 0.0 {
        Ok(())
    } else {
        Err(GanError::precondition(
            field,
            format!("must be a positive number, found {lr}"),
        ))
    }
}

/// Parameters of one [`Gan::train`](crate::gan::Gan::train) run.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Number of adversarial training steps.
    pub steps: usize,
    /// Real images per step; the scorer sees twice as many (real and generated).
    pub batch_size: usize,
    /// Scorer-only warm-up steps run before the adversarial loop.
    #[config(default = 0)]
    pub pre_steps: usize,
    /// Save a sample grid every `save_interval` steps of the run. `0` disables saving.
    #[config(default = 0)]
    pub save_interval: usize,
    /// Destination directory of sample grids. Saving is skipped when unset.
    #[config(default = "None")]
    pub out_path: Option<PathBuf>,
    /// Also record model checkpoints next to the sample grids.
    #[config(default = false)]
    pub checkpoint: bool,
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), GanError> {
        if self.steps == 0 {
            return Err(GanError::precondition("steps", "must be a positive integer"));
        }
        if self.batch_size == 0 {
            return Err(GanError::precondition(
                "batch_size",
                "must be a positive integer",
            ));
        }
        Ok(())
    }
}
