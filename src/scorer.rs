//! The image scorer (discriminator): estimates the probability that an image was drawn from the
//! real dataset rather than synthesized.

use crate::compiled::Compiled;
use crate::error::GanError;
use crate::lifecycle::{Lifecycle, Phase};
use crate::state::StepMetrics;
use crate::utils::conv_output_size;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::optim::AdamConfig;
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, sigmoid};
use burn::tensor::backend::AutodiffBackend;

/// Number of downsampling blocks.
pub const SCORER_BLOCKS: usize = 4;

#[derive(Config, Debug)]
pub struct ImageScorerConfig {
    pub rows: usize,
    pub columns: usize,
    pub channels: usize,
    /// Filter count of the first block. Block `i` (0-indexed) uses `depth * 2^i`.
    #[config(default = 64)]
    pub depth: usize,
    #[config(default = 0.4)]
    pub dropout: f64,
    #[config(default = 5)]
    pub kernel_size: usize,
    #[config(default = 2)]
    pub stride: usize,
    #[config(default = 0.2)]
    pub relu_alpha: f64,
}

impl ImageScorerConfig {
    /// Filter count of block `block` (0-indexed).
    pub fn block_filters(&self, block: usize) -> usize {
        self.depth << block
    }

    fn padding(&self) -> usize {
        self.kernel_size / 2
    }

    /// Spatial size `[rows, columns]` after the last downsampling block.
    pub fn output_grid(&self) -> Option<[usize; 2]> {
        let padding = self.padding();
        let mut grid = [self.rows, self.columns];
        for _ in 0..SCORER_BLOCKS {
            for size in grid.iter_mut() {
                *size = conv_output_size(*size, self.kernel_size, self.stride, padding)?;
            }
        }
        Some(grid)
    }

    pub fn validate(&self) -> Result<(), GanError> {
        if self.output_grid().is_none() {
            return Err(GanError::precondition(
                "kernel_size",
                format!(
                    "a {k}x{k} kernel with stride {s} does not fit a {r}x{c} image",
                    k = self.kernel_size,
                    s = self.stride,
                    r = self.rows,
                    c = self.columns,
                ),
            ));
        }
        Ok(())
    }

    /// Returns the initialized model.
    ///
    /// The configuration is expected to be [validated](Self::validate).
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageScorer<B> {
        let padding = self.padding();
        let mut blocks = Vec::with_capacity(SCORER_BLOCKS);
        let mut channels_in = self.channels;
        for block in 0..SCORER_BLOCKS {
            let filters = self.block_filters(block);
            let conv = Conv2dConfig::new(
                [channels_in, filters],
                [self.kernel_size, self.kernel_size],
            )
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .init(device);
            blocks.push(DownsampleBlock {
                conv,
                dropout: DropoutConfig::new(self.dropout).init(),
                relu_alpha: self.relu_alpha,
            });
            channels_in = filters;
        }

        let [grid_rows, grid_columns] = self.output_grid().unwrap_or([1, 1]);
        let output = LinearConfig::new(channels_in * grid_rows * grid_columns, 1)
            .with_bias(true)
            .init(device);

        ImageScorer {
            blocks,
            output,
            rows: self.rows,
            columns: self.columns,
            channels: self.channels,
        }
    }
}

/// Strided convolution, leaky ReLU, dropout.
#[derive(Module, Debug)]
pub struct DownsampleBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub dropout: Dropout,
    pub relu_alpha: f64,
}

impl<B: Backend> DownsampleBlock<B> {
    /// # Shapes
    ///   - Input [batch, channels_in, rows, columns]
    ///   - Output [batch, channels_out, rows / stride, columns / stride]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = leaky_relu(x, self.relu_alpha);
        self.dropout.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct ImageScorer<B: Backend> {
    pub blocks: Vec<DownsampleBlock<B>>,
    pub output: Linear<B>,
    pub rows: usize,
    pub columns: usize,
    pub channels: usize,
}

impl<B: Backend> ImageScorer<B> {
    /// Image shape as `[rows, columns, channels]`.
    pub fn image_dims(&self) -> [usize; 3] {
        [self.rows, self.columns, self.channels]
    }

    /// # Shapes
    ///   - Input [batch, rows, columns, channels]
    ///   - Output [batch, 1], values in `[0, 1]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, rows, columns, channels] = images.dims();
        debug_assert_eq!([rows, columns, channels], self.image_dims());

        // burn convolutions are channels-first
        let mut x = images.permute([0, 3, 1, 2]);
        for block in &self.blocks {
            x = block.forward(x);
        }

        let [_batch, filters, grid_rows, grid_columns] = x.dims();
        let x = x.reshape([batch, filters * grid_rows * grid_columns]);
        let x = self.output.forward(x);
        debug_assert_eq!([batch, 1], x.dims());

        sigmoid(x)
    }
}

/// The scorer parameter set, shared between standalone scorer updates and the adversarial pair.
///
/// While frozen, the parameters only serve as a fixed judge for generator updates.
pub struct ScorerHandle<B: AutodiffBackend> {
    model: ImageScorer<B>,
    trainable: bool,
    compiled: Option<Compiled<B, ImageScorer<B>>>,
}

impl<B: AutodiffBackend> ScorerHandle<B> {
    pub fn new(model: ImageScorer<B>) -> Self {
        Self {
            model,
            trainable: true,
            compiled: None,
        }
    }

    pub fn model(&self) -> &ImageScorer<B> {
        &self.model
    }

    /// Replaces the parameters, e.g. with ones loaded from a record.
    pub fn set_model(&mut self, model: ImageScorer<B>) {
        self.model = model;
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
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

    /// Attaches an optimizer and the binary cross-entropy criterion.
    pub fn compile(&mut self, optimizer: &AdamConfig, learning_rate: f64) -> Result<(), GanError> {
        if self.compiled.is_some() {
            return Err(GanError::State {
                operation: "compile_scorer",
                expected: Lifecycle::Built,
                actual: Lifecycle::Compiled,
            });
        }
        self.compiled = Some(Compiled::new(optimizer, learning_rate)?);
        Ok(())
    }

    /// Marks the parameters non-trainable and returns a view of them that records no gradients.
    pub fn freeze(&mut self) -> ImageScorer<B> {
        self.trainable = false;
        self.model.clone().no_grad()
    }

    pub fn unfreeze(&mut self) {
        self.trainable = true;
    }

    /// One optimization step on a labelled batch.
    ///
    /// # Shapes
    ///   - images [batch, rows, columns, channels]
    ///   - labels [batch, 1]
    pub fn train_on_batch(
        &mut self,
        images: Tensor<B, 4>,
        labels: Tensor<B, 2>,
    ) -> Result<StepMetrics, GanError> {
        if !self.trainable {
            return Err(GanError::Frozen {
                operation: "scorer train_on_batch",
            });
        }
        let compiled = self.compiled.as_mut().ok_or(GanError::State {
            operation: "scorer train_on_batch",
            expected: Lifecycle::Compiled,
            actual: Lifecycle::Built,
        })?;

        let probabilities = self.model.forward(images);
        compiled.fit(&mut self.model, probabilities, labels, Phase::Scorer)
    }
}
