//! The image generator: maps latent noise vectors to images.

use crate::error::GanError;
use burn::nn::conv::{ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};

/// Number of upsampling blocks between the dense projection and the output layer.
pub const GENERATOR_BLOCKS: usize = 3;

/// Blocks that double the spatial size. The remaining blocks keep it.
const UPSAMPLING_BLOCKS: usize = 2;

#[derive(Config, Debug)]
pub struct ImageGeneratorConfig {
    pub rows: usize,
    pub columns: usize,
    pub channels: usize,
    #[config(default = 100)]
    pub latent_dim: usize,
    /// Channels after the dense projection. Block `i` (1-indexed) uses `depth / 2^i`.
    #[config(default = 256)]
    pub depth: usize,
    #[config(default = 5)]
    pub kernel_size: usize,
    /// Keras convention: weight of the previous running statistics.
    #[config(default = 0.9)]
    pub norm_momentum: f64,
}

impl ImageGeneratorConfig {
    /// Filter count of block `block` (1-indexed).
    pub fn block_filters(&self, block: usize) -> usize {
        self.depth >> block
    }

    /// Spatial size `[rows, columns]` of the dense projection.
    pub fn seed_grid(&self) -> [usize; 2] {
        let scale = 1 << UPSAMPLING_BLOCKS;
        [self.rows / scale, self.columns / scale]
    }

    pub fn validate(&self) -> Result<(), GanError> {
        let scale = 1 << UPSAMPLING_BLOCKS;
        for (field, size) in [("rows", self.rows), ("columns", self.columns)] {
            if size == 0 || size % scale != 0 {
                return Err(GanError::precondition(
                    field,
                    format!("must be a positive multiple of {scale}, found {size}"),
                ));
            }
        }
        if self.block_filters(GENERATOR_BLOCKS) == 0 {
            return Err(GanError::precondition(
                "depth",
                format!(
                    "must be at least {}, found {}",
                    1 << GENERATOR_BLOCKS,
                    self.depth
                ),
            ));
        }
        if self.kernel_size % 2 == 0 {
            return Err(GanError::precondition(
                "kernel_size",
                format!("must be odd, found {}", self.kernel_size),
            ));
        }
        Ok(())
    }

    /// burn weighs the current batch with `momentum`, the complement of the Keras convention.
    fn norm(&self, num_features: usize) -> BatchNormConfig {
        BatchNormConfig::new(num_features).with_momentum(1.0 - self.norm_momentum)
    }

    /// Returns the initialized model.
    ///
    /// The configuration is expected to be [validated](Self::validate).
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageGenerator<B> {
        let [grid_rows, grid_columns] = self.seed_grid();
        let projection = LinearConfig::new(self.latent_dim, self.depth * grid_rows * grid_columns)
            .with_bias(true)
            .init(device);
        let projection_norm = self.norm(self.depth).init(device);

        let padding = self.kernel_size / 2;
        let kernel = [self.kernel_size, self.kernel_size];
        let mut blocks = Vec::with_capacity(GENERATOR_BLOCKS);
        let mut channels_in = self.depth;
        for block in 1..=GENERATOR_BLOCKS {
            let filters = self.block_filters(block);
            let conv = ConvTranspose2dConfig::new([channels_in, filters], kernel)
                .with_padding([padding, padding]);
            let conv = if block <= UPSAMPLING_BLOCKS {
                conv.with_stride([2, 2]).with_padding_out([1, 1])
            } else {
                conv
            };
            blocks.push(UpsampleBlock {
                conv: conv.init(device),
                norm: self.norm(filters).init(device),
            });
            channels_in = filters;
        }

        let output = ConvTranspose2dConfig::new([channels_in, self.channels], kernel)
            .with_padding([padding, padding])
            .init(device);

        ImageGenerator {
            projection,
            projection_norm,
            blocks,
            output,
            latent_dim: self.latent_dim,
            rows: self.rows,
            columns: self.columns,
            channels: self.channels,
        }
    }
}

/// Transposed convolution, batch normalization, ReLU.
#[derive(Module, Debug)]
pub struct UpsampleBlock<B: Backend> {
    pub conv: ConvTranspose2d<B>,
    pub norm: BatchNorm<B>,
}

impl<B: Backend> UpsampleBlock<B> {
    /// # Shapes
    ///   - Input [batch, channels_in, rows, columns]
    ///   - Output [batch, channels_out, rows * stride, columns * stride]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        relu(x)
    }
}

#[derive(Module, Debug)]
pub struct ImageGenerator<B: Backend> {
    pub projection: Linear<B>,
    pub projection_norm: BatchNorm<B>,
    pub blocks: Vec<UpsampleBlock<B>>,
    pub output: ConvTranspose2d<B>,
    pub latent_dim: usize,
    pub rows: usize,
    pub columns: usize,
    pub channels: usize,
}

impl<B: Backend> ImageGenerator<B> {
    /// Image shape as `[rows, columns, channels]`.
    pub fn image_dims(&self) -> [usize; 3] {
        [self.rows, self.columns, self.channels]
    }

    /// # Shapes
    ///   - Input [batch, latent_dim]
    ///   - Output [batch, rows, columns, channels], values in `[0, 1]`
    pub fn forward(&self, noise: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, latent_dim] = noise.dims();
        debug_assert_eq!(latent_dim, self.latent_dim);

        let x = self.projection.forward(noise);
        let [_batch, projected] = x.dims();
        let scale = 1 << UPSAMPLING_BLOCKS;
        let [grid_rows, grid_columns] = [self.rows / scale, self.columns / scale];
        let depth = projected / (grid_rows * grid_columns);
        let x = x.reshape([batch, depth, grid_rows, grid_columns]);
        let mut x = relu(self.projection_norm.forward(x));

        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = sigmoid(self.output.forward(x));
        debug_assert_eq!(
            [batch, self.channels, self.rows, self.columns],
            x.dims()
        );

        // back to channels-last
        x.permute([0, 2, 3, 1])
    }
}
