#![allow(dead_code)]

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_dcgan::prelude::*;

pub type TestBackend = NdArray;
pub type TestAutodiffBackend = Autodiff<TestBackend>;

/// 8x8 grayscale images and small models, fast enough for many training steps.
pub fn tiny_config() -> GanConfig {
    GanConfig::new("tiny".to_string(), 8, 8, 1)
        .with_depth(2)
        .with_generator_depth(16)
        .with_kernel_size(3)
        .with_latent_dim(4)
        .with_grid_rows(2)
        .with_grid_columns(2)
        .with_seed(7)
}

pub fn compiled_gan(config: GanConfig) -> Gan<TestAutodiffBackend> {
    let mut gan = Gan::new(config, Default::default()).unwrap();
    gan.initialize_models().unwrap();
    gan
}

/// `n` random images in `[0, 1]` of shape `dims`, with one-hot-like labels.
pub fn labeled(n: usize, dims: [usize; 3]) -> LabeledImages<TestAutodiffBackend> {
    let device = Default::default();
    let [rows, columns, channels] = dims;
    let images = Tensor::random(
        [n, rows, columns, channels],
        Distribution::Uniform(0.0, 1.0),
        &device,
    );
    let labels = Tensor::zeros([n, 10], &device);
    LabeledImages::new(images, labels)
}

pub fn datasets(n: usize, dims: [usize; 3]) -> GanDatasets<TestAutodiffBackend> {
    GanDatasets::new(labeled(n, dims))
}

/// Keeps every grid it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub grids: Vec<(usize, SampleGrid)>,
}

impl RecordingSink {
    pub fn steps(&self) -> Vec<usize> {
        self.grids.iter().map(|(step, _)| *step).collect()
    }
}

impl SampleSink for RecordingSink {
    fn save(&mut self, step: usize, grid: &SampleGrid) -> Result<(), GanError> {
        self.grids.push((step, grid.clone()));
        Ok(())
    }
}

pub fn values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap()
}
