pub mod adversarial;
pub mod compiled;
pub mod config;
pub mod dataset;
pub mod error;
pub mod gan;
pub mod generator;
pub mod lifecycle;
pub mod sample;
pub mod scorer;
pub mod state;

pub mod prelude {
    pub use crate::adversarial::AdversarialPair;
    pub use crate::config::{GanConfig, TrainingConfig};
    pub use crate::dataset::{GanDatasets, LabeledImages};
    pub use crate::error::GanError;
    pub use crate::gan::Gan;
    pub use crate::generator::{ImageGenerator, ImageGeneratorConfig};
    pub use crate::lifecycle::{Lifecycle, Phase};
    pub use crate::sample::{PngSampleWriter, SampleGrid, SampleSink};
    pub use crate::scorer::{ImageScorer, ImageScorerConfig, ScorerHandle};
    pub use crate::state::{RunningMetrics, StepMetrics, TrainingState};
}

pub mod utils;
