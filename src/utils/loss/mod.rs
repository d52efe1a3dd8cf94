pub mod bce;

pub use bce::{BinaryCrossEntropy, BinaryCrossEntropyConfig};
