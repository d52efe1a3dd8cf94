use crate::error::GanError;
use crate::lifecycle::Phase;
use burn::prelude::*;
use burn::tensor::ElementConversion;

pub mod loss;

/// Reads a single-element tensor back to the host as `f32`.
pub fn scalar_f32<B: Backend, const D: usize>(t: Tensor<B, D>) -> f32 {
    t.into_scalar().elem::<f32>()
}

/// Fails with a divergence when `value` is NaN or infinite.
///
/// The step index is left at zero; the orchestrator stamps it with [`GanError::at_step`].
pub fn ensure_finite(phase: Phase, quantity: &'static str, value: f32) -> Result<f32, GanError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GanError::Divergence {
            step: 0,
            phase,
            quantity,
            value,
        })
    }
}

/// Output size of a convolution along one spatial axis.
///
/// `None` when the kernel does not fit the padded input.
pub fn conv_output_size(size: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
    if stride == 0 {
        return None;
    }
    (size + 2 * padding)
        .checked_sub(kernel)
        .map(|span| span / stride + 1)
}
