use crate::lifecycle::{Lifecycle, Phase};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the orchestrator and its handles.
///
/// Nothing is retried: every variant reaches the caller of [`Gan`](crate::gan::Gan).
#[derive(Debug, Error)]
pub enum GanError {
    /// Malformed datasets, shapes or run parameters, caught before any step executes.
    #[error("precondition failed for `{field}`: {reason}")]
    Precondition { field: String, reason: String },

    /// An operation was invoked out of lifecycle order.
    #[error("`{operation}` expects the {expected} state, but the current state is {actual}")]
    State {
        operation: &'static str,
        expected: Lifecycle,
        actual: Lifecycle,
    },

    /// Non-finite value produced mid-step. Fatal for the current run.
    #[error("training diverged at step {step} during the {phase} phase: {quantity} = {value}")]
    Divergence {
        step: usize,
        phase: Phase,
        quantity: &'static str,
        value: f32,
    },

    /// The scorer parameters are frozen by an in-flight adversarial update.
    #[error("`{operation}` requires trainable scorer parameters, but they are frozen")]
    Frozen { operation: &'static str },

    #[error("failed to write sample grid to {path:?}: {source}")]
    Sample {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Model record could not be written or read.
    #[error("recorder error: {0}")]
    Record(String),

    /// Tensor data could not be read back to the host.
    #[error("tensor data error: {0}")]
    Data(String),
}

impl GanError {
    pub fn precondition(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Precondition {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stamps the training step index onto a divergence raised by a handle.
    pub fn at_step(self, step: usize) -> Self {
        match self {
            Self::Divergence {
                phase,
                quantity,
                value,
                ..
            } => Self::Divergence {
                step,
                phase,
                quantity,
                value,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_step_only_touches_divergence() {
        let diverged = GanError::Divergence {
            step: 0,
            phase: Phase::Adversarial,
            quantity: "loss",
            value: f32::NAN,
        }
        .at_step(7);
        let GanError::Divergence { step, phase, .. } = diverged else {
            panic!("expected a divergence, got {diverged:?}");
        };
        assert_eq!(step, 7);
        assert_eq!(phase, Phase::Adversarial);

        let precondition = GanError::precondition("steps", "must be positive").at_step(7);
        assert!(matches!(precondition, GanError::Precondition { .. }));
    }

    #[test]
    fn messages_name_the_offending_field_and_states() {
        let err = GanError::precondition("y_train", "expected 100 examples, found 99");
        assert_eq!(
            err.to_string(),
            "precondition failed for `y_train`: expected 100 examples, found 99"
        );

        let err = GanError::State {
            operation: "train",
            expected: Lifecycle::Compiled,
            actual: Lifecycle::Built,
        };
        assert_eq!(
            err.to_string(),
            "`train` expects the COMPILED state, but the current state is BUILT"
        );
    }
}
