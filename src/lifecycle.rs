use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the orchestrator and of its individual handles.
///
/// `Uninitialized → Built → Compiled → Training → Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    /// Scorer and generator topologies exist.
    Built,
    /// Scorer and adversarial pair have optimizers attached.
    Compiled,
    Training,
    Done,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "UNINITIALIZED",
            Lifecycle::Built => "BUILT",
            Lifecycle::Compiled => "COMPILED",
            Lifecycle::Training => "TRAINING",
            Lifecycle::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Optimization phase of a training step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Scorer update on real and generated images.
    Scorer,
    /// Generator update through the frozen scorer.
    Adversarial,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Scorer => f.write_str("scorer"),
            Phase::Adversarial => f.write_str("adversarial"),
        }
    }
}
