//! Crate-wide error type.
//!
//! Every fallible operation in the simulation core returns [`SimError`]. The
//! variants map onto the recovery policy the mediator and engine implement:
//! `Device` at worker initialization permanently disables that facade,
//! `DeviceLost` at runtime triggers failover to the single-core CPU worker,
//! `Size` and `State` are programmer errors that are logged and propagated,
//! and `InitEmpty` makes the engine revert to the last good parameter set.

use thiserror::Error;

use crate::worker::WorkerState;

#[derive(Debug, Error)]
pub enum SimError {
    /// A compute device could not be acquired or its kernel failed to build.
    #[error("compute device unavailable: {0}")]
    Device(String),

    /// Buffer or body-count mismatch, e.g. a population that is not a
    /// multiple of the GPU workgroup size or a copy with the wrong length.
    #[error("size mismatch: {0}")]
    Size(String),

    /// Operation not permitted in the worker's current lifecycle state.
    #[error("operation not permitted in worker state {0:?}")]
    State(WorkerState),

    /// The body initializer produced no bodies (zero population or a script
    /// configuration whose seed arrays were never written).
    #[error("initializer produced no bodies")]
    InitEmpty,

    /// The device backing a running worker disappeared mid-simulation.
    #[error("compute device lost during simulation")]
    DeviceLost,

    /// Diagnostic raised by the script bridge call surface.
    #[error("{0}")]
    Script(String),

    /// Snapshot or parameter persistence failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encode/decode failure.
    #[error("serialization error: {0}")]
    Encoding(String),
}

impl SimError {
    /// True for failures that should disable the worker rather than be
    /// retried: device loss and device acquisition problems.
    pub fn is_device_failure(&self) -> bool {
        matches!(self, SimError::Device(_) | SimError::DeviceLost)
    }
}
