//! Error types shared across the CCE engine.

use std::path::PathBuf;
use thiserror::Error;
use crate::transport::Rank;

/// Result alias used throughout the crate.
pub type CceResult<T> = Result<T, CceError>;

/// A coherence-reduction division by a value indistinguishable from zero.
///
/// These are recorded per cluster and collected into the final report rather
/// than aborting the run; see [`CoherenceReducer`][crate::reduce::CoherenceReducer].
#[derive(Clone, Debug, PartialEq, Error)]
#[error(
    "reduction failed for cluster {index} {spins:?} at order {} due to \
    near-singular division (|x| = {value:e} at time step {time_index}, \
    sub-cluster {}:{sub_index})",
    .order + 1,
    .sub_order + 1
)]
pub struct NumericInstability {
    /// Order index of the offending cluster.
    pub order: usize,
    /// Index of the offending cluster within its order.
    pub index: usize,
    /// Spin indices of the offending cluster.
    pub spins: Vec<usize>,
    /// Order index of the sub-cluster whose tilde value vanished.
    pub sub_order: usize,
    /// Index of the sub-cluster whose tilde value vanished.
    pub sub_index: usize,
    /// First time step at which the divisor fell below tolerance.
    pub time_index: usize,
    /// The divisor at `time_index`.
    pub value: f64,
}

/// Canonical error type for the CCE engine.
#[derive(Debug, Error)]
pub enum CceError {
    /// Missing or invalid run parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The bath source produced no spins.
    #[error("bath contains no spins; nothing to enumerate at order 1")]
    EmptyBath,

    /// An order required to be non-empty has no clusters.
    #[error("enumeration produced zero clusters at order {order}")]
    EmptyEnumeration { order: usize },

    /// Failure in a required point-to-point exchange.
    #[error("transport failure from rank {from} to rank {to}: {reason}")]
    Transport { from: Rank, to: Rank, reason: String },

    /// Near-singular division during coherence reduction.
    #[error(transparent)]
    NumericInstability(#[from] NumericInstability),

    /// An order was reduced before all lower orders.
    #[error("order {got} reduced out of sequence; expected order {expected}")]
    ReductionOrder { expected: usize, got: usize },

    /// Failure while evolving a single cluster.
    #[error("evolution failed for cluster {spins:?} at order {order}: {reason}")]
    Evolution { order: usize, spins: Vec<usize>, reason: String },

    /// Malformed bath coordinate file.
    #[error("{}:{line}: {reason}", .path.display())]
    BathFile { path: PathBuf, line: usize, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to write npz output: {0}")]
    Npz(#[from] ndarray_npy::WriteNpzError),
}

impl CceError {
    /// Shorthand for a [`CceError::Config`].
    pub fn config<S: Into<String>>(msg: S) -> Self { Self::Config(msg.into()) }

    /// Shorthand for a [`CceError::Transport`].
    pub fn transport<S: Into<String>>(from: Rank, to: Rank, reason: S) -> Self {
        Self::Transport { from, to, reason: reason.into() }
    }

    /// Return `true` if `self` should abort the whole run.
    ///
    /// Only [`NumericInstability`] records are non-fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NumericInstability(_))
    }
}
