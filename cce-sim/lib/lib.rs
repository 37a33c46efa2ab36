#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Cluster-correlation expansion (CCE) of central-spin decoherence, distributed
//! over cooperating ranks.
//!
//! The bath is decomposed into clusters of up to a maximum number of spins
//! ([`cluster`]), each order's clusters are split across ranks
//! ([`partition`], [`dispatch`]), evolved independently ([`runner`],
//! [`physics`]), collected on the coordinator ([`gather`]), and recombined
//! with their sub-cluster contributions divided out ([`reduce`]). The whole
//! pipeline is driven by [`cce`].

pub use ndarray_npy;

pub mod utils;
pub mod error;
pub mod spin;
pub mod bath;
pub mod cluster;
pub mod partition;
pub mod transport;
pub mod dispatch;
pub mod runner;
pub mod gather;
pub mod reduce;
pub mod physics;
pub mod config;
pub mod cce;
pub mod output;

pub use error::{ CceError, CceResult, NumericInstability };
pub use cce::{ CceOutput, run_rank, run_threads };
