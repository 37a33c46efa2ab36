//! Collection of pre-defined systems.

pub mod nv_bath;
