#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Pre-defined systems and the command-line plumbing shared by the binaries.

pub mod cli;
pub mod systems;
