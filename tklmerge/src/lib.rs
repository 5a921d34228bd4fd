//! Merges the keyframe tables (`.tkl`) shared by animated model containers (`.tmd`).
//!
//! Every referenced location/rotation value is pooled across the input models, reduced with
//! k-means to the slot counts of a master table, and each model is rewritten to index the reduced
//! table. Scene graph and mesh payload are copied verbatim.
//!
//! The codec and [`merge_in_memory`] are IO-free; [`merge`] wraps them with file access.

#![forbid(unsafe_code)]

mod error;
mod model;

pub mod binary;
pub mod extract;
pub mod lut;
pub mod merge;
pub mod quantize;
pub mod writer;

pub use error::*;
pub use merge::{
    MergeConfig, MergeInput, MergeOptions, MergeOutput, MergeReport, ModelInput, merge,
    merge_in_memory,
};
pub use model::*;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod binary_tests;
