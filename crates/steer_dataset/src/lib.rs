//! Dataset utilities for steering-angle regression.
//!
//! This crate provides utilities for:
//! - Loading the simulator's headerless driving log
//! - Smoothing, jittering and bucket-balancing steering labels
//! - Shuffling and validation splitting
//! - Edge-map preprocessing of dash-cam frames
//! - Burn-compatible feature batches

pub mod batch;
pub mod labels;
pub mod log;
pub mod preprocess;
pub mod splits;
pub mod types;

pub use batch::{load_feature_batch, FeatureBatch};
pub use labels::{
    balance_buckets, gaussian_kernel, impute_and_balance, jitter_and_round, smooth_angles,
    smooth_log, BalanceSummary, LabelConfig,
};
pub use log::load_driving_log;
pub use preprocess::{edge_map, load_edge_map, EdgeMapConfig};
pub use splits::{rng_from_seed, shuffle_rows, validation_split, ValidationSplit};
pub use types::*;
