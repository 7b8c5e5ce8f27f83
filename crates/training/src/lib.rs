#![recursion_limit = "256"]

pub mod config;
pub mod dataset;
pub mod eval;
pub mod util;

pub use config::PipelineConfig;
pub use dataset::{prepare_dataset, PreparedData};
pub use eval::{error_stats, evaluate, run_eval, EvalArgs, EvalStats};
pub use models::{SteeringNet, SteeringNetConfig};
pub use util::{run_train, train_pipeline, ArtifactPaths, TrainArgs, TrainReport};
/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

/// Install the fmt subscriber used by the bins; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
