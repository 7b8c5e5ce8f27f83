//! Pipeline configuration.
//!
//! Every knob defaults to the values the network was tuned with; a TOML file
//! only needs the fields it changes:
//!
//! ```toml
//! [log]
//! path = "runs/lake/driving_log.csv"
//!
//! [image]
//! canny_low = 80.0
//!
//! [train]
//! epochs = 4
//! seed = 7
//! ```

use anyhow::Context;
use models::SteeringNetConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use steer_dataset::{EdgeMapConfig, LabelConfig};

pub const DEFAULT_CONFIG_NAME: &str = "steer.toml";
pub const CONFIG_ENV: &str = "STEER_CONFIG";
/// Finer buckets than this stop being exact in f32.
pub const MAX_LABEL_DECIMALS: u32 = 6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub log: LogSection,
    pub labels: LabelConfig,
    pub image: EdgeMapConfig,
    pub model: SteeringNetConfig,
    pub train: TrainSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Headerless driving log written by the simulator.
    pub path: PathBuf,
    /// Directory relative image paths are resolved against; paths are used as written if unset.
    pub image_root: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./driving_log.csv"),
            image_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainSection {
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Trailing fraction of the shuffled dataset held out for validation.
    pub val_fraction: f32,
    /// Seed for jitter and shuffling; unset means a fresh seed every run.
    pub seed: Option<u64>,
    /// Model artifact path. Overwritten on every run.
    pub output: PathBuf,
    /// Optional JSONL file receiving one line per epoch.
    pub metrics_out: Option<PathBuf>,
}

impl Default for TrainSection {
    fn default() -> Self {
        Self {
            batch_size: 64,
            epochs: 16,
            learning_rate: 1e-3,
            val_fraction: 0.2,
            seed: None,
            output: PathBuf::from("../model.bin"),
            metrics_out: None,
        }
    }
}

impl PipelineConfig {
    /// Resolve the config file: `explicit`, then `$STEER_CONFIG`, then
    /// `steer.toml` in the working directory, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default = Path::new(DEFAULT_CONFIG_NAME);
        if default.exists() {
            return Self::from_path(default);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: PipelineConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::info!(config = %path.display(), "loaded pipeline config");
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let train = &self.train;
        if train.batch_size == 0 {
            anyhow::bail!("train.batch_size must be at least 1");
        }
        if train.epochs == 0 {
            anyhow::bail!("train.epochs must be at least 1");
        }
        if train.learning_rate.is_nan() || train.learning_rate <= 0.0 {
            anyhow::bail!("train.learning_rate must be positive");
        }
        if train.output.extension().is_some_and(|ext| ext.to_str() != Some("bin")) {
            anyhow::bail!(
                "train.output must end in .bin (model weights are written as {}), got {}",
                train.output.with_extension("bin").display(),
                train.output.display()
            );
        }
        if !(0.0..1.0).contains(&train.val_fraction) {
            anyhow::bail!(
                "train.val_fraction must be in [0, 1), got {}",
                train.val_fraction
            );
        }

        let image = &self.image;
        if image.crop_bottom <= image.crop_top {
            anyhow::bail!(
                "image crop window [{}, {}) is empty",
                image.crop_top,
                image.crop_bottom
            );
        }
        if image.width == 0 || image.height == 0 {
            anyhow::bail!("image size must be non-zero");
        }
        if image.canny_low > image.canny_high {
            anyhow::bail!(
                "image.canny_low ({}) exceeds image.canny_high ({})",
                image.canny_low,
                image.canny_high
            );
        }

        let model = &self.model;
        if model.input_height != image.height as usize || model.input_width != image.width as usize
        {
            anyhow::bail!(
                "model input {}x{} does not match edge map {}x{}",
                model.input_width,
                model.input_height,
                image.width,
                image.height
            );
        }
        if model.channels.is_empty() || model.head_inputs() == 0 {
            anyhow::bail!(
                "{} pooling blocks leave no spatial extent for a {}x{} input",
                model.channels.len(),
                model.input_width,
                model.input_height
            );
        }
        if model.kernel_size % 2 == 0 {
            anyhow::bail!("model.kernel_size must be odd for same padding");
        }
        let labels = &self.labels;
        if !(labels.smoothing_sigma.is_finite() && labels.smoothing_sigma >= 0.0) {
            anyhow::bail!(
                "labels.smoothing_sigma must be finite and non-negative, got {}",
                labels.smoothing_sigma
            );
        }
        if !(labels.jitter.is_finite() && labels.jitter >= 0.0) {
            anyhow::bail!(
                "labels.jitter must be finite and non-negative, got {}",
                labels.jitter
            );
        }
        if labels.decimals > MAX_LABEL_DECIMALS {
            anyhow::bail!(
                "labels.decimals must be at most {MAX_LABEL_DECIMALS}, got {}",
                labels.decimals
            );
        }
        Ok(())
    }
}
