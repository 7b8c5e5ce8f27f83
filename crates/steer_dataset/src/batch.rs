//! Materialized feature batches for training and evaluation.

use crate::preprocess::{load_edge_map, EdgeMapConfig};
use crate::types::{DatasetError, DatasetResult, DrivingLog};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use std::time::Instant;

const LOG_EVERY_IMAGES: usize = 1000;

/// Edge maps and steering targets, index-aligned with the dataset order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBatch {
    /// Row-major `[len, height, width]` values (one implicit channel).
    pub features: Vec<f32>,
    pub targets: Vec<f32>,
    pub height: usize,
    pub width: usize,
}

impl FeatureBatch {
    pub fn new(
        features: Vec<f32>,
        targets: Vec<f32>,
        height: usize,
        width: usize,
    ) -> DatasetResult<Self> {
        if features.len() != targets.len() * height * width {
            return Err(DatasetError::Shape(format!(
                "{} feature values for {} targets of {}x{}",
                features.len(),
                targets.len(),
                height,
                width
            )));
        }
        Ok(Self {
            features,
            targets,
            height,
            width,
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn sample_len(&self) -> usize {
        self.height * self.width
    }

    /// Edge map of sample `idx`.
    pub fn sample(&self, idx: usize) -> &[f32] {
        let n = self.sample_len();
        &self.features[idx * n..(idx + 1) * n]
    }

    /// Copy out the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> FeatureBatch {
        let mut features = Vec::with_capacity(indices.len() * self.sample_len());
        let mut targets = Vec::with_capacity(indices.len());
        for &idx in indices {
            features.extend_from_slice(self.sample(idx));
            targets.push(self.targets[idx]);
        }
        FeatureBatch {
            features,
            targets,
            height: self.height,
            width: self.width,
        }
    }

    /// Split into `[0, at)` and `[at, len)`.
    pub fn split_at(mut self, at: usize) -> (FeatureBatch, FeatureBatch) {
        let at = at.min(self.len());
        let tail_features = self.features.split_off(at * self.sample_len());
        let tail_targets = self.targets.split_off(at);
        let tail = FeatureBatch {
            features: tail_features,
            targets: tail_targets,
            height: self.height,
            width: self.width,
        };
        (self, tail)
    }

    /// Images as `[N, 1, H, W]` and targets as `[N, 1]`.
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 4>, Tensor<B, 2>) {
        let n = self.len();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(self.features.clone(), [n, 1, self.height, self.width]),
            device,
        );
        let targets =
            Tensor::<B, 2>::from_data(TensorData::new(self.targets.clone(), [n, 1]), device);
        (images, targets)
    }
}

/// Load the edge map of every row in `log`, in order. The first unreadable
/// frame aborts the whole load.
pub fn load_feature_batch(log: &DrivingLog, cfg: &EdgeMapConfig) -> DatasetResult<FeatureBatch> {
    let started = Instant::now();
    let per_image = cfg.feature_len();
    let mut features = Vec::with_capacity(log.len() * per_image);
    for (i, row) in log.rows().iter().enumerate() {
        let edges = load_edge_map(&row.image_path, cfg)?;
        if edges.len() != per_image {
            return Err(DatasetError::Shape(format!(
                "edge map for {} has {} values, expected {}",
                row.image_path.display(),
                edges.len(),
                per_image
            )));
        }
        features.extend_from_slice(&edges);
        if (i + 1) % LOG_EVERY_IMAGES == 0 {
            tracing::info!(
                loaded = i + 1,
                total = log.len(),
                elapsed_s = started.elapsed().as_secs_f32(),
                "loading edge maps"
            );
        }
    }
    tracing::info!(
        images = log.len(),
        elapsed_s = started.elapsed().as_secs_f32(),
        transform = %cfg.describe(),
        "edge maps ready"
    );
    FeatureBatch::new(
        features,
        log.angles(),
        cfg.height as usize,
        cfg.width as usize,
    )
}
