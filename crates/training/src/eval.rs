use burn::tensor::backend::Backend;
use clap::Parser;
use models::SteeringNet;
use std::path::{Path, PathBuf};
use steer_dataset::{load_driving_log, load_edge_map, load_feature_batch, FeatureBatch};

use crate::config::PipelineConfig;
use crate::util::{load_model_from_artifacts, validate_backend_choice, ArtifactPaths, BackendKind};
use crate::TrainBackend;

#[derive(Parser, Debug, Default)]
#[command(
    name = "eval",
    about = "Score a trained steering model on a driving log, or predict a single frame"
)]
pub struct EvalArgs {
    /// Model artifact written by `train` (its .json sidecar must sit next to it).
    #[arg(long)]
    pub model: Option<PathBuf>,
    /// Pipeline config (TOML); supplies the log and output defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Driving log CSV to score (overrides log.path).
    #[arg(long)]
    pub log: Option<PathBuf>,
    /// Directory relative image paths are resolved against.
    #[arg(long)]
    pub image_root: Option<PathBuf>,
    /// Predict the steering angle of one camera frame instead of scoring a log.
    #[arg(long)]
    pub image: Option<PathBuf>,
    /// Samples per forward pass.
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,
    /// Backend to use (ndarray, or wgpu if enabled).
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

/// Regression error of a model over a feature batch (labels as logged, no penalty).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalStats {
    pub samples: usize,
    pub mse: f32,
    pub mae: f32,
}

/// Run `model` over `data` in chunks of `batch_size`.
pub fn evaluate<B: Backend>(
    model: &SteeringNet<B>,
    data: &FeatureBatch,
    batch_size: usize,
    device: &B::Device,
) -> anyhow::Result<EvalStats> {
    let preds = predict_batch(model, data, batch_size, device)?;
    error_stats(&preds, &data.targets)
}

/// MSE and MAE of `preds` against `targets`; the two must line up one to one.
pub fn error_stats(preds: &[f32], targets: &[f32]) -> anyhow::Result<EvalStats> {
    if preds.len() != targets.len() {
        anyhow::bail!(
            "got {} predictions for {} samples",
            preds.len(),
            targets.len()
        );
    }
    let mut se = 0.0f64;
    let mut ae = 0.0f64;
    for (p, t) in preds.iter().zip(targets) {
        let d = f64::from(p - t);
        se += d * d;
        ae += d.abs();
    }
    let n = targets.len().max(1) as f64;
    Ok(EvalStats {
        samples: targets.len(),
        mse: (se / n) as f32,
        mae: (ae / n) as f32,
    })
}

/// Predictions for every sample of `data`, in order.
pub fn predict_batch<B: Backend>(
    model: &SteeringNet<B>,
    data: &FeatureBatch,
    batch_size: usize,
    device: &B::Device,
) -> anyhow::Result<Vec<f32>> {
    let indices: Vec<usize> = (0..data.len()).collect();
    let mut out = Vec::with_capacity(data.len());
    for chunk in indices.chunks(batch_size.max(1)) {
        let (images, _) = data.select(chunk).to_tensors::<B>(device);
        let preds = model
            .forward(images)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("failed to read predictions: {e:?}"))?;
        if preds.len() != chunk.len() {
            anyhow::bail!(
                "model returned {} values for a chunk of {} samples",
                preds.len(),
                chunk.len()
            );
        }
        out.extend(preds);
    }
    Ok(out)
}

/// Steering prediction for a single camera frame.
pub fn predict_image(artifacts: &ArtifactPaths, image: &Path) -> anyhow::Result<f32> {
    let device = <TrainBackend as Backend>::Device::default();
    let (model, meta) = load_model_from_artifacts(artifacts, &device)?;
    let features = load_edge_map(image, &meta.image)?;
    let batch = FeatureBatch::new(
        features,
        vec![0.0],
        meta.image.height as usize,
        meta.image.width as usize,
    )?;
    predict_batch(&model, &batch, 1, &device)?
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("model produced no output for {}", image.display()))
}

pub fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend.unwrap_or(BackendKind::NdArray))?;
    let mut cfg = PipelineConfig::load(args.config.as_deref())?;
    if let Some(log) = &args.log {
        cfg.log.path = log.clone();
    }
    if let Some(root) = &args.image_root {
        cfg.log.image_root = Some(root.clone());
    }
    let model_path = args.model.clone().unwrap_or_else(|| cfg.train.output.clone());
    let artifacts = ArtifactPaths::from_output(&model_path);

    if let Some(image) = &args.image {
        let angle = predict_image(&artifacts, image)?;
        println!("{}: {angle:.4}", image.display());
        return Ok(());
    }

    let stats = evaluate_log(&artifacts, &cfg, args.batch_size)?;
    println!(
        "Eval complete: mse={:.5}, mae={:.5} over {} samples ({})",
        stats.mse,
        stats.mae,
        stats.samples,
        cfg.log.path.display()
    );
    Ok(())
}

/// Score a saved model against the raw angles of the configured log.
pub fn evaluate_log(
    artifacts: &ArtifactPaths,
    cfg: &PipelineConfig,
    batch_size: usize,
) -> anyhow::Result<EvalStats> {
    let device = <TrainBackend as Backend>::Device::default();
    let (model, meta) = load_model_from_artifacts(artifacts, &device)?;
    let log = load_driving_log(&cfg.log.path, cfg.log.image_root.as_deref())?;
    let data = load_feature_batch(&log, &meta.image)?;
    let stats = evaluate(&model, &data, batch_size, &device)?;
    tracing::info!(
        samples = stats.samples,
        mse = stats.mse,
        mae = stats.mae,
        "evaluated model"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::SteeringNetConfig;

    #[test]
    fn evaluate_matches_per_sample_predictions() {
        let device = Default::default();
        let model = SteeringNet::<TrainBackend>::new(SteeringNetConfig::default(), &device);
        let n = 5;
        let features: Vec<f32> = (0..n * 32 * 128)
            .map(|i| if i % 7 == 0 { 255.0 } else { 0.0 })
            .collect();
        let targets = vec![0.1, -0.2, 0.0, 0.3, 0.5];
        let data = FeatureBatch::new(features, targets.clone(), 32, 128).unwrap();

        let preds = predict_batch(&model, &data, 2, &device).unwrap();
        assert_eq!(preds.len(), n);
        let expected_mae: f32 =
            preds.iter().zip(&targets).map(|(p, t)| (p - t).abs()).sum::<f32>() / n as f32;

        let stats = evaluate(&model, &data, 2, &device).unwrap();
        assert_eq!(stats.samples, n);
        assert!((stats.mae - expected_mae).abs() < 1e-5);
        assert!(stats.mse >= 0.0);
    }

    #[test]
    fn mismatched_prediction_count_is_an_error() {
        assert!(error_stats(&[], &[0.1, 0.2]).is_err());
        assert!(error_stats(&[0.1], &[0.1, 0.2]).is_err());

        let stats = error_stats(&[0.5, -0.5], &[0.0, 0.0]).unwrap();
        assert_eq!(stats.samples, 2);
        assert!((stats.mse - 0.25).abs() < 1e-6);
        assert!((stats.mae - 0.5).abs() < 1e-6);
    }
}
