use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use clap::{Parser, ValueEnum};
use models::{SteeringNet, SteeringNetConfig};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use steer_dataset::{rng_from_seed, validation_split, EdgeMapConfig, FeatureBatch};

use crate::config::PipelineConfig;
use crate::dataset::prepare_dataset;
use crate::eval::evaluate;
use crate::TrainBackend;

pub type ADBackend = Autodiff<TrainBackend>;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "train",
    about = "Train the steering-angle regression network from a simulator driving log"
)]
pub struct TrainArgs {
    /// Pipeline config (TOML). Falls back to $STEER_CONFIG, then ./steer.toml.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Driving log CSV (overrides log.path).
    #[arg(long)]
    pub log: Option<PathBuf>,
    /// Directory relative image paths are resolved against.
    #[arg(long)]
    pub image_root: Option<PathBuf>,
    /// Model artifact path; overwritten if present.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Number of epochs.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Trailing fraction held out for validation.
    #[arg(long)]
    pub val_fraction: Option<f32>,
    /// Seed for jitter, shuffling and weight init; random if unset.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Append per-epoch metrics (JSONL) to this file.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
    /// Backend to use (ndarray, or wgpu if enabled).
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

impl TrainArgs {
    pub fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(log) = &self.log {
            cfg.log.path = log.clone();
        }
        if let Some(root) = &self.image_root {
            cfg.log.image_root = Some(root.clone());
        }
        if let Some(out) = &self.out {
            cfg.train.output = out.clone();
        }
        if let Some(epochs) = self.epochs {
            cfg.train.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.train.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            cfg.train.learning_rate = lr;
        }
        if let Some(val_fraction) = self.val_fraction {
            cfg.train.val_fraction = val_fraction;
        }
        if self.seed.is_some() {
            cfg.train.seed = self.seed;
        }
        if let Some(metrics) = &self.metrics_out {
            cfg.train.metrics_out = Some(metrics.clone());
        }
    }
}

/// Files written by a successful training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub optimizer: PathBuf,
    pub meta: PathBuf,
}

impl ArtifactPaths {
    /// `model.bin` -> `model.bin`, `model_optim.bin`, `model.json`.
    pub fn from_output(out: &Path) -> Self {
        let stem = out
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        Self {
            model: out.with_extension("bin"),
            optimizer: out.with_file_name(format!("{stem}_optim.bin")),
            meta: out.with_extension("json"),
        }
    }
}

/// Architecture and preprocessing needed to rebuild a saved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub model: SteeringNetConfig,
    pub image: EdgeMapConfig,
    pub seed: u64,
    pub epochs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub val_loss: Option<f32>,
    pub val_mse: Option<f32>,
    pub val_mae: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub seed: u64,
    pub train_samples: usize,
    pub val_samples: usize,
    pub history: Vec<EpochMetrics>,
    pub artifacts: ArtifactPaths,
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend.unwrap_or(BackendKind::NdArray))?;
    let mut cfg = PipelineConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    let report = train_pipeline(&cfg)?;
    println!(
        "Done training ({} train / {} val samples, seed {})",
        report.train_samples, report.val_samples, report.seed
    );
    println!("Model saved to {}", report.artifacts.model.display());
    Ok(())
}

/// Prepare data, fit, and persist. Nothing is written unless every stage succeeds.
pub fn train_pipeline(cfg: &PipelineConfig) -> anyhow::Result<TrainReport> {
    cfg.validate()?;
    let seed = resolve_seed(cfg.train.seed);
    if cfg.train.seed.is_some() {
        <ADBackend as Backend>::seed(seed);
    }
    tracing::info!(seed, seeded = cfg.train.seed.is_some(), "using seed");
    let mut rng = rng_from_seed(Some(seed));

    let prepared = prepare_dataset(cfg, &mut rng)?;
    tracing::info!(
        log_rows = prepared.log_rows,
        balanced_rows = prepared.batch.len(),
        buckets = prepared.balance.buckets.len(),
        "dataset prepared"
    );

    let split = validation_split(prepared.batch.len(), cfg.train.val_fraction);
    let (train_set, val_set) = prepared.batch.split_at(split.train.end);
    if train_set.is_empty() {
        anyhow::bail!(
            "no training samples left after holding out {:.0}% for validation",
            cfg.train.val_fraction * 100.0
        );
    }

    let device = <ADBackend as Backend>::Device::default();
    let mut model = SteeringNet::<ADBackend>::new(cfg.model.clone(), &device);
    let mut optim = AdamConfig::new().init::<ADBackend, SteeringNet<ADBackend>>();
    let history = fit(cfg, &mut model, &mut optim, &train_set, &val_set, seed, &mut rng, &device)?;

    let artifacts = ArtifactPaths::from_output(&cfg.train.output);
    let meta = ArtifactMeta {
        model: cfg.model.clone(),
        image: cfg.image.clone(),
        seed,
        epochs: cfg.train.epochs,
    };
    save_artifacts(&model, &optim, &meta, &artifacts)?;

    Ok(TrainReport {
        seed,
        train_samples: train_set.len(),
        val_samples: val_set.len(),
        history,
        artifacts,
    })
}

/// The configured seed, or a fresh one drawn from the thread RNG.
pub fn resolve_seed(configured: Option<u64>) -> u64 {
    configured.unwrap_or_else(|| rand::rng().random())
}

#[allow(clippy::too_many_arguments)]
fn fit<O, R>(
    cfg: &PipelineConfig,
    model: &mut SteeringNet<ADBackend>,
    optim: &mut O,
    train_set: &FeatureBatch,
    val_set: &FeatureBatch,
    seed: u64,
    rng: &mut R,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<Vec<EpochMetrics>>
where
    O: Optimizer<SteeringNet<ADBackend>, ADBackend>,
    R: Rng + ?Sized,
{
    let batch_size = cfg.train.batch_size.max(1);
    let mut order: Vec<usize> = (0..train_set.len()).collect();
    let mut history = Vec::with_capacity(cfg.train.epochs);

    for epoch in 0..cfg.train.epochs {
        let started = Instant::now();
        order.shuffle(rng);
        let mut loss_sum = 0.0f64;
        for chunk in order.chunks(batch_size) {
            let batch = train_set.select(chunk);
            let (images, targets) = batch.to_tensors::<ADBackend>(device);
            let preds = model.forward(images);
            let loss = model.loss(preds, targets);
            let loss_val = scalar(loss.clone().detach());
            let grads = GradientsParams::from_grads(loss.backward(), &*model);
            *model = optim.step(cfg.train.learning_rate, model.clone(), grads);
            loss_sum += f64::from(loss_val) * chunk.len() as f64;
        }
        let loss = (loss_sum / train_set.len().max(1) as f64) as f32;

        let (val_loss, val_mse, val_mae) = if val_set.is_empty() {
            (None, None, None)
        } else {
            let valid = model.valid();
            let stats = evaluate(&valid, val_set, batch_size, device)?;
            let penalty = scalar(valid.l2_penalty());
            (Some(stats.mse + penalty), Some(stats.mse), Some(stats.mae))
        };

        tracing::info!(
            epoch = epoch + 1,
            epochs = cfg.train.epochs,
            loss,
            val_loss,
            elapsed_s = started.elapsed().as_secs_f32(),
            "epoch finished"
        );
        let metrics = EpochMetrics {
            epoch: epoch + 1,
            loss,
            val_loss,
            val_mse,
            val_mae,
        };
        if let Some(path) = &cfg.train.metrics_out {
            append_metrics(path, seed, &metrics);
        }
        history.push(metrics);
    }
    Ok(history)
}

fn save_artifacts<O>(
    model: &SteeringNet<ADBackend>,
    optim: &O,
    meta: &ArtifactMeta,
    paths: &ArtifactPaths,
) -> anyhow::Result<()>
where
    O: Optimizer<SteeringNet<ADBackend>, ADBackend>,
{
    if let Some(parent) = paths.model.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(paths.model.clone(), &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save model {}: {e}", paths.model.display()))?;
    Recorder::<ADBackend>::record(&recorder, optim.to_record(), paths.optimizer.clone()).map_err(
        |e| {
            anyhow::anyhow!(
                "failed to save optimizer state {}: {e}",
                paths.optimizer.display()
            )
        },
    )?;
    fs::write(&paths.meta, serde_json::to_vec_pretty(meta)?)?;
    tracing::info!(
        model = %paths.model.display(),
        optimizer = %paths.optimizer.display(),
        meta = %paths.meta.display(),
        "saved model artifacts"
    );
    Ok(())
}

/// Rebuild a model saved by [`train_pipeline`] on the inference backend.
pub fn load_model_from_artifacts(
    paths: &ArtifactPaths,
    device: &<TrainBackend as Backend>::Device,
) -> anyhow::Result<(SteeringNet<TrainBackend>, ArtifactMeta)> {
    let raw = fs::read(&paths.meta)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", paths.meta.display()))?;
    let meta: ArtifactMeta = serde_json::from_slice(&raw)?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = SteeringNet::<TrainBackend>::new(meta.model.clone(), device)
        .load_file(paths.model.clone(), &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load model {}: {e}", paths.model.display()))?;
    Ok((model, meta))
}

fn append_metrics(path: &Path, seed: u64, metrics: &EpochMetrics) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = fs::create_dir_all(parent);
    }
    let line = serde_json::json!({
        "seed": seed,
        "epoch": metrics.epoch,
        "loss": metrics.loss,
        "val_loss": metrics.val_loss,
        "val_mse": metrics.val_mse,
        "val_mae": metrics.val_mae,
    });
    match fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(mut f) => {
            if let Err(err) = writeln!(f, "{line}") {
                tracing::warn!(path = %path.display(), %err, "failed to append metrics");
            }
        }
        Err(err) => tracing::warn!(path = %path.display(), %err, "failed to open metrics file"),
    }
}

pub(crate) fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend nd-array");
        }
        _ => {}
    }
    Ok(())
}
