use crate::config::PipelineConfig;
use anyhow::Context;
use rand::Rng;
use steer_dataset::{
    impute_and_balance, load_driving_log, load_feature_batch, shuffle_rows, smooth_log,
    BalanceSummary, FeatureBatch,
};

/// Everything the fit loop consumes, already balanced, shuffled and materialized.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub batch: FeatureBatch,
    pub balance: BalanceSummary,
    pub log_rows: usize,
}

/// Load -> smooth -> jitter/round/balance -> shuffle -> edge maps.
pub fn prepare_dataset<R: Rng + ?Sized>(
    cfg: &PipelineConfig,
    rng: &mut R,
) -> anyhow::Result<PreparedData> {
    let mut log = load_driving_log(&cfg.log.path, cfg.log.image_root.as_deref())
        .with_context(|| format!("failed to load driving log {}", cfg.log.path.display()))?;
    let log_rows = log.len();

    smooth_log(&mut log, &cfg.labels.kernel());
    let (mut log, balance) = impute_and_balance(log, &cfg.labels, rng);
    shuffle_rows(&mut log, rng);

    let batch = load_feature_batch(&log, &cfg.image).context("failed to load edge maps")?;
    Ok(PreparedData {
        batch,
        balance,
        log_rows,
    })
}
