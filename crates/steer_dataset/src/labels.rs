//! Steering-label denoising and class balancing.
//!
//! Human steering input is jittery and heavily concentrated around straight
//! driving. Labels are smoothed with a Gaussian kernel, jittered and rounded
//! into 0.1-wide buckets, then every bucket is oversampled up to the size of
//! the largest one.

use crate::types::DrivingLog;
use data_contracts::DrivingLogRow;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Half-width of the smoothing kernel; the kernel has `2 * radius + 1` taps.
    pub smoothing_radius: usize,
    /// Standard deviation of the smoothing kernel, in rows.
    pub smoothing_sigma: f32,
    /// Uniform jitter added to every angle before rounding.
    pub jitter: f32,
    /// Decimal places kept when bucketing angles.
    pub decimals: u32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            smoothing_radius: 12,
            smoothing_sigma: 2.0,
            jitter: 0.02,
            decimals: 1,
        }
    }
}

impl LabelConfig {
    pub fn kernel(&self) -> Vec<f64> {
        gaussian_kernel(self.smoothing_radius, self.smoothing_sigma)
    }
}

/// Bucket statistics reported by [`balance_buckets`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceSummary {
    /// `(bucket angle, rows before padding)` in first-appearance order.
    pub buckets: Vec<(f32, usize)>,
    pub cmax: usize,
    pub rows_before: usize,
    pub rows_after: usize,
}

/// Discrete Gaussian with `2 * radius + 1` taps, normalized to sum to 1.
pub fn gaussian_kernel(radius: usize, sigma: f32) -> Vec<f64> {
    let sigma = f64::from(sigma);
    if sigma <= 0.0 {
        let mut delta = vec![0.0; 2 * radius + 1];
        delta[radius] = 1.0;
        return delta;
    }
    let r = radius as i64;
    let raw: Vec<f64> = (-r..=r)
        .map(|x| (-((x * x) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

/// Same-length convolution of `angles` with `kernel`, zero-padded at both ends.
pub fn smooth_angles(angles: &[f32], kernel: &[f64]) -> Vec<f32> {
    let n = angles.len() as i64;
    let center = (kernel.len() / 2) as i64;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let j = i + center - k as i64;
                    (0..n)
                        .contains(&j)
                        .then(|| w * f64::from(angles[j as usize]))
                })
                .sum::<f64>() as f32
        })
        .collect()
}

/// Smooth the angle column of `log` in place.
pub fn smooth_log(log: &mut DrivingLog, kernel: &[f64]) {
    let smoothed = smooth_angles(&log.angles(), kernel);
    for (row, angle) in log.rows_mut().iter_mut().zip(smoothed) {
        row.angle = angle;
    }
}

/// Add uniform noise in `[-jitter, jitter]` to every angle, then round to `decimals`.
///
/// Rounding is half-to-even.
pub fn jitter_and_round<R: Rng + ?Sized>(
    rows: &mut [DrivingLogRow],
    jitter: f32,
    decimals: u32,
    rng: &mut R,
) {
    let scale = bucket_scale(decimals);
    for row in rows.iter_mut() {
        let noise = if jitter > 0.0 {
            rng.random_range(-jitter..=jitter)
        } else {
            0.0
        };
        row.angle = ((row.angle + noise) * scale).round_ties_even() / scale;
    }
}

/// Oversample every angle bucket up to the size of the largest bucket.
///
/// Rows must already be rounded to `decimals`. The output keeps every input
/// row in order, followed by each bucket's padding: `bucket[i % len]` for
/// `i in 0..(cmax - len)`. Its length is `buckets * cmax`.
pub fn balance_buckets(
    rows: Vec<DrivingLogRow>,
    decimals: u32,
) -> (Vec<DrivingLogRow>, BalanceSummary) {
    let scale = bucket_scale(decimals);
    let mut order: Vec<i64> = Vec::new();
    let mut members: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        let key = (row.angle * scale).round_ties_even() as i64;
        members
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(idx);
    }

    let cmax = members.values().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::with_capacity(order.len() * cmax);
    out.extend(rows.iter().cloned());
    let mut buckets = Vec::with_capacity(order.len());
    for key in &order {
        let bucket = &members[key];
        buckets.push((*key as f32 / scale, bucket.len()));
        out.extend((0..cmax - bucket.len()).map(|i| rows[bucket[i % bucket.len()]].clone()));
    }

    let summary = BalanceSummary {
        buckets,
        cmax,
        rows_before: rows.len(),
        rows_after: out.len(),
    };
    (out, summary)
}

/// Jitter, round and balance `log` according to `cfg`.
pub fn impute_and_balance<R: Rng + ?Sized>(
    log: DrivingLog,
    cfg: &LabelConfig,
    rng: &mut R,
) -> (DrivingLog, BalanceSummary) {
    let mut rows = log.into_rows();
    jitter_and_round(&mut rows, cfg.jitter, cfg.decimals, rng);
    let (rows, summary) = balance_buckets(rows, cfg.decimals);
    for (angle, count) in &summary.buckets {
        tracing::debug!(angle, count, pad = summary.cmax - count, "angle bucket");
    }
    if summary.buckets.len() == 1 {
        tracing::warn!("all angles fell into a single bucket; balancing is a no-op");
    }
    tracing::info!(
        buckets = summary.buckets.len(),
        cmax = summary.cmax,
        before = summary.rows_before,
        after = summary.rows_after,
        "balanced angle buckets"
    );
    (DrivingLog::from_rows(rows), summary)
}

fn bucket_scale(decimals: u32) -> f32 {
    10f32.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn row(name: &str, angle: f32) -> DrivingLogRow {
        DrivingLogRow {
            image_path: PathBuf::from(name),
            angle,
        }
    }

    #[test]
    fn default_kernel_matches_sigma_two() {
        let k = LabelConfig::default().kernel();
        assert_eq!(k.len(), 25);
        assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        // exp(-x^2 / 8) ratio between neighbouring taps at the center.
        assert!((k[13] / k[12] - (-1.0f64 / 8.0).exp()).abs() < 1e-12);
        assert_eq!(k[0], k[24]);
    }

    #[test]
    fn smoothing_preserves_length() {
        let k = gaussian_kernel(12, 2.0);
        for n in [0usize, 1, 5, 24, 25, 100] {
            let angles: Vec<f32> = (0..n).map(|i| (i as f32 * 0.3).sin()).collect();
            assert_eq!(smooth_angles(&angles, &k).len(), n);
        }
    }

    #[test]
    fn smoothing_keeps_constant_interior() {
        let k = gaussian_kernel(12, 2.0);
        let angles = vec![0.4f32; 60];
        let out = smooth_angles(&angles, &k);
        assert!((out[30] - 0.4).abs() < 1e-6);
        // Zero padding pulls the ends toward zero.
        assert!(out[0] < 0.4);
    }

    #[test]
    fn jitter_stays_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut rows: Vec<_> = (0..500).map(|i| row(&format!("{i}"), 0.123)).collect();
        jitter_and_round(&mut rows, 0.02, 3, &mut rng);
        for r in &rows {
            assert!((r.angle - 0.123).abs() <= 0.0206, "angle {}", r.angle);
        }
    }

    #[test]
    fn rounding_without_jitter_is_half_to_even() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut rows = vec![row("a", 0.25), row("b", -0.34), row("c", 0.04)];
        jitter_and_round(&mut rows, 0.0, 1, &mut rng);
        let angles: Vec<f32> = rows.iter().map(|r| r.angle).collect();
        assert_eq!(angles, vec![0.2, -0.3, 0.0]);
    }

    #[test]
    fn every_bucket_reaches_cmax() {
        let rows = vec![
            row("a", 0.0),
            row("b", 0.0),
            row("c", 0.0),
            row("d", 0.1),
            row("e", -0.2),
            row("f", -0.2),
        ];
        let (out, summary) = balance_buckets(rows, 1);
        assert_eq!(summary.cmax, 3);
        assert_eq!(summary.buckets.len(), 3);
        assert_eq!(out.len(), 9);
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for r in &out {
            *counts.entry((r.angle * 10.0).round() as i64).or_default() += 1;
        }
        assert!(counts.values().all(|&c| c == 3));
    }

    #[test]
    fn padding_cycles_through_bucket() {
        let rows = vec![
            row("z0", 0.0),
            row("z1", 0.0),
            row("z2", 0.0),
            row("z3", 0.0),
            row("z4", 0.0),
            row("p0", 0.5),
            row("p1", 0.5),
        ];
        let (out, _) = balance_buckets(rows, 1);
        let padded: Vec<_> = out[7..]
            .iter()
            .map(|r| r.image_path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(padded, vec!["p0", "p1", "p0"]);
    }

    #[test]
    fn balancing_empty_input_is_empty() {
        let (out, summary) = balance_buckets(Vec::new(), 1);
        assert!(out.is_empty());
        assert_eq!(summary.cmax, 0);
    }
}
