use std::fs;
use std::path::{Path, PathBuf};
use steer_dataset::rng_from_seed;
use training::eval::{evaluate_log, predict_image};
use training::util::ArtifactMeta;
use training::{prepare_dataset, train_pipeline, ArtifactPaths, PipelineConfig};

fn write_frame(path: &Path, offset: u32) {
    let img = image::RgbImage::from_fn(320, 160, |x, y| {
        if (x + offset) % 32 < 6 && y > 60 {
            image::Rgb([240, 235, 225])
        } else {
            image::Rgb([40, 45, 50])
        }
    });
    img.save(path).expect("save frame");
}

fn write_dataset(dir: &Path, angles: &[f32]) -> PathBuf {
    let img_dir = dir.join("IMG");
    fs::create_dir_all(&img_dir).unwrap();
    let mut csv = String::new();
    for (i, angle) in angles.iter().enumerate() {
        let name = format!("center_{i:04}.png");
        write_frame(&img_dir.join(&name), i as u32 * 5);
        csv.push_str(&format!(
            "IMG/{name}, IMG/left_{i:04}.png, IMG/right_{i:04}.png, {angle}, 0.5, 0, 20.0\n"
        ));
    }
    let path = dir.join("driving_log.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn tiny_config(dir: &Path, log: PathBuf) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.log.path = log;
    cfg.log.image_root = Some(dir.to_path_buf());
    cfg.train.epochs = 2;
    cfg.train.batch_size = 4;
    cfg.train.seed = Some(3);
    cfg.train.output = dir.join("out").join("model.bin");
    cfg
}

#[test]
fn trains_and_writes_loadable_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let log = write_dataset(tmp.path(), &[0.0, 0.1, -0.2, 0.3, 0.0, -0.1, 0.2, 0.0]);
    let mut cfg = tiny_config(tmp.path(), log);
    let metrics = tmp.path().join("metrics.jsonl");
    cfg.train.metrics_out = Some(metrics.clone());

    let report = train_pipeline(&cfg).expect("training succeeds");
    assert_eq!(report.seed, 3);
    assert_eq!(report.history.len(), 2);
    assert!(report.history.iter().all(|m| m.loss.is_finite()));
    assert!(report.val_samples > 0);
    assert!(report.history.iter().all(|m| m.val_loss.is_some()));

    let paths = ArtifactPaths::from_output(&cfg.train.output);
    assert_eq!(report.artifacts, paths);
    assert!(paths.model.exists());
    assert!(paths.optimizer.exists());
    let meta: ArtifactMeta = serde_json::from_slice(&fs::read(&paths.meta).unwrap()).unwrap();
    assert_eq!(meta.model, cfg.model);
    assert_eq!(meta.image, cfg.image);

    let lines = fs::read_to_string(&metrics).unwrap();
    assert_eq!(lines.lines().count(), 2);
    let first: serde_json::Value = serde_json::from_str(lines.lines().next().unwrap()).unwrap();
    assert_eq!(first["epoch"], 1);

    let angle = predict_image(&paths, &tmp.path().join("IMG/center_0002.png")).unwrap();
    assert!(angle.is_finite());

    let stats = evaluate_log(&paths, &cfg, 3).unwrap();
    assert_eq!(stats.samples, 8);
    assert!(stats.mse.is_finite() && stats.mae.is_finite());
}

#[test]
fn unreadable_frame_aborts_before_anything_is_written() {
    let tmp = tempfile::tempdir().unwrap();
    let log = write_dataset(tmp.path(), &[0.0, 0.1, -0.1, 0.2]);
    fs::remove_file(tmp.path().join("IMG/center_0001.png")).unwrap();
    let cfg = tiny_config(tmp.path(), log);

    assert!(train_pipeline(&cfg).is_err());
    let paths = ArtifactPaths::from_output(&cfg.train.output);
    assert!(!paths.model.exists());
    assert!(!paths.meta.exists());
}

#[test]
fn seeded_preparation_is_reproducible() {
    let tmp = tempfile::tempdir().unwrap();
    let log = write_dataset(tmp.path(), &[0.0, 0.0, 0.3, -0.3, 0.1, 0.0]);
    let cfg = tiny_config(tmp.path(), log);

    let a = prepare_dataset(&cfg, &mut rng_from_seed(Some(11))).unwrap();
    let b = prepare_dataset(&cfg, &mut rng_from_seed(Some(11))).unwrap();
    assert_eq!(a.batch, b.batch);
    assert_eq!(a.log_rows, 6);
    assert_eq!(a.batch.len(), a.balance.rows_after);
}

#[test]
fn unseeded_runs_draw_their_own_seed() {
    let tmp = tempfile::tempdir().unwrap();
    let log = write_dataset(tmp.path(), &[0.0, 0.1, -0.2, 0.3, 0.0, -0.1]);
    let mut cfg = tiny_config(tmp.path(), log);
    cfg.train.seed = None;
    cfg.train.epochs = 1;

    let first = train_pipeline(&cfg).expect("first unseeded run");
    let meta: ArtifactMeta =
        serde_json::from_slice(&fs::read(&first.artifacts.meta).unwrap()).unwrap();
    assert_eq!(meta.seed, first.seed);

    let second = train_pipeline(&cfg).expect("second unseeded run");
    assert_ne!(first.seed, second.seed);
    assert!(second.history.iter().all(|m| m.loss.is_finite()));
}

#[test]
fn unseeded_preparation_orders_differ() {
    let tmp = tempfile::tempdir().unwrap();
    let angles: Vec<f32> = (0..24).map(|i| (i % 6) as f32 * 0.1 - 0.2).collect();
    let log = write_dataset(tmp.path(), &angles);
    let mut cfg = tiny_config(tmp.path(), log);
    cfg.train.seed = None;

    let a = prepare_dataset(&cfg, &mut rng_from_seed(None)).unwrap();
    let b = prepare_dataset(&cfg, &mut rng_from_seed(None)).unwrap();
    assert_eq!(a.batch.len(), b.batch.len());
    assert_ne!(a.batch.targets, b.batch.targets);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let tmp = tempfile::tempdir().unwrap();
    let log = write_dataset(tmp.path(), &[0.0, 0.1]);
    let mut cfg = tiny_config(tmp.path(), log);
    cfg.train.batch_size = 0;
    assert!(train_pipeline(&cfg).is_err());
    assert!(!cfg.train.output.exists());
}
