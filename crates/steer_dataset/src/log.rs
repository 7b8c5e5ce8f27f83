//! Loading the simulator's driving log.

use crate::types::{DatasetError, DatasetResult, DrivingLog};
use data_contracts::{LogRecord, LOG_COLUMNS};
use std::fs::File;
use std::path::Path;

/// Read a headerless 7-column driving log and keep `(center image, angle)`.
///
/// Relative image paths are joined onto `image_root` when one is given, and
/// used as written otherwise. Any malformed row aborts the load.
pub fn load_driving_log(path: &Path, image_root: Option<&Path>) -> DatasetResult<DrivingLog> {
    let file = File::open(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| DatasetError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() != LOG_COLUMNS.len() {
            return Err(DatasetError::Schema {
                path: path.to_path_buf(),
                line,
                msg: format!(
                    "expected {} columns ({}), found {}",
                    LOG_COLUMNS.len(),
                    LOG_COLUMNS.join(", "),
                    record.len()
                ),
            });
        }
        let parsed: LogRecord = record.deserialize(None).map_err(|e| DatasetError::Schema {
            path: path.to_path_buf(),
            line,
            msg: e.to_string(),
        })?;
        parsed.validate().map_err(|e| DatasetError::Validation {
            path: path.to_path_buf(),
            line,
            source: e,
        })?;
        let mut row = parsed.into_row();
        if let Some(root) = image_root {
            if row.image_path.is_relative() {
                row.image_path = root.join(&row.image_path);
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(DatasetError::EmptyLog {
            path: path.to_path_buf(),
        });
    }
    tracing::info!(rows = rows.len(), log = %path.display(), "loaded driving log");
    Ok(DrivingLog::from_rows(rows))
}
