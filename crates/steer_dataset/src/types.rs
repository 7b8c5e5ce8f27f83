//! Core types and error definitions for steer_dataset.

use data_contracts::{DrivingLogRow, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv parse error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed row at {path}:{line}: {msg}")]
    Schema {
        path: PathBuf,
        line: u64,
        msg: String,
    },
    #[error("row validation failed at {path}:{line}: {source}")]
    Validation {
        path: PathBuf,
        line: u64,
        #[source]
        source: ValidationError,
    },
    #[error("driving log {path} contains no rows")]
    EmptyLog { path: PathBuf },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {path} is {height} rows tall, crop needs at least {required}")]
    ImageTooSmall {
        path: PathBuf,
        height: u32,
        required: u32,
    },
    #[error("shape mismatch: {0}")]
    Shape(String),
}

/// Ordered driving-log rows. Path and angle live in one row, so the two
/// sequences can never drift apart across pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrivingLog {
    rows: Vec<DrivingLogRow>,
}

impl DrivingLog {
    pub fn from_rows(rows: Vec<DrivingLogRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[DrivingLogRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [DrivingLogRow] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<DrivingLogRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The angle column, in row order.
    pub fn angles(&self) -> Vec<f32> {
        self.rows.iter().map(|r| r.angle).collect()
    }
}

impl FromIterator<DrivingLogRow> for DrivingLog {
    fn from_iter<I: IntoIterator<Item = DrivingLogRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
