use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Column names of the simulator's headerless driving log, in file order.
pub const LOG_COLUMNS: [&str; 7] = [
    "center", "left", "right", "angle", "throttle", "brake", "speed",
];

/// One raw line of `driving_log.csv`. Only `center` and `angle` survive
/// projection; the rest must still parse as their declared types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub center: String,
    pub left: String,
    pub right: String,
    pub angle: f32,
    pub throttle: f32,
    pub brake: f32,
    pub speed: f32,
}

/// The retained projection of a [`LogRecord`]: center-camera frame and steering angle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrivingLogRow {
    pub image_path: PathBuf,
    pub angle: f32,
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing center image path")]
    MissingImage,
    #[error("column `{column}` is not finite: {value}")]
    NonFinite { column: &'static str, value: f32 },
}

impl LogRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.center.trim().is_empty() {
            return Err(ValidationError::MissingImage);
        }
        let numeric = [
            ("angle", self.angle),
            ("throttle", self.throttle),
            ("brake", self.brake),
            ("speed", self.speed),
        ];
        for (column, value) in numeric {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { column, value });
            }
        }
        Ok(())
    }

    /// Drop the side cameras and telemetry, keeping the center frame and angle.
    pub fn into_row(self) -> DrivingLogRow {
        DrivingLogRow {
            image_path: PathBuf::from(self.center.trim()),
            angle: self.angle,
        }
    }
}
