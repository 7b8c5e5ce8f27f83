//! Shared data contracts for simulator driving logs.

pub mod capture;

pub use capture::{DrivingLogRow, LogRecord, ValidationError, LOG_COLUMNS};
