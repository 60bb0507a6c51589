//! Common types and utilities shared across the AIGFS map pipeline.

pub mod bbox;
pub mod error;
pub mod field;
pub mod fs;
pub mod grid;
pub mod hour;
pub mod run;

pub use bbox::BoundingBox;
pub use error::{CommonError, CommonResult};
pub use field::Field;
pub use fs::{remove_if_exists, write_atomic};
pub use grid::{GridSpec, ScanMode};
pub use hour::{FailureReason, ForecastHour, HourState};
pub use run::{Cycle, Run, RunId, RunStatus, CYCLE_HOURS};
