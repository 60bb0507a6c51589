//! Decoded scalar fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};
use crate::grid::GridSpec;
use crate::hour::ForecastHour;

/// A named physical quantity on a normalized lat/lon grid.
///
/// `values` is row-major, north to south and west to east; missing points
/// are `NaN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub units: String,
    pub description: String,
    pub reference_time: DateTime<Utc>,
    pub forecast_hour: ForecastHour,
    pub grid: GridSpec,
    pub values: Vec<f32>,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        description: impl Into<String>,
        reference_time: DateTime<Utc>,
        forecast_hour: ForecastHour,
        grid: GridSpec,
        values: Vec<f32>,
    ) -> CommonResult<Self> {
        if !grid.scan_mode.is_standard() {
            return Err(CommonError::InvalidGrid(
                "field grids must be normalized".to_string(),
            ));
        }
        if values.len() != grid.len() {
            return Err(CommonError::InvalidGrid(format!(
                "{} values for a {}x{} grid",
                values.len(),
                grid.nx,
                grid.ny
            )));
        }
        Ok(Self {
            name: name.into(),
            units: units.into(),
            description: description.into(),
            reference_time,
            forecast_hour,
            grid,
            values,
        })
    }

    /// Value at column `i`, row `j`; `None` when out of range or missing.
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        if i >= self.grid.nx || j >= self.grid.ny {
            return None;
        }
        let v = self.values[self.grid.flat_index(i, j)];
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    /// Nearest-point value at a geographic coordinate.
    pub fn sample(&self, lat: f64, lon: f64) -> Option<f32> {
        let (i, j) = self.grid.nearest_index(lat, lon)?;
        self.get(i, j)
    }

    /// Minimum and maximum over non-missing values.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.values
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}
