//! Ready-made AIGFS-like grid files and inventories.

use crate::grib2::{build_file, build_inventory, Grib2Builder};

/// A synthetic `sfc` grid file and its `.idx` inventory.
#[derive(Debug, Clone)]
pub struct SurfaceFile {
    pub bytes: Vec<u8>,
    pub inventory: String,
}

/// Temperature-like values in Kelvin: cold at the poles, warm at the
/// equator, 250 K to 310 K.
pub fn temperature_grid(ni: u32, nj: u32) -> Vec<f32> {
    let mut data = Vec::with_capacity((ni * nj) as usize);
    for row in 0..nj {
        let lat_factor = 1.0 - (row as f32 / (nj - 1).max(1) as f32 * 2.0 - 1.0).abs();
        for col in 0..ni {
            let wave = (col as f32 / ni as f32 * std::f32::consts::TAU).sin() * 2.0;
            data.push(250.0 + lat_factor * 60.0 + wave);
        }
    }
    data
}

/// The messages of an AIGFS surface file for one run and forecast hour:
/// PRMSL, TMP 2 m, UGRD/VGRD 10 m and an APCP accumulation.
pub fn surface_messages(
    (year, month, day, cycle): (u16, u8, u8, u8),
    forecast_hour: u32,
) -> Vec<Grib2Builder> {
    let base = Grib2Builder::new_aigfs()
        .with_reference_time(year, month, day, cycle)
        .with_forecast_hour(forecast_hour);
    let n = 36 * 19;

    let mut messages = vec![
        base.clone()
            .with_parameter(0, 3, 1)
            .with_level(101, 0)
            .with_gradient(98_000.0, 104_000.0),
        base.clone()
            .with_parameter(0, 0, 0)
            .with_level(103, 2)
            .with_data(temperature_grid(36, 19)),
        base.clone()
            .with_parameter(0, 2, 2)
            .with_level(103, 10)
            .with_data(vec![3.0; n]),
        base.clone()
            .with_parameter(0, 2, 3)
            .with_level(103, 10)
            .with_data(vec![4.0; n]),
    ];
    if forecast_hour > 0 {
        messages.push(
            base.with_parameter(0, 1, 8)
                .with_level(1, 0)
                .with_accumulation(forecast_hour.min(6))
                .with_gradient(0.0, 25.0),
        );
    }
    messages
}

/// A complete surface file for `2026-01-03 00Z` style run tuples.
pub fn surface_file(run: (u16, u8, u8, u8), forecast_hour: u32) -> SurfaceFile {
    let messages = surface_messages(run, forecast_hour);
    SurfaceFile {
        bytes: build_file(&messages),
        inventory: build_inventory(&messages),
    }
}

/// Common bounding boxes as (min_lon, min_lat, max_lon, max_lat).
pub mod bbox {
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);
    pub const CONUS: (f64, f64, f64, f64) = (-130.0, 20.0, -60.0, 55.0);
    /// Crosses the antimeridian when expressed in 0..360
    pub const PACIFIC: (f64, f64, f64, f64) = (160.0, -50.0, 220.0, 50.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_file_has_inventory_per_message() {
        let file = surface_file((2026, 1, 3, 0), 6);
        assert_eq!(file.inventory.lines().count(), 5);
        assert!(file.inventory.contains("d=2026010300:TMP:2 m above ground:6 hour fcst:"));
        assert!(file.inventory.contains("APCP:surface:0-6 hour acc fcst:"));
    }

    #[test]
    fn test_analysis_file_has_no_accumulation() {
        let file = surface_file((2026, 1, 3, 0), 0);
        assert_eq!(file.inventory.lines().count(), 4);
        assert!(file.inventory.contains(":anl:"));
    }

    #[test]
    fn test_temperature_grid_range() {
        let grid = temperature_grid(36, 19);
        let min = grid.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = grid.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(min >= 247.0 && max <= 313.0);
    }
}
