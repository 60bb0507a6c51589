//! Regular lat/lon grid specifications.
//!
//! A [`GridSpec`] describes a grid as it is stored in a GRIB2 message
//! (first point, increments, scanning mode). Decoded fields are always
//! reordered with [`ScanMode::normalize`] so that row 0 is the northernmost
//! row and each row runs west to east; [`GridSpec::normalized`] gives the
//! matching spec.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{CommonError, CommonResult};

/// Specification of a regular lat/lon grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of points along a parallel
    pub nx: usize,
    /// Number of points along a meridian
    pub ny: usize,
    /// Latitude of the first stored point (degrees)
    pub first_lat: f64,
    /// Longitude of the first stored point (degrees)
    pub first_lon: f64,
    /// Latitude increment, always positive (degrees)
    pub dlat: f64,
    /// Longitude increment, always positive (degrees)
    pub dlon: f64,
    /// Order in which points are stored
    pub scan_mode: ScanMode,
}

impl GridSpec {
    pub fn new(
        nx: usize,
        ny: usize,
        first_lat: f64,
        first_lon: f64,
        dlat: f64,
        dlon: f64,
        scan_mode: ScanMode,
    ) -> CommonResult<Self> {
        if nx == 0 || ny == 0 {
            return Err(CommonError::InvalidGrid(format!("empty grid {}x{}", nx, ny)));
        }
        if !(dlat.is_finite() && dlon.is_finite() && dlat > 0.0 && dlon > 0.0) {
            return Err(CommonError::InvalidGrid(format!(
                "non-positive increments dlat={} dlon={}",
                dlat, dlon
            )));
        }
        Ok(Self {
            nx,
            ny,
            first_lat,
            first_lon,
            dlat,
            dlon,
            scan_mode,
        })
    }

    /// The spec of the same grid after [`ScanMode::normalize`]: first point
    /// at the north-west corner, rows north to south, columns west to east.
    pub fn normalized(&self) -> Self {
        let last_lat_offset = (self.ny - 1) as f64 * self.dlat;
        let last_lon_offset = (self.nx - 1) as f64 * self.dlon;

        let north = if self.scan_mode.j_positive {
            self.first_lat + last_lat_offset
        } else {
            self.first_lat
        };
        let west = if self.scan_mode.i_negative {
            self.first_lon - last_lon_offset
        } else {
            self.first_lon
        };

        Self {
            first_lat: north,
            first_lon: west,
            scan_mode: ScanMode::standard(),
            ..*self
        }
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the columns cover the full circle of longitude.
    pub fn is_global_lon(&self) -> bool {
        (self.nx as f64 * self.dlon - 360.0).abs() < self.dlon * 0.5
    }

    /// Latitude of row `j` in a normalized grid.
    pub fn lat_at(&self, j: usize) -> f64 {
        self.first_lat - j as f64 * self.dlat
    }

    /// Longitude of column `i` in a normalized grid.
    pub fn lon_at(&self, i: usize) -> f64 {
        self.first_lon + i as f64 * self.dlon
    }

    /// Bounding box of a normalized grid, longitudes as stored (may exceed 180).
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.first_lon,
            self.lat_at(self.ny - 1),
            self.lon_at(self.nx - 1),
            self.first_lat,
        )
    }

    /// Fractional (column, row) of a coordinate in a normalized grid.
    ///
    /// Longitudes are wrapped into the grid's range. Returns `None` outside
    /// the grid, allowing half a cell of slack at the edges. For global grids
    /// the column may lie in `[nx - 1, nx)`, between the last column and the
    /// wrapped first one.
    pub fn fractional_index(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        if !(lat.is_finite() && lon.is_finite()) {
            return None;
        }

        let y = (self.first_lat - lat) / self.dlat;
        if y < -0.5 || y > (self.ny - 1) as f64 + 0.5 {
            return None;
        }

        let x = (lon - self.first_lon).rem_euclid(360.0) / self.dlon;
        if !self.is_global_lon() && x > (self.nx - 1) as f64 + 0.5 {
            // West of the first column, within half a cell
            let west_gap = (360.0 / self.dlon) - x;
            if west_gap <= 0.5 {
                return Some((-west_gap, y));
            }
            return None;
        }

        Some((x, y))
    }

    /// Nearest (column, row) for a coordinate in a normalized grid.
    pub fn nearest_index(&self, lat: f64, lon: f64) -> Option<(usize, usize)> {
        let (x, y) = self.fractional_index(lat, lon)?;
        let j = (y.round().max(0.0) as usize).min(self.ny - 1);
        let i = x.round().max(0.0) as usize;
        let i = if self.is_global_lon() {
            i % self.nx
        } else {
            i.min(self.nx - 1)
        };
        Some((i, j))
    }

    /// Row-major flat index in a normalized grid.
    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }
}

/// Scan mode flags for grid data ordering (GRIB2 Flag Table 3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMode {
    /// Points along a row run east to west
    pub i_negative: bool,
    /// Rows run south to north
    pub j_positive: bool,
    /// Adjacent points are along a column (column-major storage)
    pub j_consecutive: bool,
    /// Every other row reverses direction
    pub alternating_rows: bool,
}

impl ScanMode {
    /// North-west first point, row-major, rows running west to east.
    pub fn standard() -> Self {
        Self {
            i_negative: false,
            j_positive: false,
            j_consecutive: false,
            alternating_rows: false,
        }
    }

    pub fn from_grib2_flag(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
            alternating_rows: (flag & 0x10) != 0,
        }
    }

    pub fn to_grib2_flag(&self) -> u8 {
        let mut flag = 0u8;
        if self.i_negative {
            flag |= 0x80;
        }
        if self.j_positive {
            flag |= 0x40;
        }
        if self.j_consecutive {
            flag |= 0x20;
        }
        if self.alternating_rows {
            flag |= 0x10;
        }
        flag
    }

    pub fn is_standard(&self) -> bool {
        *self == Self::standard()
    }

    /// Reorder values stored in this scan mode into standard order.
    pub fn normalize<T: Copy>(&self, values: &[T], nx: usize, ny: usize) -> CommonResult<Vec<T>> {
        if values.len() != nx * ny {
            return Err(CommonError::InvalidGrid(format!(
                "{} values for a {}x{} grid",
                values.len(),
                nx,
                ny
            )));
        }
        if self.is_standard() {
            return Ok(values.to_vec());
        }
        if self.j_consecutive {
            return Ok(self.normalize_column_major(values, nx, ny));
        }

        let mut out = Vec::with_capacity(values.len());
        for out_j in 0..ny {
            let j = if self.j_positive { ny - 1 - out_j } else { out_j };
            let reversed = self.alternating_rows && j % 2 == 1;
            for out_i in 0..nx {
                let i = if self.i_negative != reversed {
                    nx - 1 - out_i
                } else {
                    out_i
                };
                out.push(values[j * nx + i]);
            }
        }
        Ok(out)
    }

    fn normalize_column_major<T: Copy>(&self, values: &[T], nx: usize, ny: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(values.len());
        for out_j in 0..ny {
            for out_i in 0..nx {
                let i = if self.i_negative { nx - 1 - out_i } else { out_i };
                let j = if self.j_positive { ny - 1 - out_j } else { out_j };
                let reversed = self.alternating_rows && i % 2 == 1;
                let j = if reversed { ny - 1 - j } else { j };
                out.push(values[i * ny + j]);
            }
        }
        out
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_quarter_degree() -> GridSpec {
        GridSpec::new(1440, 721, 90.0, 0.0, 0.25, 0.25, ScanMode::standard()).unwrap()
    }

    #[test]
    fn test_scan_mode_flag_round_trip() {
        let mode = ScanMode::from_grib2_flag(0x40);
        assert!(!mode.i_negative);
        assert!(mode.j_positive);
        assert_eq!(mode.to_grib2_flag(), 0x40);
    }

    #[test]
    fn test_normalize_south_to_north() {
        // 2x3 grid stored south row first
        let values = [1, 2, 3, 4, 5, 6];
        let mode = ScanMode::from_grib2_flag(0x40);
        assert_eq!(mode.normalize(&values, 2, 3).unwrap(), vec![5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn test_normalize_east_to_west() {
        let values = [1, 2, 3, 4, 5, 6];
        let mode = ScanMode::from_grib2_flag(0x80);
        assert_eq!(mode.normalize(&values, 3, 2).unwrap(), vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_normalize_column_major() {
        // 3x2 grid stored column by column: (0,0),(0,1),(1,0),(1,1),(2,0),(2,1)
        let values = [1, 4, 2, 5, 3, 6];
        let mode = ScanMode::from_grib2_flag(0x20);
        assert_eq!(mode.normalize(&values, 3, 2).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_normalize_alternating_rows() {
        let values = [1, 2, 3, 6, 5, 4];
        let mode = ScanMode::from_grib2_flag(0x10);
        assert_eq!(mode.normalize(&values, 3, 2).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_normalize_rejects_wrong_length() {
        assert!(ScanMode::standard().normalize(&[1, 2, 3], 2, 2).is_err());
    }

    #[test]
    fn test_normalized_spec_moves_first_point_north() {
        let spec = GridSpec::new(4, 3, -10.0, 20.0, 5.0, 1.0, ScanMode::from_grib2_flag(0x40)).unwrap();
        let n = spec.normalized();
        assert_eq!(n.first_lat, 0.0);
        assert_eq!(n.first_lon, 20.0);
        assert!(n.scan_mode.is_standard());
    }

    #[test]
    fn test_global_grid_wraps_longitude() {
        let grid = global_quarter_degree();
        assert!(grid.is_global_lon());
        assert_eq!(grid.nearest_index(90.0, 0.0), Some((0, 0)));
        assert_eq!(grid.nearest_index(90.0, -0.25), Some((1439, 0)));
        assert_eq!(grid.nearest_index(0.0, -90.0), Some((1080, 360)));
        // Closer to the wrapped first column than to the last one
        assert_eq!(grid.nearest_index(0.0, 359.9), Some((0, 360)));
    }

    #[test]
    fn test_regional_grid_rejects_outside_points() {
        let grid = GridSpec::new(11, 11, 50.0, 250.0, 1.0, 1.0, ScanMode::standard()).unwrap();
        assert!(!grid.is_global_lon());
        assert_eq!(grid.nearest_index(45.0, -105.0), Some((5, 5)));
        assert_eq!(grid.nearest_index(45.0, 230.0), None);
        assert_eq!(grid.nearest_index(60.0, 255.0), None);
    }

    #[test]
    fn test_bbox_of_normalized_grid() {
        let grid = global_quarter_degree();
        let bbox = grid.bbox();
        assert_eq!(bbox.max_y, 90.0);
        assert_eq!(bbox.min_y, -90.0);
        assert_eq!(bbox.max_x, 359.75);
    }
}
