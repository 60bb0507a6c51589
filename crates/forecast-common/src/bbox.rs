//! Geographic bounding boxes in degrees.

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

/// A lat/lon bounding box. `min_x`/`max_x` are longitudes, `min_y`/`max_y`
/// latitudes, all in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The whole globe, -180..180 / -90..90.
    pub fn global() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Parse "minx,miny,maxx,maxy".
    pub fn parse(s: &str) -> CommonResult<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(CommonError::InvalidBoundingBox(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| CommonError::InvalidBoundingBox(s.to_string()))?;
        }

        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Reject empty, inverted or out-of-range boxes.
    pub fn validate(&self) -> CommonResult<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite
            || self.min_x >= self.max_x
            || self.min_y >= self.max_y
            || self.min_y < -90.0
            || self.max_y > 90.0
            || self.width() > 360.0
        {
            return Err(CommonError::InvalidBoundingBox(format!(
                "{},{},{},{}",
                self.min_x, self.min_y, self.max_x, self.max_y
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = BoundingBox::parse("-130, 20, -60, 55").unwrap();
        assert_eq!(bbox.min_x, -130.0);
        assert_eq!(bbox.max_y, 55.0);
        assert_eq!(bbox.width(), 70.0);
        assert_eq!(bbox.height(), 35.0);
    }

    #[test]
    fn test_rejects_inverted_bbox() {
        assert!(BoundingBox::parse("10,0,-10,5").is_err());
        assert!(BoundingBox::parse("0,0,10").is_err());
        assert!(BoundingBox::parse("0,-95,10,0").is_err());
    }
}
