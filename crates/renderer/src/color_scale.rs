//! Fixed color scales.
//!
//! Every field is drawn against a static `(min, max, palette)` triple so that
//! maps of different forecast hours and runs are directly comparable. Scales
//! are loaded once per process into a [`ColorScaleTable`] and never derived
//! from the data being drawn.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RenderError, RenderResult};

/// Number of entries in every palette lookup table.
pub const PALETTE_LEVELS: usize = 128;

/// RGBA color, non-premultiplied.
pub type Rgba = [u8; 4];

/// Color scale as written in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct ColorScaleDef {
    min: f32,
    max: f32,
    units: String,
    #[serde(default)]
    label: Option<String>,
    /// Evenly spaced color stops, `#RRGGBB` or `#RRGGBBAA`
    palette: Vec<String>,
}

/// A validated color scale with its precomputed lookup table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "ColorScaleDef", into = "ColorScaleDef")]
pub struct ColorScale {
    pub min: f32,
    pub max: f32,
    pub units: String,
    pub label: Option<String>,
    palette: Vec<String>,
    lut: Vec<Rgba>,
}

impl ColorScale {
    pub fn new(
        min: f32,
        max: f32,
        units: impl Into<String>,
        label: Option<String>,
        palette: &[&str],
    ) -> RenderResult<Self> {
        Self::try_from(ColorScaleDef {
            min,
            max,
            units: units.into(),
            label,
            palette: palette.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// The palette stops as configured.
    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    /// The `PALETTE_LEVELS`-entry lookup table.
    pub fn lut(&self) -> &[Rgba] {
        &self.lut
    }

    /// Clamp a value into `[min, max]`. NaN stays NaN.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            value
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Lookup table index for a value, or `None` for missing data.
    pub fn level(&self, value: f32) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        let t = (self.clamp(value) - self.min) / (self.max - self.min);
        let idx = (t * (PALETTE_LEVELS - 1) as f32).round() as usize;
        Some(idx.min(PALETTE_LEVELS - 1))
    }

    /// Color for a value; missing data has no color.
    pub fn color(&self, value: f32) -> Option<Rgba> {
        self.level(value).map(|i| self.lut[i])
    }

    /// Value at the center of lookup table entry `level`.
    pub fn level_value(&self, level: usize) -> f32 {
        let t = level.min(PALETTE_LEVELS - 1) as f32 / (PALETTE_LEVELS - 1) as f32;
        self.min + t * (self.max - self.min)
    }

    /// Legend caption, e.g. `2 m temperature (°C)`.
    pub fn caption(&self) -> String {
        match &self.label {
            Some(label) => format!("{} ({})", label, self.units),
            None => self.units.clone(),
        }
    }
}

impl TryFrom<ColorScaleDef> for ColorScale {
    type Error = RenderError;

    fn try_from(def: ColorScaleDef) -> Result<Self, Self::Error> {
        let invalid = |reason: String| RenderError::InvalidColorScale {
            name: def.label.clone().unwrap_or_else(|| def.units.clone()),
            reason,
        };

        if !(def.min.is_finite() && def.max.is_finite()) || def.min >= def.max {
            return Err(invalid(format!(
                "range [{}, {}] must be finite with min < max",
                def.min, def.max
            )));
        }
        if def.palette.len() < 2 {
            return Err(invalid("palette needs at least two stops".to_string()));
        }

        let stops = def
            .palette
            .iter()
            .map(|hex| parse_hex_color(hex).ok_or_else(|| invalid(format!("bad color '{}'", hex))))
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            min: def.min,
            max: def.max,
            units: def.units,
            label: def.label,
            palette: def.palette,
            lut: build_lut(&stops),
        })
    }
}

impl From<ColorScale> for ColorScaleDef {
    fn from(scale: ColorScale) -> Self {
        Self {
            min: scale.min,
            max: scale.max,
            units: scale.units,
            label: scale.label,
            palette: scale.palette,
        }
    }
}

/// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
pub fn parse_hex_color(hex: &str) -> Option<Rgba> {
    let hex = hex.trim().trim_start_matches('#');
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let a = if hex.len() == 8 { channel(6)? } else { 255 };
    Some([channel(0)?, channel(2)?, channel(4)?, a])
}

/// Linear interpolation of evenly spaced stops into `PALETTE_LEVELS` entries.
fn build_lut(stops: &[Rgba]) -> Vec<Rgba> {
    let segments = (stops.len() - 1) as f32;
    (0..PALETTE_LEVELS)
        .map(|i| {
            let pos = i as f32 / (PALETTE_LEVELS - 1) as f32 * segments;
            let lo = (pos.floor() as usize).min(stops.len() - 2);
            let t = pos - lo as f32;
            let (a, b) = (stops[lo], stops[lo + 1]);
            let mut out = [0u8; 4];
            for c in 0..4 {
                out[c] = (a[c] as f32 + (b[c] as f32 - a[c] as f32) * t).round() as u8;
            }
            out
        })
        .collect()
}

/// Color scales by field name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColorScaleTable {
    #[serde(default = "default_version")]
    pub version: String,
    pub scales: BTreeMap<String, ColorScale>,
}

fn default_version() -> String {
    "1".to_string()
}

impl ColorScaleTable {
    pub fn from_json(json: &str) -> RenderResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RenderError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_json(&text)?;
        info!(path = %path.display(), scales = table.scales.len(), "Loaded color scales");
        Ok(table)
    }

    /// Built-in scales for the AIGFS surface fields.
    pub fn builtin() -> RenderResult<Self> {
        const VIRIDIS: &[&str] = &[
            "#440154", "#482878", "#3e4a89", "#31688e", "#26828e", "#1f9e89", "#35b779",
            "#6ece58", "#b5de2b", "#fde725",
        ];
        const TEMPERATURE: &[&str] = &[
            "#6600d6", "#0033ff", "#0080ff", "#00bfff", "#00ffff", "#00ff80", "#80ff00",
            "#ffff00", "#ffbf00", "#ff4000", "#d60000", "#640000",
        ];
        const DIVERGING: &[&str] = &[
            "#2166ac", "#4393c3", "#92c5de", "#f7f7f7", "#f4a582", "#d6604d", "#b2182b",
        ];
        const PRECIP: &[&str] = &[
            "#ffffff", "#c7e9c0", "#74c476", "#238b45", "#fdd049", "#f16913", "#cb181d",
            "#67000d",
        ];

        let label = |s: &str| Some(s.to_string());
        let mut scales = BTreeMap::new();
        scales.insert(
            "t2m".to_string(),
            ColorScale::new(-40.0, 50.0, "°C", label("Temperature (2m)"), TEMPERATURE)?,
        );
        scales.insert(
            "u10".to_string(),
            ColorScale::new(-30.0, 30.0, "m/s", label("U-Wind (10m)"), DIVERGING)?,
        );
        scales.insert(
            "v10".to_string(),
            ColorScale::new(-30.0, 30.0, "m/s", label("V-Wind (10m)"), DIVERGING)?,
        );
        scales.insert(
            "wind10".to_string(),
            ColorScale::new(0.0, 40.0, "m/s", label("Wind Speed (10m)"), VIRIDIS)?,
        );
        scales.insert(
            "prmsl".to_string(),
            ColorScale::new(960.0, 1050.0, "hPa", label("MSL Pressure"), VIRIDIS)?,
        );
        scales.insert(
            "tp".to_string(),
            ColorScale::new(0.0, 50.0, "mm", label("Total Precipitation"), PRECIP)?,
        );

        Ok(Self {
            version: default_version(),
            scales,
        })
    }

    pub fn get(&self, field: &str) -> Option<&ColorScale> {
        self.scales.get(field)
    }

    /// Scale for `field`, or `UnknownScale`.
    pub fn scale_for(&self, field: &str) -> RenderResult<&ColorScale> {
        self.get(field)
            .ok_or_else(|| RenderError::UnknownScale(field.to_string()))
    }

    /// Fail when any of `fields` has no scale.
    pub fn check_covers<S: AsRef<str>>(&self, fields: &[S]) -> RenderResult<()> {
        for field in fields {
            self.scale_for(field.as_ref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t2m() -> ColorScale {
        ColorScaleTable::builtin().unwrap().scale_for("t2m").unwrap().clone()
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), Some([255, 0, 0, 255]));
        assert_eq!(parse_hex_color("00ff0080"), Some([0, 255, 0, 128]));
        assert_eq!(parse_hex_color("#GGGGGG"), None);
        assert_eq!(parse_hex_color("#fff"), None);
    }

    #[test]
    fn test_lut_endpoints_match_stops() {
        let scale = ColorScale::new(0.0, 1.0, "1", None, &["#000000", "#ffffff"]).unwrap();
        assert_eq!(scale.lut().len(), PALETTE_LEVELS);
        assert_eq!(scale.lut()[0], [0, 0, 0, 255]);
        assert_eq!(scale.lut()[PALETTE_LEVELS - 1], [255, 255, 255, 255]);
    }

    #[test]
    fn test_clamp_is_idempotent() {
        let scale = t2m();
        for v in [-100.0, -40.0, -3.3, 0.0, 49.9, 50.0, 55.0, 1e6] {
            let once = scale.clamp(v);
            assert_eq!(scale.clamp(once), once);
            assert!(once >= scale.min && once <= scale.max);
        }
    }

    #[test]
    fn test_out_of_range_values_take_boundary_colors() {
        let scale = t2m();
        assert_eq!(scale.color(55.0), scale.color(50.0));
        assert_eq!(scale.color(55.0), Some(scale.lut()[PALETTE_LEVELS - 1]));
        assert_eq!(scale.color(-90.0), scale.color(-40.0));
        assert_eq!(scale.color(-90.0), Some(scale.lut()[0]));
        assert_eq!(scale.color(f32::NAN), None);
    }

    #[test]
    fn test_level_value_round_trips_levels() {
        let scale = t2m();
        for level in [0, 17, 64, PALETTE_LEVELS - 1] {
            assert_eq!(scale.level(scale.level_value(level)), Some(level));
        }
    }

    #[test]
    fn test_rejects_inverted_range() {
        let err = ColorScale::new(10.0, 0.0, "K", None, &["#000000", "#ffffff"]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidColorScale { .. }));
    }

    #[test]
    fn test_rejects_single_stop() {
        assert!(ColorScale::new(0.0, 1.0, "K", None, &["#000000"]).is_err());
    }

    #[test]
    fn test_table_from_json() {
        let json = r##"{
            "version": "2",
            "scales": {
                "t2m": {"min": -40, "max": 50, "units": "°C", "palette": ["#0000ff", "#ff0000"]}
            }
        }"##;
        let table = ColorScaleTable::from_json(json).unwrap();
        assert_eq!(table.version, "2");
        let scale = table.scale_for("t2m").unwrap();
        assert_eq!(scale.lut()[0], [0, 0, 255, 255]);
        assert!(matches!(
            table.scale_for("prmsl"),
            Err(RenderError::UnknownScale(_))
        ));
    }

    #[test]
    fn test_table_rejects_bad_palette_color() {
        let json = r#"{"scales": {"t2m": {"min": 0, "max": 1, "units": "K", "palette": ["red", "blue"]}}}"#;
        assert!(ColorScaleTable::from_json(json).is_err());
    }

    #[test]
    fn test_builtin_covers_catalog_fields() {
        let table = ColorScaleTable::builtin().unwrap();
        table
            .check_covers(&["t2m", "u10", "v10", "prmsl", "tp", "wind10"])
            .unwrap();
    }
}
