//! Pipeline configuration loaded from `config/aigfs.yaml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use forecast_common::{BoundingBox, Cycle, ForecastHour};
use grib2_parser::FieldCatalog;
use renderer::{
    parse_hex_color, Basemap, ColorScaleTable, Interpolation, MapProjection, MapStyle,
};
use serde::Deserialize;
use tracing::debug;

use crate::retry::RetryPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub model: ModelInfo,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Basic model identification.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn default_fields() -> Vec<String> {
    ["t2m", "u10", "v10", "prmsl", "wind10"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Remote archive layout. Templates take `{date}`, `{cycle:02}` and
/// `{forecast:03}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub directory_template: String,
    pub file_template: String,
    pub index_suffix: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nomads.ncep.noaa.gov/pub/data/nccf/com/aigfs/prod".to_string(),
            directory_template: "aigfs.{date}/{cycle:02}/model/atmos/grib2".to_string(),
            file_template: "aigfs.t{cycle:02}z.sfc.f{forecast:03}.grib2".to_string(),
            index_suffix: ".idx".to_string(),
            request_timeout_secs: 600,
            connect_timeout_secs: 30,
        }
    }
}

/// When runs are published and which hours to process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Cycles the model runs (subset of 0, 6, 12, 18)
    pub cycles: Vec<u32>,
    pub forecast_hours: ForecastHoursConfig,
    /// Hours after cycle time before data can appear
    pub delay_hours: u32,
    /// How far back the resolver searches
    pub lookback_hours: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cycles: vec![0, 6, 12, 18],
            forecast_hours: ForecastHoursConfig::default(),
            delay_hours: 4,
            lookback_hours: 48,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastHoursConfig {
    pub start: u16,
    pub end: u16,
    pub step: u16,
}

impl Default for ForecastHoursConfig {
    fn default() -> Self {
        Self {
            start: 0,
            end: 384,
            step: 6,
        }
    }
}

impl ForecastHoursConfig {
    pub fn hours(&self) -> Vec<ForecastHour> {
        ForecastHour::range(self.start, self.end, self.step)
    }
}

/// Download retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_retry_delay_ms: 2_000,
            max_retry_delay_ms: 60_000,
        }
    }
}

/// What to do when a configured field is missing from a grid file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// The whole hour fails
    FailHour,
    /// Only the missing field's artifact fails
    #[default]
    SkipField,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Hours downloading/processing at once
    pub max_concurrent_hours: usize,
    /// Blocking decode/render jobs at once
    pub render_workers: usize,
    pub missing_field_policy: MissingFieldPolicy,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_hours: 4,
            render_workers: 2,
            missing_field_policy: MissingFieldPolicy::SkipField,
        }
    }
}

/// Map extent, size and decorations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub interpolation: Interpolation,
    /// GeoJSON coastlines/borders
    pub basemap: Option<PathBuf>,
    pub basemap_color: String,
    /// Degrees between graticule lines
    pub graticule_spacing: Option<f64>,
    pub graticule_color: String,
    pub legend_height: u32,
    /// Color scale table; the built-in table when unset
    pub color_scales: Option<PathBuf>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::global(),
            width: 1440,
            height: 720,
            interpolation: Interpolation::Nearest,
            basemap: None,
            basemap_color: "#000000".to_string(),
            graticule_spacing: Some(30.0),
            graticule_color: "#808080".to_string(),
            legend_height: 28,
            color_scales: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Downloaded grid files, one directory per run
    pub data_dir: PathBuf,
    /// Rendered maps, manifest and metrics
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/grib"),
            output_dir: PathBuf::from("data/maps"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Runs whose maps are kept, newest first
    pub keep_runs: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { keep_runs: 2 }
    }
}

impl ModelConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        debug!(model = %config.model.id, path = %path.display(), "Loaded model config");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ModelConfig = serde_yaml::from_str(yaml).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cycles()?;
        if self.schedule.forecast_hours.step == 0 {
            bail!("schedule.forecast_hours.step must be positive");
        }
        if self.fetch.max_attempts == 0 {
            bail!("fetch.max_attempts must be at least 1");
        }
        if self.processing.max_concurrent_hours == 0 || self.processing.render_workers == 0 {
            bail!("processing concurrency limits must be at least 1");
        }
        if self.retention.keep_runs == 0 {
            bail!("retention.keep_runs must be at least 1");
        }
        if self.fields.is_empty() {
            bail!("no fields configured");
        }
        let catalog = FieldCatalog::aigfs();
        for field in &self.fields {
            catalog
                .lookup(field)
                .with_context(|| format!("Unknown field '{}' in config", field))?;
        }
        for (key, color) in [
            ("map.basemap_color", &self.map.basemap_color),
            ("map.graticule_color", &self.map.graticule_color),
        ] {
            if parse_hex_color(color).is_none() {
                bail!("{} is not a hex color: {}", key, color);
            }
        }
        self.map_projection()?;
        Ok(())
    }

    pub fn cycles(&self) -> Result<Vec<Cycle>> {
        self.schedule
            .cycles
            .iter()
            .map(|&h| Cycle::from_hour(h).with_context(|| format!("invalid cycle hour {}", h)))
            .collect()
    }

    pub fn forecast_hours(&self) -> Vec<ForecastHour> {
        self.schedule.forecast_hours.hours()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch.max_attempts,
            initial_delay: Duration::from_millis(self.fetch.initial_retry_delay_ms),
            max_delay: Duration::from_millis(self.fetch.max_retry_delay_ms),
        }
    }

    pub fn map_projection(&self) -> Result<MapProjection> {
        MapProjection::new(
            self.map.bbox,
            self.map.width,
            self.map.height,
            self.map.interpolation,
        )
        .context("Invalid map settings")
    }

    /// Map decorations, loading the basemap file if one is configured.
    pub fn map_style(&self) -> Result<MapStyle> {
        let basemap = match &self.map.basemap {
            Some(path) => Some(
                Basemap::from_file(path)
                    .with_context(|| format!("Failed to load basemap {}", path.display()))?,
            ),
            None => None,
        };
        Ok(MapStyle {
            basemap,
            basemap_color: parse_hex_color(&self.map.basemap_color)
                .context("Invalid basemap color")?,
            graticule_spacing: self.map.graticule_spacing,
            graticule_color: parse_hex_color(&self.map.graticule_color)
                .context("Invalid graticule color")?,
            legend_height: self.map.legend_height,
        })
    }

    /// The color scale table, checked to cover every configured field.
    pub fn color_scales(&self) -> Result<ColorScaleTable> {
        let table = match &self.map.color_scales {
            Some(path) => ColorScaleTable::from_file(path)
                .with_context(|| format!("Failed to load color scales {}", path.display()))?,
            None => ColorScaleTable::builtin().context("Invalid built-in color scales")?,
        };
        table
            .check_covers(&self.fields)
            .context("Color scale table is incomplete")?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
model:
  id: aigfs
  name: "AIGFS - AI Global Forecast System"
"#;

    #[test]
    fn test_defaults() {
        let config = ModelConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.forecast_hours().len(), 65);
        assert_eq!(config.cycles().unwrap().len(), 4);
        assert_eq!(config.schedule.lookback_hours, 48);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(
            config.processing.missing_field_policy,
            MissingFieldPolicy::SkipField
        );
        assert_eq!(config.retention.keep_runs, 2);
        assert_eq!(config.fields, vec!["t2m", "u10", "v10", "prmsl", "wind10"]);
        assert!(config.source.file_template.contains("{forecast:03}"));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
model:
  id: aigfs
  name: "AIGFS"
source:
  base_url: "http://localhost:9000/aigfs"
schedule:
  cycles: [0, 12]
  forecast_hours: { start: 0, end: 24, step: 6 }
  delay_hours: 5
processing:
  max_concurrent_hours: 2
  render_workers: 1
  missing_field_policy: fail_hour
fields: [t2m, tp]
map:
  bbox: { min_x: -130.0, min_y: 20.0, max_x: -60.0, max_y: 55.0 }
  width: 700
  height: 350
  interpolation: bilinear
  graticule_spacing: null
retention:
  keep_runs: 3
"#;
        let config = ModelConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.source.base_url, "http://localhost:9000/aigfs");
        assert_eq!(config.source.index_suffix, ".idx");
        assert_eq!(config.cycles().unwrap(), vec![Cycle::Z00, Cycle::Z12]);
        assert_eq!(
            config.forecast_hours(),
            ForecastHour::range(0, 24, 6)
        );
        assert_eq!(
            config.processing.missing_field_policy,
            MissingFieldPolicy::FailHour
        );
        let projection = config.map_projection().unwrap();
        assert_eq!(projection.interpolation, Interpolation::Bilinear);
        assert_eq!(projection.width, 700);
        assert!(config.map_style().unwrap().graticule_spacing.is_none());
        config.color_scales().unwrap();
    }

    #[test]
    fn test_rejects_unknown_field() {
        let yaml = format!("{}fields: [t2m, snow]\n", MINIMAL);
        let err = ModelConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("snow"));
    }

    #[test]
    fn test_rejects_bad_cycle() {
        let yaml = format!("{}schedule:\n  cycles: [3]\n", MINIMAL);
        assert!(ModelConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let yaml = format!("{}fetch:\n  max_attempts: 0\n", MINIMAL);
        assert!(ModelConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_shipped_config_loads() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let config = ModelConfig::load(&root.join("config/aigfs.yaml")).unwrap();
        assert_eq!(config.model.id, "aigfs");
        assert_eq!(config.forecast_hours().len(), 65);

        let scales = ColorScaleTable::from_file(&root.join("config/color_scales.json")).unwrap();
        scales.check_covers(&config.fields).unwrap();
        scales.check_covers(&["tp"]).unwrap();
    }
}
